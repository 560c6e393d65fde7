//! JSON wire types for the external interfaces.
//!
//! Three surfaces share these shapes:
//! - inbound subscriber commands ([`ClientCommand`]) and their
//!   acknowledgments ([`CommandAck`]),
//! - the frame push ingress ([`FramePayload`], where every required key must
//!   be present or the frame is rejected as a whole),
//! - outbound subscriber delivery ([`FrameEnvelope`]).

use crate::acquisition::config::ConfigPatch;
use crate::core::Frame;
use serde::{Deserialize, Serialize};

/// Command type accepted on the subscriber channel.
pub const COMMAND_TYPE_RF_CONTROL: &str = "rf_control";
/// Envelope type for delivered frames.
pub const FRAME_ENVELOPE_TYPE: &str = "rf_simulated_data";

/// Structured command sent by a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCommand {
    /// Command family; only `rf_control` is recognized.
    pub command_type: String,
    /// Operation within the family: `start_simulation`, `stop_simulation`,
    /// or `configure_cosine`.
    pub command: String,
    /// Parameters for `configure_cosine`. Omitted fields keep the server's
    /// current values.
    #[serde(default)]
    pub params: ConfigPatch,
}

/// Acknowledgment for exactly one inbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// `command_response` on success, `error_response` on failure.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable outcome.
    pub message: String,
}

impl CommandAck {
    /// Successful acknowledgment.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: "command_response".into(),
            message: message.into(),
        }
    }

    /// Failure acknowledgment.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error_response".into(),
            message: message.into(),
        }
    }

    /// True when this is an error acknowledgment.
    pub fn is_error(&self) -> bool {
        self.kind == "error_response"
    }
}

/// Status line sent to a subscriber right after it connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Always `status_update`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable status.
    pub message: String,
}

impl StatusUpdate {
    /// Build a status update line.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: "status_update".into(),
            message: message.into(),
        }
    }
}

/// Waveform metadata accompanying each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveDetails {
    /// Primary wave frequency in Hz.
    pub frequency_hz: f64,
    /// Primary wave amplitude in volts.
    pub amplitude_v: f64,
    /// Time per horizontal division in seconds.
    pub time_per_div_s: f64,
    /// Window span in seconds.
    pub duration_s: f64,
    /// Sample rate the window was acquired at, in Hz.
    pub actual_sample_rate_hz: f64,
    /// Number of time-domain points.
    pub num_points_time: usize,
    /// Secondary wave frequency, when the second wave is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_hz2: Option<f64>,
    /// Secondary wave amplitude, when the second wave is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude_v2: Option<f64>,
}

/// Spectrum metadata accompanying each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumDetails {
    /// Reference level the peak is normalized to, in dBm.
    pub ref_level_dbm: f64,
    /// Number of frequency bins.
    pub num_points_fft: usize,
    /// First bin frequency in Hz.
    pub fft_start_freq_hz: f64,
    /// Last bin frequency in Hz.
    pub fft_stop_freq_hz: f64,
}

/// One frame as carried on the wire.
///
/// Deserialization doubles as ingress validation: every field without a
/// default is required, and a frame missing any of them is rejected whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Time axis in seconds.
    pub time_s: Vec<f64>,
    /// Primary amplitude sequence in volts.
    pub amplitude_v: Vec<f64>,
    /// Secondary amplitude sequence, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude_v2: Option<Vec<f64>>,
    /// Waveform metadata.
    pub wave_details: WaveDetails,
    /// Frequency axis in Hz.
    pub fft_frequencies_hz: Vec<f64>,
    /// Power per bin in dBm.
    pub fft_power_dbm: Vec<f64>,
    /// Spectrum metadata.
    pub spectrum_details: SpectrumDetails,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl From<&Frame> for FramePayload {
    fn from(frame: &Frame) -> Self {
        let config = &frame.config;
        Self {
            time_s: frame.time_s.clone(),
            amplitude_v: frame.amplitude_v.clone(),
            amplitude_v2: frame.amplitude_v2.clone(),
            wave_details: WaveDetails {
                frequency_hz: config.frequency_hz,
                amplitude_v: config.amplitude_v,
                time_per_div_s: config.time_per_div_s(),
                duration_s: config.time_span_s,
                actual_sample_rate_hz: config.sample_rate_hz(),
                num_points_time: frame.time_s.len(),
                frequency_hz2: config.secondary.map(|w| w.frequency_hz),
                amplitude_v2: config.secondary.map(|w| w.amplitude_v),
            },
            fft_frequencies_hz: frame.fft_frequencies_hz.clone(),
            fft_power_dbm: frame.fft_power_dbm.clone(),
            spectrum_details: SpectrumDetails {
                ref_level_dbm: config.ref_level_dbm,
                num_points_fft: frame.fft_frequencies_hz.len(),
                fft_start_freq_hz: frame.fft_frequencies_hz.first().copied().unwrap_or(0.0),
                fft_stop_freq_hz: frame.fft_frequencies_hz.last().copied().unwrap_or(0.0),
            },
            timestamp: frame.timestamp,
        }
    }
}

/// Delivery envelope wrapping a frame for subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEnvelope {
    /// Always `rf_simulated_data`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The frame itself.
    pub payload: FramePayload,
}

impl FrameEnvelope {
    /// Wrap a frame payload for delivery.
    pub fn new(payload: FramePayload) -> Self {
        Self {
            kind: FRAME_ENVELOPE_TYPE.into(),
            payload,
        }
    }
}

/// Response line on the frame ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAck {
    /// `success` or `error`.
    pub status: String,
    /// Human-readable outcome.
    pub message: String,
}

impl IngestAck {
    /// Successful ingress acknowledgment.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".into(),
            message: message.into(),
        }
    }

    /// Failed ingress acknowledgment.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
        }
    }
}
