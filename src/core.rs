//! Core traits and data types for the acquisition pipeline.

use crate::acquisition::AcquisitionConfig;
use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One window of time-domain samples produced by a single acquisition tick.
///
/// `time_s` and every channel in `channels` are aligned 1:1. Channel 0 is the
/// primary wave; channel 1, when present, is the secondary wave.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBatch {
    /// Sample timestamps in seconds, uniformly spaced at `1 / sample_rate`.
    pub time_s: Vec<f64>,
    /// One amplitude sequence per channel, in volts.
    pub channels: Vec<Vec<f64>>,
}

impl SampleBatch {
    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    /// True when the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.time_s.is_empty()
    }
}

/// One complete time-domain + frequency-domain bundle from a single tick.
///
/// Frames are immutable after assembly: the controller builds one, hands it
/// to the hub, and it is discarded after delivery. No history is retained.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Time axis, `sample_count` points spaced `1 / sample_rate`.
    pub time_s: Vec<f64>,
    /// Primary amplitude sequence, aligned with `time_s`.
    pub amplitude_v: Vec<f64>,
    /// Secondary amplitude sequence when the second wave is enabled.
    pub amplitude_v2: Option<Vec<f64>>,
    /// Frequency axis, `sample_count / 2 + 1` bins spaced
    /// `sample_rate / sample_count`.
    pub fft_frequencies_hz: Vec<f64>,
    /// Power per bin in dBm, aligned with `fft_frequencies_hz`.
    pub fft_power_dbm: Vec<f64>,
    /// Snapshot of the configuration that produced this frame.
    pub config: AcquisitionConfig,
    /// Seconds since the Unix epoch; monotonically non-decreasing across
    /// consecutive frames.
    pub timestamp: f64,
}

/// Lifecycle state of the acquisition loop.
///
/// Transitions: `Stopped → Running` on start (requires a connected source),
/// `Running → Stopped` on stop or fatal source error at startup. A start
/// while already `Running` is a success no-op; configuration changes keep the
/// state and take effect on the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionState {
    /// Loop is not running.
    Stopped,
    /// Loop is producing frames.
    Running,
}

/// A source of time-domain sample batches.
///
/// Implementations must read the configuration passed to [`acquire`]
/// (a per-tick snapshot) rather than caching it, so concurrent configuration
/// updates never race with an in-flight acquisition.
///
/// [`acquire`]: SignalSource::acquire
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Human-readable source name for log output.
    fn name(&self) -> &str;

    /// Connect to the underlying resource. Idempotent; returns `false` when
    /// the resource is unavailable instead of propagating an error.
    async fn connect(&mut self) -> bool;

    /// Disconnect. Always safe to call, connected or not.
    async fn disconnect(&mut self);

    /// Produce one batch of samples for the given configuration snapshot.
    ///
    /// Returns [`SigError::SourceUnavailable`](crate::error::SigError) when
    /// the source cannot deliver a well-formed batch. Implementations must
    /// fail closed: no fabricated data in place of a missing response.
    async fn acquire(&mut self, config: &AcquisitionConfig) -> AppResult<SampleBatch>;

    /// Push a configuration change down to the underlying device.
    ///
    /// The synthetic sources have nothing to push and use this default.
    async fn apply_config(&mut self, _config: &AcquisitionConfig) -> AppResult<()> {
        Ok(())
    }
}
