//! Acquisition configuration and partial updates.
//!
//! `sample_count` and `time_span_s` are the stored window parameters; the
//! sample rate is always derived as `sample_count / time_span_s` and never
//! stored. Inbound updates that speak in terms of `duration_s` and
//! `sample_rate_hz` (the wire vocabulary) are folded into those two fields
//! before the invariant is re-established, so the three quantities can never
//! drift apart.

use crate::error::{AppResult, SigError};
use serde::{Deserialize, Serialize};

/// Fixed number of horizontal divisions, as on an oscilloscope graticule.
pub const HORIZONTAL_DIVISIONS: f64 = 10.0;

/// Parameters of the optional secondary wave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecondaryWave {
    /// Frequency in Hz, must be positive.
    pub frequency_hz: f64,
    /// Amplitude in volts, must be non-negative.
    pub amplitude_v: f64,
    /// Phase offset in radians.
    #[serde(default)]
    pub phase_rad: f64,
}

/// Full acquisition configuration.
///
/// Owned exclusively by the [`AcquisitionController`](crate::acquisition::AcquisitionController);
/// the loop reads a snapshot at each tick and writers replace the whole value
/// atomically, so a reader never observes a torn mix of old and new fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Primary wave frequency in Hz, must be positive.
    pub frequency_hz: f64,
    /// Primary wave amplitude in volts, must be non-negative.
    pub amplitude_v: f64,
    /// Primary wave phase offset in radians.
    #[serde(default)]
    pub phase_rad: f64,
    /// Optional secondary wave. `None` means single-channel output.
    #[serde(default)]
    pub secondary: Option<SecondaryWave>,
    /// Standard deviation of the additive Gaussian noise in volts.
    pub noise_v: f64,
    /// Samples per acquisition window, at least 1.
    pub sample_count: usize,
    /// Time span of one acquisition window in seconds, must be positive.
    pub time_span_s: f64,
    /// Reference level the spectrum peak is normalized to, in dBm.
    #[serde(default)]
    pub ref_level_dbm: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        // Stock waveform: 1 kHz at 1 V with light noise, 256 points over
        // 25.6 ms (10 kSa/s).
        Self {
            frequency_hz: 1_000.0,
            amplitude_v: 1.0,
            phase_rad: 0.0,
            secondary: None,
            noise_v: 0.05,
            sample_count: 256,
            time_span_s: 0.0256,
            ref_level_dbm: 0.0,
        }
    }
}

impl AcquisitionConfig {
    /// Derived sample rate in Hz: `sample_count / time_span_s`.
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_count as f64 / self.time_span_s
    }

    /// Derived time per horizontal division in seconds.
    pub fn time_per_div_s(&self) -> f64 {
        self.time_span_s / HORIZONTAL_DIVISIONS
    }

    /// Validate all fields.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.frequency_hz > 0.0) {
            return Err(SigError::Validation(format!(
                "frequency_hz must be > 0, got {}",
                self.frequency_hz
            )));
        }
        if !(self.amplitude_v >= 0.0) {
            return Err(SigError::Validation(format!(
                "amplitude_v must be >= 0, got {}",
                self.amplitude_v
            )));
        }
        if let Some(secondary) = &self.secondary {
            if !(secondary.frequency_hz > 0.0) {
                return Err(SigError::Validation(format!(
                    "frequency_hz2 must be > 0, got {}",
                    secondary.frequency_hz
                )));
            }
            if !(secondary.amplitude_v >= 0.0) {
                return Err(SigError::Validation(format!(
                    "amplitude_v2 must be >= 0, got {}",
                    secondary.amplitude_v
                )));
            }
        }
        if !(self.noise_v >= 0.0) {
            return Err(SigError::Validation(format!(
                "noise_v must be >= 0, got {}",
                self.noise_v
            )));
        }
        if self.sample_count < 1 {
            return Err(SigError::Validation("sample_count must be >= 1".into()));
        }
        if !(self.time_span_s > 0.0) {
            return Err(SigError::Validation(format!(
                "time_span_s must be > 0, got {}",
                self.time_span_s
            )));
        }
        Ok(())
    }

    /// Apply a partial update, returning the new configuration.
    ///
    /// Atomic: the first invalid field rejects the whole patch and `self` is
    /// left untouched (the caller only replaces its stored value on `Ok`).
    /// Window precedence: an explicit `sample_count` wins; otherwise a
    /// supplied `sample_rate_hz` is folded into `sample_count` against the
    /// effective window span. The sample rate itself is never stored.
    pub fn with_patch(&self, patch: &ConfigPatch) -> AppResult<Self> {
        let mut next = self.clone();

        if let Some(frequency_hz) = patch.frequency_hz {
            next.frequency_hz = frequency_hz;
        }
        if let Some(amplitude_v) = patch.amplitude_v {
            next.amplitude_v = amplitude_v;
        }
        if let Some(phase_rad) = patch.phase_rad {
            next.phase_rad = phase_rad;
        }
        if let Some(noise_v) = patch.noise_v {
            next.noise_v = noise_v;
        }
        if let Some(ref_level_dbm) = patch.ref_level_dbm {
            next.ref_level_dbm = ref_level_dbm;
        }

        if patch.frequency_hz2.is_some()
            || patch.amplitude_v2.is_some()
            || patch.phase_rad2.is_some()
        {
            let mut secondary = next.secondary.unwrap_or(SecondaryWave {
                frequency_hz: next.frequency_hz,
                amplitude_v: 0.0,
                phase_rad: 0.0,
            });
            if let Some(frequency_hz2) = patch.frequency_hz2 {
                secondary.frequency_hz = frequency_hz2;
            }
            if let Some(amplitude_v2) = patch.amplitude_v2 {
                secondary.amplitude_v = amplitude_v2;
            }
            if let Some(phase_rad2) = patch.phase_rad2 {
                secondary.phase_rad = phase_rad2;
            }
            next.secondary = Some(secondary);
        }

        // Window span: duration_s wins over time_per_div_s.
        if let Some(duration_s) = patch.duration_s {
            next.time_span_s = duration_s;
        } else if let Some(time_per_div_s) = patch.time_per_div_s {
            if !(time_per_div_s > 0.0) {
                return Err(SigError::Validation(format!(
                    "time_per_div_s must be > 0, got {time_per_div_s}"
                )));
            }
            next.time_span_s = time_per_div_s * HORIZONTAL_DIVISIONS;
        }

        if let Some(sample_count) = patch.sample_count {
            next.sample_count = sample_count;
        } else if let Some(sample_rate_hz) = patch.sample_rate_hz {
            if !(sample_rate_hz > 0.0) {
                return Err(SigError::Validation(format!(
                    "sample_rate_hz must be > 0, got {sample_rate_hz}"
                )));
            }
            let computed = (next.time_span_s * sample_rate_hz).round() as i64;
            if computed < 1 {
                return Err(SigError::Validation(format!(
                    "duration_s * sample_rate_hz yields no samples \
                     ({} s * {} Hz)",
                    next.time_span_s, sample_rate_hz
                )));
            }
            next.sample_count = computed as usize;
        }

        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration update. All fields optional; omitted fields retain
/// their current values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// Primary wave frequency in Hz.
    pub frequency_hz: Option<f64>,
    /// Primary wave amplitude in volts.
    pub amplitude_v: Option<f64>,
    /// Primary wave phase in radians.
    pub phase_rad: Option<f64>,
    /// Secondary wave frequency in Hz.
    pub frequency_hz2: Option<f64>,
    /// Secondary wave amplitude in volts.
    pub amplitude_v2: Option<f64>,
    /// Secondary wave phase in radians.
    pub phase_rad2: Option<f64>,
    /// Noise standard deviation in volts.
    pub noise_v: Option<f64>,
    /// Window span in seconds.
    pub duration_s: Option<f64>,
    /// Window span expressed as time per division (× 10 divisions).
    pub time_per_div_s: Option<f64>,
    /// Desired sample rate in Hz; folded into `sample_count`.
    pub sample_rate_hz: Option<f64>,
    /// Samples per window; wins over `sample_rate_hz`.
    pub sample_count: Option<usize>,
    /// Spectrum reference level in dBm.
    pub ref_level_dbm: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_consistent() {
        let config = AcquisitionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_count, 256);
        assert!((config.sample_rate_hz() - 10_000.0).abs() < 1e-9);
        assert!((config.time_per_div_s() - 0.00256).abs() < 1e-12);
    }

    #[test]
    fn single_field_patch_retains_the_rest() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            frequency_hz: Some(5e3),
            ..Default::default()
        };
        let next = config.with_patch(&patch).unwrap();
        assert_eq!(next.frequency_hz, 5000.0);
        assert_eq!(next.amplitude_v, config.amplitude_v);
        assert_eq!(next.noise_v, config.noise_v);
        assert_eq!(next.sample_count, config.sample_count);
        assert_eq!(next.time_span_s, config.time_span_s);
    }

    #[test]
    fn duration_and_rate_fold_into_sample_count() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            duration_s: Some(0.1),
            sample_rate_hz: Some(1_000.0),
            ..Default::default()
        };
        let next = config.with_patch(&patch).unwrap();
        assert_eq!(next.sample_count, 100);
        assert_eq!(next.time_span_s, 0.1);
        assert!((next.sample_rate_hz() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_sample_count_wins_over_rate() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            sample_count: Some(512),
            sample_rate_hz: Some(1.0),
            ..Default::default()
        };
        let next = config.with_patch(&patch).unwrap();
        assert_eq!(next.sample_count, 512);
    }

    #[test]
    fn time_per_div_expands_to_span() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            time_per_div_s: Some(0.001),
            ..Default::default()
        };
        let next = config.with_patch(&patch).unwrap();
        assert!((next.time_span_s - 0.01).abs() < 1e-12);
    }

    #[test]
    fn invalid_field_rejects_whole_patch() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            amplitude_v: Some(3.0),
            frequency_hz: Some(-5.0),
            ..Default::default()
        };
        let err = config.with_patch(&patch).unwrap_err();
        assert!(matches!(err, SigError::Validation(_)));
        // Caller keeps the old value on error, so nothing is applied.
        assert_eq!(config.amplitude_v, 1.0);
    }

    #[test]
    fn vanishing_window_is_rejected() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            duration_s: Some(1e-6),
            sample_rate_hz: Some(10.0),
            ..Default::default()
        };
        assert!(config.with_patch(&patch).is_err());
    }

    #[test]
    fn secondary_wave_created_on_first_patch() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            frequency_hz2: Some(2_500.0),
            amplitude_v2: Some(0.5),
            ..Default::default()
        };
        let next = config.with_patch(&patch).unwrap();
        let secondary = next.secondary.unwrap();
        assert_eq!(secondary.frequency_hz, 2_500.0);
        assert_eq!(secondary.amplitude_v, 0.5);
        assert_eq!(secondary.phase_rad, 0.0);
    }

    #[test]
    fn negative_secondary_frequency_rejected() {
        let config = AcquisitionConfig::default();
        let patch = ConfigPatch {
            frequency_hz2: Some(-1.0),
            ..Default::default()
        };
        assert!(config.with_patch(&patch).is_err());
    }
}
