//! Synthetic waveform source.
//!
//! Generates the configured cosine wave(s) plus Gaussian noise. Acquisition
//! is a pure function of the configuration snapshot passed in, so concurrent
//! configuration updates can never tear an in-flight batch.
//!
//! Sign convention (fixed): sample value = `amplitude * cos(2*pi*f*t + phase)`.

use crate::acquisition::AcquisitionConfig;
use crate::core::{SampleBatch, SignalSource};
use crate::error::AppResult;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use tracing::debug;

/// In-process signal generator. Handles both the single-wave and dual-wave
/// configurations; the secondary wave, when enabled, becomes its own channel.
pub struct SyntheticSource {
    connected: bool,
    rng: StdRng,
}

impl SyntheticSource {
    /// Create a generator seeded from the OS.
    pub fn new() -> Self {
        Self {
            connected: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a generator with a fixed seed, for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            connected: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn wave(
        time_s: &[f64],
        frequency_hz: f64,
        amplitude_v: f64,
        phase_rad: f64,
        noise: Option<&Normal<f64>>,
        rng: &mut StdRng,
    ) -> Vec<f64> {
        time_s
            .iter()
            .map(|&t| {
                let clean = amplitude_v * (2.0 * PI * frequency_hz * t + phase_rad).cos();
                match noise {
                    Some(dist) => clean + dist.sample(rng),
                    None => clean,
                }
            })
            .collect()
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn connect(&mut self) -> bool {
        self.connected = true;
        true
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn acquire(&mut self, config: &AcquisitionConfig) -> AppResult<SampleBatch> {
        let sample_rate = config.sample_rate_hz();
        let time_s: Vec<f64> = (0..config.sample_count)
            .map(|i| i as f64 / sample_rate)
            .collect();

        // Noise is skipped entirely at sigma == 0 so noiseless output is exact.
        let noise = if config.noise_v > 0.0 {
            // Sigma was validated non-negative; Normal::new only fails on
            // a non-finite sigma.
            Normal::new(0.0, config.noise_v).ok()
        } else {
            None
        };

        let mut channels = Vec::with_capacity(2);
        channels.push(Self::wave(
            &time_s,
            config.frequency_hz,
            config.amplitude_v,
            config.phase_rad,
            noise.as_ref(),
            &mut self.rng,
        ));
        if let Some(secondary) = &config.secondary {
            channels.push(Self::wave(
                &time_s,
                secondary.frequency_hz,
                secondary.amplitude_v,
                secondary.phase_rad,
                noise.as_ref(),
                &mut self.rng,
            ));
        }

        debug!(
            points = config.sample_count,
            channels = channels.len(),
            "synthetic batch generated"
        );
        Ok(SampleBatch { time_s, channels })
    }
}
