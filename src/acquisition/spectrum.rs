//! Spectral analysis of time-domain sample windows.
//!
//! Computes a one-sided power spectrum in dBm from a real-valued input:
//! the forward FFT of length N keeps bins `0..=N/2`, each magnitude is
//! `|bin| / N`, and power is `20 * log10(magnitude + 1e-12)` (the epsilon
//! keeps all-zero input finite). The result is then shifted so the maximum
//! bin sits exactly at the caller's reference level — this peak
//! normalization is the fixed convention of this crate and is pinned by the
//! tests below.

use num_complex::Complex;
use rustfft::FftPlanner;

/// Guard against `log10(0)` for silent bins.
const EPSILON: f64 = 1e-12;

/// FFT-backed spectrum analyzer. Plans are cached per window length by the
/// underlying planner, so repeated calls at a fixed `sample_count` reuse the
/// same plan.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer.
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Transform `samples` into `(frequencies_hz, power_dbm)`.
    ///
    /// Both outputs have `N/2 + 1` entries for an input of length N, with
    /// `frequencies_hz[k] = k * sample_rate_hz / N`. An empty input yields
    /// empty outputs; a single sample yields the DC bin alone.
    pub fn analyze(
        &mut self,
        samples: &[f64],
        sample_rate_hz: f64,
        ref_level_dbm: f64,
    ) -> (Vec<f64>, Vec<f64>) {
        let n = samples.len();
        if n == 0 {
            return (Vec::new(), Vec::new());
        }

        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .map(|&value| Complex::new(value, 0.0))
            .collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);

        let num_bins = n / 2 + 1;
        let freq_resolution = sample_rate_hz / n as f64;

        let frequencies: Vec<f64> = (0..num_bins).map(|k| k as f64 * freq_resolution).collect();
        let mut powers: Vec<f64> = buffer[..num_bins]
            .iter()
            .map(|bin| {
                let magnitude = bin.norm() / n as f64;
                20.0 * (magnitude + EPSILON).log10()
            })
            .collect();

        // Peak normalization: shift so max(power) == ref_level_dbm.
        let max_power = powers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let shift = max_power - ref_level_dbm;
        for power in &mut powers {
            *power -= shift;
        }

        (frequencies, powers)
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
