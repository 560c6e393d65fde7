//! Signal acquisition: configuration, sources, spectral analysis, and the
//! acquisition controller that ties them together.

pub mod config;
pub mod controller;
pub mod scpi;
pub mod spectrum;
pub mod synthetic;

pub use config::{AcquisitionConfig, ConfigPatch, SecondaryWave};
pub use controller::AcquisitionController;
pub use scpi::ScpiSource;
pub use spectrum::SpectrumAnalyzer;
pub use synthetic::SyntheticSource;
