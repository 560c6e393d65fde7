//! Settings loading for the streaming service.
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/sigstream.toml` by default)
//! 2. environment variables prefixed with `SIGSTREAM_`, with `__` between
//!    the section and the field (field names themselves contain single
//!    underscores), e.g. `SIGSTREAM_SERVER__CLIENT_PORT=9000`
//!
//! Every field has a serde default so a missing file still yields a usable
//! configuration (the synthetic source with the stock waveform).
//!
//! # Example
//! ```no_run
//! use sigstream::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! println!("serving clients on port {}", settings.server.client_port);
//! # Ok(())
//! # }
//! ```

use crate::acquisition::AcquisitionConfig;
use crate::error::{AppResult, SigError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level service settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application-level settings.
    #[serde(default)]
    pub application: ApplicationSettings,
    /// TCP endpoint settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// Distribution hub settings.
    #[serde(default)]
    pub hub: HubSettings,
    /// Signal source selection.
    #[serde(default)]
    pub source: SourceSettings,
    /// Acquisition loop and default waveform settings.
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
}

/// Application-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Application name, used in log output.
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// TCP endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address both listeners bind to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Port for subscriber connections (commands in, frames out).
    #[serde(default = "default_client_port")]
    pub client_port: u16,
    /// Port for the frame ingress (out-of-process producers push here).
    #[serde(default = "default_ingest_port")]
    pub ingest_port: u16,
}

/// Distribution hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Per-connection outbound frame buffer. A subscriber whose buffer
    /// overflows is disconnected rather than allowed to stall the others.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

/// Which signal source backs the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Pure in-process waveform generator.
    Synthetic,
    /// SCPI instrument reached over TCP. Never falls back to synthetic data.
    Scpi,
}

/// Signal source selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Source variant to instantiate.
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
    /// Instrument address for the SCPI variant, e.g. `192.168.1.50:5025`.
    #[serde(default)]
    pub scpi_addr: String,
}

/// Acquisition loop and default waveform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Interval between acquisition ticks in milliseconds. Each tick re-arms
    /// a fresh delay from the moment it finishes, so processing time is not
    /// subtracted from the interval.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Subscriber group frames are emitted to.
    #[serde(default = "default_group")]
    pub group: String,
    /// Waveform and window defaults applied at startup.
    #[serde(default)]
    pub defaults: AcquisitionConfig,
}

fn default_app_name() -> String {
    "sigstream".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_client_port() -> u16 {
    8000
}

fn default_ingest_port() -> u16 {
    8001
}

fn default_subscriber_buffer() -> usize {
    16
}

fn default_source_kind() -> SourceKind {
    SourceKind::Synthetic
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_group() -> String {
    "telemetry".to_string()
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            client_port: default_client_port(),
            ingest_port: default_ingest_port(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            scpi_addr: String::new(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            group: default_group(),
            defaults: AcquisitionConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `config/sigstream.toml` and the environment.
    ///
    /// Environment variables override file values with the `SIGSTREAM_`
    /// prefix and `__` as the section separator, e.g.
    /// `SIGSTREAM_SERVER__CLIENT_PORT=9000`. A single `_` cannot separate
    /// sections because most field names contain one.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/sigstream.toml")
    }

    /// Load settings from a specific file path plus the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SIGSTREAM_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(SigError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.server.client_port == 0 || self.server.ingest_port == 0 {
            return Err(SigError::Config("Port numbers must be non-zero".into()));
        }
        if self.server.client_port == self.server.ingest_port {
            return Err(SigError::Config(
                "client_port and ingest_port must differ".into(),
            ));
        }

        if self.hub.subscriber_buffer == 0 {
            return Err(SigError::Config(
                "hub.subscriber_buffer must be at least 1".into(),
            ));
        }

        if self.acquisition.tick_interval_ms == 0 {
            return Err(SigError::Config(
                "acquisition.tick_interval_ms must be at least 1".into(),
            ));
        }
        if self.acquisition.group.is_empty() {
            return Err(SigError::Config("acquisition.group cannot be empty".into()));
        }

        if self.source.kind == SourceKind::Scpi && self.source.scpi_addr.is_empty() {
            return Err(SigError::Config(
                "source.scpi_addr is required when source.kind = \"scpi\"".into(),
            ));
        }

        self.acquisition
            .defaults
            .validate()
            .map_err(|e| SigError::Config(format!("acquisition.defaults: {e}")))
    }
}
