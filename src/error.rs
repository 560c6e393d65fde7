//! Custom error types for the application.
//!
//! This module defines the primary error type, `SigError`, used across the
//! acquisition pipeline and the distribution hub. The variants follow the
//! error taxonomy of the system:
//!
//! - **`Validation`**: a configuration parameter was rejected synchronously;
//!   no state was changed.
//! - **`SourceUnavailable`**: the signal source is not connected or did not
//!   return usable data. A `start` fails with this; a running loop skips the
//!   tick and retries.
//! - **`Transport`**: delivery to a single subscriber failed. Always isolated
//!   to that subscriber and never propagated to the emitter.
//! - **`Protocol`**: a malformed or incomplete inbound command/frame. Rejected
//!   with a descriptive acknowledgment, never a crash.
//! - **`Config`** / **`Io`**: settings loading and socket-level failures.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SigError>;

/// Application error taxonomy.
#[derive(Error, Debug)]
pub enum SigError {
    /// A configuration parameter failed validation. The update was rejected
    /// as a whole and the current configuration is unchanged.
    #[error("Invalid parameter: {0}")]
    Validation(String),

    /// The signal source is not connected or returned no usable data.
    #[error("Signal source unavailable: {0}")]
    SourceUnavailable(String),

    /// Delivery to one subscriber connection failed.
    #[error("Transport error for connection '{connection}': {reason}")]
    Transport {
        /// Identity of the affected subscriber connection.
        connection: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Malformed or incomplete inbound command or frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Settings could not be loaded or are semantically invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error from the transport layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for SigError {
    fn from(err: figment::Error) -> Self {
        SigError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SigError {
    fn from(err: serde_json::Error) -> Self {
        SigError::Protocol(err.to_string())
    }
}
