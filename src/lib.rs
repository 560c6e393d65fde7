//! Real-time signal acquisition and spectrum distribution.
//!
//! sigstream acquires windows of time-domain samples from a signal source
//! (an in-process synthetic generator or a SCPI instrument over TCP),
//! computes a peak-normalized power spectrum for each window, and fans the
//! resulting frames out to subscribers over newline-delimited JSON. A second
//! TCP endpoint accepts complete frames pushed by external producers and
//! distributes them through the same hub.
//!
//! Module map:
//! - [`core`]: the [`SignalSource`](core::SignalSource) trait and the data
//!   types that flow through the pipeline;
//! - [`acquisition`]: sources, the spectrum analyzer, and the controller
//!   that drives the tick loop;
//! - [`hub`]: group fan-out and command routing;
//! - [`server`]: the TCP endpoints;
//! - [`protocol`]: the JSON wire types;
//! - [`config`], [`logging`], [`error`]: process plumbing.

pub mod acquisition;
pub mod config;
pub mod core;
pub mod error;
pub mod hub;
pub mod logging;
pub mod protocol;
pub mod server;

pub use error::{AppResult, SigError};
