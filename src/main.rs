//! CLI entry point for sigstream.
//!
//! Two modes:
//! - `serve`: run the acquisition controller and both TCP endpoints until
//!   Ctrl+C;
//! - `snapshot`: acquire and analyze a single frame and print it as JSON,
//!   for quick source checks without a running server.
//!
//! ```bash
//! sigstream serve --config config/sigstream.toml
//! sigstream snapshot
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sigstream::acquisition::scpi::ScpiSource;
use sigstream::acquisition::synthetic::SyntheticSource;
use sigstream::acquisition::AcquisitionController;
use sigstream::config::{Settings, SourceKind};
use sigstream::core::SignalSource;
use sigstream::hub::{wire, DistributionHub};
use sigstream::protocol::FramePayload;
use sigstream::{logging, server};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "sigstream")]
#[command(about = "Signal acquisition and spectrum distribution server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop and TCP endpoints
    Serve,

    /// Acquire one frame and print it as JSON
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path).context("loading configuration")?,
        None => Settings::load().context("loading configuration")?,
    };
    settings.validate().context("validating configuration")?;

    match cli.command {
        Commands::Serve => serve(settings).await,
        Commands::Snapshot => snapshot(settings).await,
    }
}

fn build_source(settings: &Settings) -> Box<dyn SignalSource> {
    // Settings validation already guarantees scpi_addr is set for Scpi.
    match settings.source.kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new()),
        SourceKind::Scpi => Box::new(ScpiSource::new(settings.source.scpi_addr.clone())),
    }
}

async fn serve(settings: Settings) -> Result<()> {
    logging::init_from_settings(&settings)?;
    info!(
        source = ?settings.source.kind,
        client_port = settings.server.client_port,
        ingest_port = settings.server.ingest_port,
        "starting {}", settings.application.name
    );

    let hub = DistributionHub::new(settings.hub.subscriber_buffer);
    let controller = AcquisitionController::new(
        build_source(&settings),
        hub.clone(),
        settings.acquisition.group.clone(),
        Duration::from_millis(settings.acquisition.tick_interval_ms),
        settings.acquisition.defaults.clone(),
    );
    let controller = wire(&hub, controller);

    let endpoints = server::serve(&settings, hub);
    tokio::select! {
        result = endpoints => result.context("endpoint failure")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    controller.stop().await?;
    info!("bye");
    Ok(())
}

async fn snapshot(settings: Settings) -> Result<()> {
    logging::init_from_settings(&settings)?;

    let hub = DistributionHub::new(settings.hub.subscriber_buffer);
    let controller = AcquisitionController::new(
        build_source(&settings),
        hub.clone(),
        settings.acquisition.group.clone(),
        Duration::from_millis(settings.acquisition.tick_interval_ms),
        settings.acquisition.defaults.clone(),
    );
    let controller = wire(&hub, controller);

    let frame = controller.capture_once().await?;
    controller.stop().await?;

    let payload = FramePayload::from(&frame);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
