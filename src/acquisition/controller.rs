//! Acquisition lifecycle and the per-tick pipeline.
//!
//! The controller owns the configuration, the signal source, and the
//! background loop task. One loop runs at a time; each tick snapshots the
//! configuration, acquires a batch, analyzes channel 0, assembles a frame,
//! and hands it to the hub for fan-out.

use crate::acquisition::config::{AcquisitionConfig, ConfigPatch};
use crate::acquisition::spectrum::SpectrumAnalyzer;
use crate::core::{AcquisitionState, Frame, SignalSource};
use crate::error::{AppResult, SigError};
use crate::hub::DistributionHub;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

struct LoopState {
    state: AcquisitionState,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// Drives the acquisition loop and serializes start/stop/configure against
/// each other. Cheap to clone through an `Arc`; all methods take `&self`.
pub struct AcquisitionController {
    config: Arc<RwLock<AcquisitionConfig>>,
    source: Arc<Mutex<Box<dyn SignalSource>>>,
    hub: DistributionHub,
    group: String,
    tick_interval: Duration,
    inner: Mutex<LoopState>,
    // Last delivered timestamp, for the non-decreasing guarantee.
    last_timestamp: Arc<Mutex<f64>>,
}

impl AcquisitionController {
    /// Build a controller. The loop is not started.
    pub fn new(
        source: Box<dyn SignalSource>,
        hub: DistributionHub,
        group: impl Into<String>,
        tick_interval: Duration,
        defaults: AcquisitionConfig,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(defaults)),
            source: Arc::new(Mutex::new(source)),
            hub,
            group: group.into(),
            tick_interval,
            inner: Mutex::new(LoopState {
                state: AcquisitionState::Stopped,
                handle: None,
                shutdown: None,
            }),
            last_timestamp: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> AcquisitionState {
        self.inner.lock().await.state
    }

    /// Snapshot of the current configuration.
    pub async fn config(&self) -> AcquisitionConfig {
        self.config.read().await.clone()
    }

    /// Start the acquisition loop.
    ///
    /// A start while already running is a success no-op. Fails with
    /// `SourceUnavailable` when the source refuses to connect, leaving the
    /// state `Stopped`.
    pub async fn start(&self) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == AcquisitionState::Running {
            debug!("start requested while already running");
            return Ok(());
        }

        {
            let mut source = self.source.lock().await;
            if !source.connect().await {
                return Err(SigError::SourceUnavailable(format!(
                    "source '{}' failed to connect",
                    source.name()
                )));
            }
            let config = self.config.read().await.clone();
            if let Err(e) = source.apply_config(&config).await {
                warn!(error = %e, "initial source configuration failed");
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = Arc::clone(&self.config);
        let source = Arc::clone(&self.source);
        let hub = self.hub.clone();
        let group = self.group.clone();
        let tick = self.tick_interval;
        let last_timestamp = Arc::clone(&self.last_timestamp);

        let handle = tokio::spawn(async move {
            run_loop(config, source, hub, group, tick, last_timestamp, shutdown_rx).await;
        });

        inner.state = AcquisitionState::Running;
        inner.handle = Some(handle);
        inner.shutdown = Some(shutdown_tx);
        info!(tick_ms = tick.as_millis() as u64, "acquisition started");
        Ok(())
    }

    /// Stop the acquisition loop and disconnect the source.
    ///
    /// Idempotent; a stop while stopped is a success no-op. The loop gets a
    /// bounded grace period to finish its current tick, after which it is
    /// aborted.
    pub async fn stop(&self) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == AcquisitionState::Stopped {
            debug!("stop requested while already stopped");
            return Ok(());
        }

        if let Some(shutdown) = inner.shutdown.take() {
            // Receiver may already be gone if the loop died; that is fine.
            let _ = shutdown.send(true);
        }
        if let Some(mut handle) = inner.handle.take() {
            let grace = self.tick_interval * 2 + Duration::from_millis(500);
            if timeout(grace, &mut handle).await.is_err() {
                warn!("acquisition loop did not stop in time, aborting");
                handle.abort();
            }
        }

        self.source.lock().await.disconnect().await;
        inner.state = AcquisitionState::Stopped;
        info!("acquisition stopped");
        Ok(())
    }

    /// Apply a partial configuration update.
    ///
    /// Atomic against the running loop: the new configuration is validated
    /// and swapped in whole, so the next tick sees either the old or the new
    /// value, never a mix. Takes effect without restarting the loop.
    pub async fn configure(&self, patch: &ConfigPatch) -> AppResult<AcquisitionConfig> {
        let next = {
            let mut config = self.config.write().await;
            let next = config.with_patch(patch)?;
            *config = next.clone();
            next
        };
        if let Err(e) = self.source.lock().await.apply_config(&next).await {
            warn!(error = %e, "source rejected configuration push");
        }
        info!(
            frequency_hz = next.frequency_hz,
            amplitude_v = next.amplitude_v,
            sample_count = next.sample_count,
            "configuration updated"
        );
        Ok(next)
    }

    /// Acquire and analyze one frame immediately, outside the loop.
    ///
    /// Used by the snapshot command; does not touch the lifecycle state but
    /// does connect the source if needed.
    pub async fn capture_once(&self) -> AppResult<Frame> {
        let config = self.config.read().await.clone();
        let mut source = self.source.lock().await;
        if !source.connect().await {
            return Err(SigError::SourceUnavailable(format!(
                "source '{}' failed to connect",
                source.name()
            )));
        }
        let batch = source.acquire(&config).await?;
        drop(source);
        let mut analyzer = SpectrumAnalyzer::new();
        Ok(assemble_frame(
            &mut analyzer,
            batch.time_s,
            batch.channels,
            config,
            unix_now(),
        ))
    }
}

async fn run_loop(
    config: Arc<RwLock<AcquisitionConfig>>,
    source: Arc<Mutex<Box<dyn SignalSource>>>,
    hub: DistributionHub,
    group: String,
    tick: Duration,
    last_timestamp: Arc<Mutex<f64>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut analyzer = SpectrumAnalyzer::new();
    loop {
        let snapshot = config.read().await.clone();

        let acquired = {
            let mut source = source.lock().await;
            source.acquire(&snapshot).await
        };
        match acquired {
            Ok(batch) => {
                let timestamp = {
                    // Wall clock can step backwards; clamp so frame order is
                    // observable from timestamps alone.
                    let mut last = last_timestamp.lock().await;
                    let now = unix_now().max(*last);
                    *last = now;
                    now
                };
                let frame =
                    assemble_frame(&mut analyzer, batch.time_s, batch.channels, snapshot, timestamp);
                hub.emit(&group, &frame).await;
            }
            Err(e) => {
                // Transient: skip the tick, the source may recover.
                warn!(error = %e, "acquisition tick failed");
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = sleep(tick) => {}
        }
    }
    debug!("acquisition loop exited");
}

fn assemble_frame(
    analyzer: &mut SpectrumAnalyzer,
    time_s: Vec<f64>,
    mut channels: Vec<Vec<f64>>,
    config: AcquisitionConfig,
    timestamp: f64,
) -> Frame {
    let amplitude_v = if channels.is_empty() {
        Vec::new()
    } else {
        channels.remove(0)
    };
    let amplitude_v2 = if channels.is_empty() {
        None
    } else {
        Some(channels.remove(0))
    };

    // Spectrum is always computed from the primary channel.
    let (fft_frequencies_hz, fft_power_dbm) =
        analyzer.analyze(&amplitude_v, config.sample_rate_hz(), config.ref_level_dbm);

    Frame {
        time_s,
        amplitude_v,
        amplitude_v2,
        fft_frequencies_hz,
        fft_power_dbm,
        config,
        timestamp,
    }
}

fn unix_now() -> f64 {
    // Duration since the epoch is non-negative on any sane clock; fall back
    // to zero rather than panic if the clock reads before 1970.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
