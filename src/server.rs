//! Newline-delimited JSON endpoints over TCP.
//!
//! Two listeners run side by side:
//! - the subscriber endpoint: duplex connections that receive a greeting,
//!   join the telemetry group for frame delivery, and may send commands,
//!   each answered by exactly one ack line;
//! - the frame ingress: connections that push complete frames, each answered
//!   by a success or error line.
//!
//! Every connection gets its own task; a connection failure never takes the
//! listener down.

use crate::config::Settings;
use crate::error::{AppResult, SigError};
use crate::hub::DistributionHub;
use crate::protocol::StatusUpdate;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bind both endpoints from the settings and serve until the tasks stop.
pub async fn serve(settings: &Settings, hub: DistributionHub) -> AppResult<()> {
    let client_addr = format!("{}:{}", settings.server.bind_addr, settings.server.client_port);
    let ingest_addr = format!("{}:{}", settings.server.bind_addr, settings.server.ingest_port);

    let client_listener = TcpListener::bind(&client_addr)
        .await
        .map_err(|e| SigError::Transport {
            connection: client_addr.clone(),
            reason: e.to_string(),
        })?;
    let ingest_listener = TcpListener::bind(&ingest_addr)
        .await
        .map_err(|e| SigError::Transport {
            connection: ingest_addr.clone(),
            reason: e.to_string(),
        })?;
    info!(%client_addr, %ingest_addr, "endpoints listening");

    let group = settings.acquisition.group.clone();
    let subscriber = run_subscriber_listener(client_listener, hub.clone(), group.clone());
    let ingress = run_ingest_listener(ingest_listener, hub, group);
    tokio::try_join!(subscriber, ingress)?;
    Ok(())
}

/// Accept subscriber connections on an already-bound listener.
pub async fn run_subscriber_listener(
    listener: TcpListener,
    hub: DistributionHub,
    group: String,
) -> AppResult<()> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| SigError::Transport {
            connection: "subscriber listener".into(),
            reason: e.to_string(),
        })?;
        let hub = hub.clone();
        let group = group.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_subscriber(stream, peer, hub, group).await {
                debug!(%peer, error = %e, "subscriber connection ended");
            }
        });
    }
}

/// Accept frame-push connections on an already-bound listener.
pub async fn run_ingest_listener(
    listener: TcpListener,
    hub: DistributionHub,
    group: String,
) -> AppResult<()> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| SigError::Transport {
            connection: "ingest listener".into(),
            reason: e.to_string(),
        })?;
        let hub = hub.clone();
        let group = group.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_ingest(stream, peer, hub, group).await {
                debug!(%peer, error = %e, "ingest connection ended");
            }
        });
    }
}

async fn write_json<T: serde::Serialize>(
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> AppResult<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn handle_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    hub: DistributionHub,
    group: String,
) -> AppResult<()> {
    let member_id = Uuid::new_v4().to_string();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_json(
        &mut write_half,
        &StatusUpdate::new("Connected to signal stream."),
    )
    .await?;
    let mut rx = hub.join(&group, &member_id).await;
    info!(%peer, member_id, "subscriber connected");

    let result: AppResult<()> = async {
        loop {
            tokio::select! {
                delivery = rx.recv() => {
                    match delivery {
                        Some(line) => {
                            write_half.write_all(line.as_bytes()).await?;
                            write_half.write_all(b"\n").await?;
                        }
                        // Hub dropped us (overflow or replaced membership).
                        None => break,
                    }
                }
                inbound = lines.next_line() => {
                    match inbound? {
                        Some(raw) if raw.trim().is_empty() => {}
                        Some(raw) => {
                            let ack = hub.route_command(&raw).await;
                            write_json(&mut write_half, &ack).await?;
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    hub.leave_all(&member_id).await;
    info!(%peer, member_id, "subscriber disconnected");
    result
}

async fn handle_ingest(
    stream: TcpStream,
    peer: SocketAddr,
    hub: DistributionHub,
    group: String,
) -> AppResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    debug!(%peer, "ingest connected");

    while let Some(raw) = lines.next_line().await? {
        if raw.trim().is_empty() {
            continue;
        }
        let ack = hub.ingest(&group, &raw).await;
        if ack.status != "success" {
            warn!(%peer, message = %ack.message, "rejected ingress frame");
        }
        write_json(&mut write_half, &ack).await?;
    }
    debug!(%peer, "ingest disconnected");
    Ok(())
}
