//! Group-based frame fan-out and command routing.
//!
//! The hub keeps named groups of subscribers. Each subscriber is an mpsc
//! sender keyed by a connection id; frames are serialized once per emit and
//! the resulting line is shared across every member. Delivery is best-effort:
//! a subscriber whose channel is full or closed is dropped from the group on
//! the spot, so one slow consumer never stalls the rest.

use crate::acquisition::AcquisitionController;
use crate::core::Frame;
use crate::protocol::{
    ClientCommand, CommandAck, FrameEnvelope, FramePayload, IngestAck, COMMAND_TYPE_RF_CONTROL,
};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

type Members = HashMap<String, mpsc::Sender<Arc<String>>>;

/// Shared fan-out hub. Cloning is cheap and every clone sees the same groups.
#[derive(Clone)]
pub struct DistributionHub {
    groups: Arc<RwLock<HashMap<String, Members>>>,
    controller: Arc<OnceLock<Arc<AcquisitionController>>>,
    subscriber_buffer: usize,
}

impl DistributionHub {
    /// Create a hub whose subscriber channels buffer `subscriber_buffer`
    /// lines before the overflow policy kicks in.
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
            controller: Arc::new(OnceLock::new()),
            subscriber_buffer,
        }
    }

    /// Attach the controller commands are routed to.
    ///
    /// Called once at startup; the hub and controller reference each other,
    /// so the controller is wired in after both exist.
    pub fn attach_controller(&self, controller: Arc<AcquisitionController>) {
        if self.controller.set(controller).is_err() {
            warn!("controller already attached, ignoring");
        }
    }

    /// Add `member_id` to `group`, returning the receiving end of its
    /// delivery channel. Joining again under the same id replaces the old
    /// membership, closing the previous receiver.
    pub async fn join(&self, group: &str, member_id: &str) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_default()
            .insert(member_id.to_string(), tx);
        debug!(group, member_id, "member joined");
        rx
    }

    /// Remove `member_id` from `group`. Unknown ids are ignored.
    pub async fn leave(&self, group: &str, member_id: &str) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            if members.remove(member_id).is_some() {
                debug!(group, member_id, "member left");
            }
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }

    /// Remove `member_id` from every group it belongs to.
    pub async fn leave_all(&self, member_id: &str) {
        let mut groups = self.groups.write().await;
        for members in groups.values_mut() {
            members.remove(member_id);
        }
        groups.retain(|_, members| !members.is_empty());
    }

    /// Number of members currently in `group`.
    pub async fn member_count(&self, group: &str) -> usize {
        self.groups
            .read()
            .await
            .get(group)
            .map_or(0, HashMap::len)
    }

    /// Serialize `frame` once and deliver it to every member of `group`.
    pub async fn emit(&self, group: &str, frame: &Frame) {
        self.emit_payload(group, &FramePayload::from(frame)).await;
    }

    /// Deliver an already-assembled payload to every member of `group`.
    pub async fn emit_payload(&self, group: &str, payload: &FramePayload) {
        let envelope = FrameEnvelope::new(payload.clone());
        let line = match serde_json::to_string(&envelope) {
            Ok(line) => Arc::new(line),
            Err(e) => {
                warn!(error = %e, "frame serialization failed, dropping frame");
                return;
            }
        };

        let mut dropped: Vec<String> = Vec::new();
        {
            let groups = self.groups.read().await;
            let Some(members) = groups.get(group) else {
                return;
            };
            for (member_id, tx) in members {
                if let Err(e) = tx.try_send(Arc::clone(&line)) {
                    // Full or closed both mean this subscriber is done.
                    warn!(group, member_id, reason = %e, "dropping slow subscriber");
                    dropped.push(member_id.clone());
                }
            }
        }
        for member_id in dropped {
            self.leave(group, &member_id).await;
        }
    }

    /// Parse one raw command line and execute it, returning exactly one ack.
    ///
    /// Every failure mode answers with an `error_response`; the connection
    /// itself is never torn down over a bad command.
    pub async fn route_command(&self, raw: &str) -> CommandAck {
        let command: ClientCommand = match serde_json::from_str(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "unparseable command line");
                return CommandAck::error("Invalid command format.");
            }
        };
        if command.command_type != COMMAND_TYPE_RF_CONTROL {
            return CommandAck::error(format!(
                "Unknown command type: {}",
                command.command_type
            ));
        }
        let Some(controller) = self.controller.get() else {
            return CommandAck::error("Controller unavailable.");
        };

        match command.command.as_str() {
            "start_simulation" => match controller.start().await {
                Ok(()) => CommandAck::success("Simulation started."),
                Err(e) => CommandAck::error(format!("Failed to start simulation: {e}")),
            },
            "stop_simulation" => match controller.stop().await {
                Ok(()) => CommandAck::success("Simulation stopped."),
                Err(e) => CommandAck::error(format!("Failed to stop simulation: {e}")),
            },
            "configure_cosine" => match controller.configure(&command.params).await {
                Ok(config) => {
                    info!(frequency_hz = config.frequency_hz, "cosine reconfigured");
                    CommandAck::success(format!(
                        "Cosine configured: {} Hz, {} V",
                        config.frequency_hz, config.amplitude_v
                    ))
                }
                Err(e) => CommandAck::error(format!("Invalid configuration: {e}")),
            },
            other => CommandAck::error(format!("Unknown RF command: {other}")),
        }
    }

    /// Validate one raw ingress line and fan the frame out to `group`.
    ///
    /// A frame missing any required key is rejected whole; nothing reaches
    /// the subscribers.
    pub async fn ingest(&self, group: &str, raw: &str) -> IngestAck {
        let payload: FramePayload = match serde_json::from_str(raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "rejected ingress frame");
                return IngestAck::error(format!("Invalid frame: {e}"));
            }
        };
        self.emit_payload(group, &payload).await;
        IngestAck::success("Frame distributed.")
    }
}

/// Wire a controller into a hub, returning the shared handle.
pub fn wire(hub: &DistributionHub, controller: AcquisitionController) -> Arc<AcquisitionController> {
    let controller = Arc::new(controller);
    hub.attach_controller(Arc::clone(&controller));
    controller
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::config::AcquisitionConfig;
    use crate::acquisition::synthetic::SyntheticSource;
    use tokio::time::Duration;

    fn sample_frame() -> Frame {
        Frame {
            time_s: vec![0.0],
            amplitude_v: vec![1.0],
            amplitude_v2: None,
            fft_frequencies_hz: vec![0.0],
            fft_power_dbm: vec![0.0],
            config: AcquisitionConfig::default(),
            timestamp: 1.0,
        }
    }

    fn wired_hub() -> (DistributionHub, Arc<AcquisitionController>) {
        let hub = DistributionHub::new(4);
        let controller = AcquisitionController::new(
            Box::new(SyntheticSource::with_seed(1)),
            hub.clone(),
            "telemetry",
            Duration::from_millis(10),
            AcquisitionConfig::default(),
        );
        let controller = wire(&hub, controller);
        (hub, controller)
    }

    #[tokio::test]
    async fn every_member_receives_each_frame() {
        let hub = DistributionHub::new(4);
        let mut rx_a = hub.join("telemetry", "a").await;
        let mut rx_b = hub.join("telemetry", "b").await;

        hub.emit("telemetry", &sample_frame()).await;

        assert!(rx_a.recv().await.unwrap().contains("rf_simulated_data"));
        assert!(rx_b.recv().await.unwrap().contains("rf_simulated_data"));
    }

    #[tokio::test]
    async fn leaving_stops_delivery_without_affecting_others() {
        let hub = DistributionHub::new(4);
        let mut rx_a = hub.join("telemetry", "a").await;
        let mut rx_b = hub.join("telemetry", "b").await;

        hub.leave("telemetry", "a").await;
        hub.emit("telemetry", &sample_frame()).await;

        assert!(rx_b.recv().await.is_some());
        // a's sender was dropped on leave, so its channel is closed.
        assert!(rx_a.recv().await.is_none());
        assert_eq!(hub.member_count("telemetry").await, 1);
    }

    #[tokio::test]
    async fn emit_to_empty_group_is_a_noop() {
        let hub = DistributionHub::new(4);
        hub.emit("nobody", &sample_frame()).await;
        assert_eq!(hub.member_count("nobody").await, 0);
    }

    #[tokio::test]
    async fn overflowing_member_is_dropped() {
        let hub = DistributionHub::new(2);
        let _rx = hub.join("telemetry", "slow").await;

        // Buffer of 2: two frames queue, the third overflows.
        hub.emit("telemetry", &sample_frame()).await;
        hub.emit("telemetry", &sample_frame()).await;
        assert_eq!(hub.member_count("telemetry").await, 1);
        hub.emit("telemetry", &sample_frame()).await;
        assert_eq!(hub.member_count("telemetry").await, 0);
    }

    #[tokio::test]
    async fn leave_all_clears_every_group() {
        let hub = DistributionHub::new(4);
        let _rx_a = hub.join("telemetry", "x").await;
        let _rx_b = hub.join("other", "x").await;
        hub.leave_all("x").await;
        assert_eq!(hub.member_count("telemetry").await, 0);
        assert_eq!(hub.member_count("other").await, 0);
    }

    #[tokio::test]
    async fn malformed_command_gets_error_ack() {
        let (hub, _controller) = wired_hub();
        let ack = hub.route_command("this is not json").await;
        assert!(ack.is_error());
        assert_eq!(ack.message, "Invalid command format.");
    }

    #[tokio::test]
    async fn wrong_command_type_names_the_type() {
        let (hub, _controller) = wired_hub();
        let ack = hub
            .route_command(r#"{"command_type": "warp_drive", "command": "engage"}"#)
            .await;
        assert!(ack.is_error());
        assert!(ack.message.contains("warp_drive"));
    }

    #[tokio::test]
    async fn unknown_command_names_the_command() {
        let (hub, _controller) = wired_hub();
        let ack = hub
            .route_command(r#"{"command_type": "rf_control", "command": "levitate"}"#)
            .await;
        assert!(ack.is_error());
        assert!(ack.message.contains("levitate"));
    }

    #[tokio::test]
    async fn start_and_stop_round_trip_through_commands() {
        let (hub, controller) = wired_hub();
        let ack = hub
            .route_command(r#"{"command_type": "rf_control", "command": "start_simulation"}"#)
            .await;
        assert!(!ack.is_error(), "{}", ack.message);

        let ack = hub
            .route_command(r#"{"command_type": "rf_control", "command": "stop_simulation"}"#)
            .await;
        assert!(!ack.is_error(), "{}", ack.message);
        assert_eq!(
            controller.state().await,
            crate::core::AcquisitionState::Stopped
        );
    }

    #[tokio::test]
    async fn configure_command_updates_the_controller() {
        let (hub, controller) = wired_hub();
        let ack = hub
            .route_command(
                r#"{"command_type": "rf_control", "command": "configure_cosine",
                    "params": {"frequency_hz": 2500.0}}"#,
            )
            .await;
        assert!(!ack.is_error(), "{}", ack.message);
        assert_eq!(controller.config().await.frequency_hz, 2_500.0);
    }

    #[tokio::test]
    async fn invalid_configure_command_is_rejected() {
        let (hub, controller) = wired_hub();
        let ack = hub
            .route_command(
                r#"{"command_type": "rf_control", "command": "configure_cosine",
                    "params": {"frequency_hz": -10.0}}"#,
            )
            .await;
        assert!(ack.is_error());
        assert_eq!(controller.config().await.frequency_hz, 1_000.0);
    }

    #[tokio::test]
    async fn ingest_distributes_valid_frames() {
        let hub = DistributionHub::new(4);
        let mut rx = hub.join("telemetry", "viewer").await;

        let line = serde_json::to_string(&FramePayload::from(&sample_frame())).unwrap();
        let ack = hub.ingest("telemetry", &line).await;
        assert_eq!(ack.status, "success");
        assert!(rx.recv().await.unwrap().contains("rf_simulated_data"));
    }

    #[tokio::test]
    async fn ingest_rejects_incomplete_frames() {
        let hub = DistributionHub::new(4);
        let mut rx = hub.join("telemetry", "viewer").await;

        let ack = hub.ingest("telemetry", r#"{"time_s": [0.0]}"#).await;
        assert_eq!(ack.status, "error");
        // Nothing was delivered.
        assert!(rx.try_recv().is_err());
    }
}
