//! TCP endpoint tests against ephemeral-port listeners: greeting, command
//! acks, frame delivery, and ingress validation over real sockets.

use serde_json::{json, Value};
use sigstream::acquisition::synthetic::SyntheticSource;
use sigstream::acquisition::{AcquisitionConfig, AcquisitionController};
use sigstream::hub::{wire, DistributionHub};
use sigstream::server::{run_ingest_listener, run_subscriber_listener};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const GROUP: &str = "telemetry";

async fn start_endpoints() -> (SocketAddr, SocketAddr, DistributionHub) {
    let hub = DistributionHub::new(32);
    let controller = AcquisitionController::new(
        Box::new(SyntheticSource::with_seed(3)),
        hub.clone(),
        GROUP,
        Duration::from_millis(10),
        AcquisitionConfig::default(),
    );
    wire(&hub, controller);

    let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ingest_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client_addr = client_listener.local_addr().unwrap();
    let ingest_addr = ingest_listener.local_addr().unwrap();
    tokio::spawn(run_subscriber_listener(
        client_listener,
        hub.clone(),
        GROUP.into(),
    ));
    tokio::spawn(run_ingest_listener(
        ingest_listener,
        hub.clone(),
        GROUP.into(),
    ));
    (client_addr, ingest_addr, hub)
}

async fn connect(addr: SocketAddr) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half).lines(), write_half)
}

async fn read_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Value {
    let line = timeout(Duration::from_secs(2), lines.next_line())
        .await
        .expect("read timed out")
        .expect("read failed")
        .expect("connection closed");
    serde_json::from_str(&line).expect("line is not valid json")
}

async fn send(write_half: &mut OwnedWriteHalf, value: Value) {
    let mut line = value.to_string();
    line.push('\n');
    write_half.write_all(line.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn full_command_cycle_over_tcp() {
    let (client_addr, _ingest_addr, _hub) = start_endpoints().await;
    let (mut lines, mut write_half) = connect(client_addr).await;

    let greeting = read_line(&mut lines).await;
    assert_eq!(greeting["type"], "status_update");

    send(
        &mut write_half,
        json!({"command_type": "rf_control", "command": "start_simulation"}),
    )
    .await;

    // Collect lines until we have seen the ack and a frame.
    let mut saw_ack = false;
    let mut saw_frame = false;
    for _ in 0..10 {
        let value = read_line(&mut lines).await;
        match value["type"].as_str().unwrap() {
            "command_response" => saw_ack = true,
            "rf_simulated_data" => {
                let details = &value["payload"]["wave_details"];
                assert_eq!(details["frequency_hz"].as_f64(), Some(1_000.0));
                saw_frame = true;
            }
            other => panic!("unexpected line: {other}"),
        }
        if saw_ack && saw_frame {
            break;
        }
    }
    assert!(saw_ack, "start was never acknowledged");
    assert!(saw_frame, "no frame delivered after start");

    send(
        &mut write_half,
        json!({"command_type": "rf_control", "command": "stop_simulation"}),
    )
    .await;
}

#[tokio::test]
async fn malformed_and_unknown_commands_keep_the_connection() {
    let (client_addr, _ingest_addr, _hub) = start_endpoints().await;
    let (mut lines, mut write_half) = connect(client_addr).await;
    read_line(&mut lines).await; // greeting

    write_half.write_all(b"not json at all\n").await.unwrap();
    let ack = read_line(&mut lines).await;
    assert_eq!(ack["type"], "error_response");
    assert_eq!(ack["message"], "Invalid command format.");

    send(
        &mut write_half,
        json!({"command_type": "rf_control", "command": "teleport"}),
    )
    .await;
    let ack = read_line(&mut lines).await;
    assert_eq!(ack["type"], "error_response");
    assert!(ack["message"].as_str().unwrap().contains("teleport"));

    // Connection still works after both errors.
    send(
        &mut write_half,
        json!({
            "command_type": "rf_control",
            "command": "configure_cosine",
            "params": {"frequency_hz": 1_500.0}
        }),
    )
    .await;
    let ack = read_line(&mut lines).await;
    assert_eq!(ack["type"], "command_response");
}

#[tokio::test]
async fn invalid_configure_is_rejected_with_reason() {
    let (client_addr, _ingest_addr, _hub) = start_endpoints().await;
    let (mut lines, mut write_half) = connect(client_addr).await;
    read_line(&mut lines).await; // greeting

    send(
        &mut write_half,
        json!({
            "command_type": "rf_control",
            "command": "configure_cosine",
            "params": {"frequency_hz": -50.0}
        }),
    )
    .await;
    let ack = read_line(&mut lines).await;
    assert_eq!(ack["type"], "error_response");
    assert!(ack["message"].as_str().unwrap().contains("frequency_hz"));
}

#[tokio::test]
async fn pushed_frames_reach_subscribers() {
    let (client_addr, ingest_addr, _hub) = start_endpoints().await;

    let (mut sub_lines, _sub_write) = connect(client_addr).await;
    read_line(&mut sub_lines).await; // greeting

    let (mut ingest_lines, mut ingest_write) = connect(ingest_addr).await;
    send(
        &mut ingest_write,
        json!({
            "time_s": [0.0, 0.001],
            "amplitude_v": [0.5, -0.5],
            "wave_details": {
                "frequency_hz": 500.0, "amplitude_v": 0.5,
                "time_per_div_s": 0.0002, "duration_s": 0.002,
                "actual_sample_rate_hz": 1000.0, "num_points_time": 2
            },
            "fft_frequencies_hz": [0.0, 500.0],
            "fft_power_dbm": [-20.0, 0.0],
            "spectrum_details": {
                "ref_level_dbm": 0.0, "num_points_fft": 2,
                "fft_start_freq_hz": 0.0, "fft_stop_freq_hz": 500.0
            },
            "timestamp": 123.456
        }),
    )
    .await;

    let ack = read_line(&mut ingest_lines).await;
    assert_eq!(ack["status"], "success");

    let delivery = read_line(&mut sub_lines).await;
    assert_eq!(delivery["type"], "rf_simulated_data");
    assert_eq!(delivery["payload"]["timestamp"].as_f64(), Some(123.456));
    assert_eq!(
        delivery["payload"]["wave_details"]["frequency_hz"].as_f64(),
        Some(500.0)
    );
}

#[tokio::test]
async fn incomplete_pushed_frame_is_rejected_whole() {
    let (client_addr, ingest_addr, _hub) = start_endpoints().await;

    let (mut sub_lines, _sub_write) = connect(client_addr).await;
    read_line(&mut sub_lines).await; // greeting

    let (mut ingest_lines, mut ingest_write) = connect(ingest_addr).await;
    send(
        &mut ingest_write,
        json!({"time_s": [0.0], "amplitude_v": [1.0]}),
    )
    .await;

    let ack = read_line(&mut ingest_lines).await;
    assert_eq!(ack["status"], "error");

    // Subscriber got nothing.
    let quiet = timeout(Duration::from_millis(200), sub_lines.next_line()).await;
    assert!(quiet.is_err(), "rejected frame leaked to a subscriber");
}

#[tokio::test]
async fn subscribers_are_isolated_per_connection() {
    let (client_addr, _ingest_addr, hub) = start_endpoints().await;

    let (mut lines_a, _write_a) = connect(client_addr).await;
    let (mut lines_b, _write_b) = connect(client_addr).await;
    read_line(&mut lines_a).await;
    read_line(&mut lines_b).await;

    // Both joined the group with distinct ids.
    for _ in 0..50 {
        if hub.member_count(GROUP).await == 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected two distinct group members");
}
