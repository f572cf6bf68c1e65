// tests/websocket_loopback_tests.rs
//
// Real websocket round trip against a scripted in-process simulator.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use dronepilot::{
    connect_and_run, Command, Config, CrashLogSummary, Movement, NoopSink, RulePilot,
    SessionOutcome,
};

/// Accept one client, answer each received command with the next scripted
/// frame and return every command the client sent. Closes once the script
/// runs out.
async fn spawn_simulator(script: Vec<String>) -> (SocketAddr, JoinHandle<Vec<Command>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ws");
    let addr = listener.local_addr().expect("ws addr");
    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let mut script = script.into_iter();
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            received.push(serde_json::from_str::<Command>(&text).expect("command json"));
            match script.next() {
                Some(frame) => {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
        received
    });
    (addr, handle)
}

fn frame(telemetry: &str, distance: f64, iterations: u64, status: &str) -> String {
    serde_json::json!({
        "telemetry": telemetry,
        "metrics": { "total_distance": distance, "iterations": iterations },
        "status": status,
    })
    .to_string()
}

fn config_for(addr: SocketAddr) -> Config {
    Config {
        ws_url: format!("ws://{addr}"),
        step_delay: Duration::ZERO,
        session_timeout: Some(Duration::from_secs(10)),
        ..Config::default()
    }
}

#[tokio::test]
async fn rule_pilot_flies_until_server_reports_crash() {
    let (addr, server) = spawn_simulator(vec![
        frame(
            "X-0-Y-1-BAT-60.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-GREEN",
            1.0,
            1,
            "ok",
        ),
        frame(
            "X-5-Y-2-BAT-59.5-GYR-[0,0,0]-WIND-0-DUST-0-SENS-GREEN",
            5.0,
            2,
            "ok",
        ),
        frame(
            "X-5-Y--1-BAT-59.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-GREEN",
            6.0,
            3,
            "crashed",
        ),
    ])
    .await;

    let cfg = config_for(addr);
    let mut pilot = RulePilot::new();
    let report = connect_and_run(&cfg, &mut pilot, &mut NoopSink).await;
    let received = server.await.expect("server task");

    assert_eq!(report.outcome, SessionOutcome::Crashed);
    assert_eq!(
        received,
        vec![
            Command::seed(),
            Command::new(4, 1, Movement::Forward),
            Command::new(4, 1, Movement::Forward),
        ]
    );
    assert_eq!(report.local_iterations, 2);
    assert_eq!(report.final_distance, 6.0);
    assert_eq!(report.server_iterations, 3);

    let summary = CrashLogSummary::from_reports(&[report]);
    assert_eq!(summary.iterations, vec![2]);
    assert_eq!(summary.distances, vec![6.0]);
}

#[tokio::test]
async fn server_hangup_ends_session_closed() {
    let (addr, server) = spawn_simulator(vec![frame(
        "X-0-Y-10-BAT-90.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-GREEN",
        0.0,
        1,
        "ok",
    )])
    .await;

    let cfg = config_for(addr);
    let mut pilot = RulePilot::new();
    let report = connect_and_run(&cfg, &mut pilot, &mut NoopSink).await;
    let received = server.await.expect("server task");

    assert_eq!(report.outcome, SessionOutcome::Closed);
    assert_eq!(received.len(), 2);
    assert_eq!(received[1], Command::new(5, 0, Movement::Forward));
}

#[tokio::test]
async fn unreachable_simulator_is_a_fault() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let cfg = config_for(addr);
    let mut pilot = RulePilot::new();
    let report = connect_and_run(&cfg, &mut pilot, &mut NoopSink).await;
    assert!(matches!(report.outcome, SessionOutcome::Faulted(_)));
    assert_eq!(report.commands_sent, 0);
}

/// Read until the next text command, collecting pong payloads on the way.
async fn next_command(ws: &mut WebSocketStream<TcpStream>, pongs: &mut Vec<Vec<u8>>) -> Command {
    while let Some(msg) = ws.next().await {
        match msg.expect("client frame") {
            Message::Text(text) => return serde_json::from_str(&text).expect("command json"),
            Message::Pong(payload) => pongs.push(payload),
            _ => {}
        }
    }
    panic!("client went away before sending a command");
}

#[tokio::test]
async fn pings_are_answered_and_binary_frames_decoded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ws");
    let addr = listener.local_addr().expect("ws addr");
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let mut pongs = Vec::new();
        let mut commands = vec![next_command(&mut ws, &mut pongs).await];

        ws.send(Message::Ping(vec![7, 7, 7])).await.expect("ping");
        ws.send(Message::Binary(vec![0xff, 0xfe, 0xfd]))
            .await
            .expect("non-utf8 binary");
        let envelope = frame(
            "X-0-Y-10-BAT-90.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-GREEN",
            2.0,
            1,
            "ok",
        );
        ws.send(Message::Binary(envelope.into_bytes()))
            .await
            .expect("utf8 binary");
        commands.push(next_command(&mut ws, &mut pongs).await);

        ws.send(Message::Text(frame("", 2.0, 2, "crashed")))
            .await
            .expect("crash frame");
        while let Some(Ok(_)) = ws.next().await {}
        (pongs, commands)
    });

    let cfg = config_for(addr);
    let mut pilot = RulePilot::new();
    let report = connect_and_run(&cfg, &mut pilot, &mut NoopSink).await;
    let (pongs, commands) = server.await.expect("server task");

    assert_eq!(report.outcome, SessionOutcome::Crashed);
    assert!(pongs.iter().any(|p| p == &vec![7, 7, 7]), "pongs: {pongs:?}");
    assert_eq!(
        commands,
        vec![Command::seed(), Command::new(5, 0, Movement::Forward)]
    );
    // The invalid binary frame is dropped without counting as a frame.
    assert_eq!(report.frames_received, 2);
    assert_eq!(report.skipped_frames, 0);
}
