// tests/session_flow_tests.rs
//
// Session loop driven end to end over scripted transports.

use std::time::Duration;

use dronepilot::rl::{decode_action, LearningParams, QLearningPolicy, QTable, StateKey};
use dronepilot::{
    parse_telemetry, run_session, Command, CrashLogSummary, MemorySink, MockFrame, MockTransport, Movement,
    NoopSink, Policy, RulePilot, SessionConfig, SessionOutcome, StepKind,
};

fn frame(telemetry: &str, distance: f64, iterations: u64, status: &str) -> String {
    serde_json::json!({
        "telemetry": telemetry,
        "metrics": { "total_distance": distance, "iterations": iterations },
        "status": status,
    })
    .to_string()
}

fn fast() -> SessionConfig {
    SessionConfig {
        step_delay: Duration::ZERO,
        timeout: None,
        seed_command: Command::seed(),
    }
}

const RED_AT_CEILING_PLUS_ONE: &str = "X-0-Y-3-BAT-40.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-RED";
const RED_AT_CEILING: &str = "X-0-Y-2-BAT-40.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-RED";
const CRUISE: &str = "X-120-Y-450-BAT-88.5-GYR-[0.01,-0.02,0]-WIND-3-DUST-1-SENS-GREEN";

fn rl_policy(path: &std::path::Path) -> QLearningPolicy {
    QLearningPolicy::new(
        QTable::load_or_empty(path),
        LearningParams::default(),
        0.0,
        Some(7),
    )
    .with_path(path.to_path_buf())
}

#[tokio::test]
async fn red_sensor_above_ceiling_sends_one_emergency_command_then_crashes() {
    let mut transport = MockTransport::from_texts([
        frame(RED_AT_CEILING_PLUS_ONE, 10.0, 1, "ok"),
        frame(RED_AT_CEILING_PLUS_ONE, 10.0, 2, "crashed"),
    ]);
    let mut pilot = RulePilot::new();
    let report = run_session(&mut transport, &mut pilot, &mut NoopSink, &fast()).await;

    assert_eq!(report.outcome, SessionOutcome::Crashed);
    assert_eq!(
        transport.sent_commands(),
        vec![Command::seed(), Command::new(0, -1, Movement::Reverse)]
    );
    assert_eq!(report.crash_reason, "Unsafe altitude for RED sensor: y=3");
    assert_eq!(report.local_iterations, 0);
    assert_eq!(report.final_distance, 10.0);
    assert_eq!(report.server_iterations, 2);
}

#[tokio::test]
async fn red_sensor_at_ceiling_keeps_cruising() {
    let mut transport = MockTransport::from_texts([
        frame(RED_AT_CEILING, 4.0, 1, "ok"),
        frame("", 4.0, 1, "crashed"),
    ]);
    let mut pilot = RulePilot::new();
    let report = run_session(&mut transport, &mut pilot, &mut NoopSink, &fast()).await;

    assert_eq!(report.outcome, SessionOutcome::Crashed);
    assert_eq!(
        transport.sent_commands(),
        vec![Command::seed(), Command::new(3, 1, Movement::Forward)]
    );
    assert_eq!(report.crash_reason, "Unknown");
    assert_eq!(report.local_iterations, 1);
}

#[tokio::test]
async fn step_records_follow_received_frames() {
    let mut transport = MockTransport::from_texts([
        frame(CRUISE, 1.0, 1, "ok"),
        frame("X-1-Y-2", 1.5, 2, "ok"),
        frame(RED_AT_CEILING_PLUS_ONE, 2.0, 3, "ok"),
        frame("", 2.0, 4, "crashed"),
    ]);
    let mut pilot = RulePilot::new();
    let mut sink = MemorySink::default();
    let report = run_session(&mut transport, &mut pilot, &mut sink, &fast()).await;

    assert_eq!(report.frames_received, 4);
    assert_eq!(report.skipped_frames, 1);
    assert_eq!(report.commands_sent, 3);

    let kinds: Vec<StepKind> = sink.records.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::Command,
            StepKind::Skipped,
            StepKind::Command,
            StepKind::Crashed
        ]
    );
    assert_eq!(sink.records[2].reasons, vec!["unsafe_sensor_altitude"]);
    assert_eq!(
        sink.records[2].command,
        Some(Command::emergency_landing())
    );
}

#[tokio::test]
async fn rl_crash_applies_terminal_update_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qtable.json");
    let state = StateKey::from_telemetry(&parse_telemetry(CRUISE).unwrap());

    let mut transport = MockTransport::from_texts([
        frame(CRUISE, 0.0, 1, "ok"),
        frame("", 0.0, 1, "crashed"),
    ]);
    let mut policy = rl_policy(&path);
    let report = run_session(&mut transport, &mut policy, &mut NoopSink, &fast()).await;

    assert_eq!(report.outcome, SessionOutcome::Crashed);
    assert_eq!(report.local_iterations, 1);
    assert_eq!(
        transport.sent_commands(),
        vec![Command::seed(), decode_action(0)]
    );

    let table = QTable::load(&path).unwrap().unwrap();
    assert!((table.value(&state, 0) - (-10.0)).abs() < 1e-12);

    // The next session starts from the persisted table and avoids the
    // penalised action.
    let mut transport = MockTransport::new([
        MockFrame::Text(frame(CRUISE, 0.0, 1, "ok")),
        MockFrame::Close,
    ]);
    let mut policy = rl_policy(&path);
    let report = run_session(&mut transport, &mut policy, &mut NoopSink, &fast()).await;
    assert_eq!(report.outcome, SessionOutcome::Closed);
    assert_eq!(transport.sent_commands()[1], decode_action(1));
}

#[tokio::test]
async fn rl_table_is_flushed_when_connection_closes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("closed.json");
    let mut transport = MockTransport::new([
        MockFrame::Text(frame(CRUISE, 3.0, 1, "ok")),
        MockFrame::Close,
    ]);
    let mut policy = rl_policy(&path);
    let report = run_session(&mut transport, &mut policy, &mut NoopSink, &fast()).await;

    assert_eq!(report.outcome, SessionOutcome::Closed);
    assert!(report.flush_error.is_none());
    assert!(QTable::load(&path).unwrap().is_some());
}

#[tokio::test]
async fn rl_table_is_flushed_on_fault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faulted.json");
    let mut transport = MockTransport::new([
        MockFrame::Text(frame(CRUISE, 3.0, 1, "ok")),
        MockFrame::Text(frame(CRUISE, 6.0, 2, "ok")),
        MockFrame::Text("not json".to_string()),
    ]);
    let mut policy = rl_policy(&path);
    let report = run_session(&mut transport, &mut policy, &mut NoopSink, &fast()).await;

    assert!(matches!(report.outcome, SessionOutcome::Faulted(_)));
    let table = QTable::load(&path).unwrap().unwrap();
    // One transition update: r = 6.0, alpha = 0.1, gamma * max(0) = 0.
    let state = StateKey::from_telemetry(&parse_telemetry(CRUISE).unwrap());
    assert!((table.value(&state, 0) - 0.6).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn rl_table_is_flushed_on_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timeout.json");
    let frames: Vec<String> = (0..50).map(|i| frame(CRUISE, i as f64, i, "ok")).collect();
    let mut transport = MockTransport::from_texts(frames);
    let mut policy = rl_policy(&path);
    let cfg = SessionConfig {
        step_delay: Duration::from_millis(100),
        timeout: Some(Duration::from_millis(350)),
        seed_command: Command::seed(),
    };
    let report = run_session(&mut transport, &mut policy, &mut NoopSink, &cfg).await;

    assert_eq!(report.outcome, SessionOutcome::TimedOut);
    assert_eq!(report.local_iterations, policy.local_iterations());
    assert!(QTable::load(&path).unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn rl_table_is_flushed_when_caller_drops_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancelled.json");
    let frames: Vec<String> = (0..50).map(|i| frame(CRUISE, i as f64, i, "ok")).collect();
    let mut transport = MockTransport::from_texts(frames);
    let mut policy = rl_policy(&path);
    let cfg = SessionConfig {
        step_delay: Duration::from_millis(100),
        timeout: None,
        seed_command: Command::seed(),
    };

    let cancelled = tokio::time::timeout(
        Duration::from_millis(350),
        run_session(&mut transport, &mut policy, &mut NoopSink, &cfg),
    )
    .await;

    assert!(cancelled.is_err());
    let table = QTable::load(&path).unwrap().unwrap();
    assert_eq!(&table, policy.table());
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn crash_log_reason_is_the_plain_description() {
    let mut transport = MockTransport::from_texts([
        frame(
            "X-0-Y--2-BAT-50.0-GYR-[0,0,0]-WIND-0-DUST-0-SENS-GREEN",
            9.0,
            4,
            "ok",
        ),
        frame("", 9.0, 5, "crashed"),
    ]);
    let mut pilot = RulePilot::new();
    let report = run_session(&mut transport, &mut pilot, &mut NoopSink, &fast()).await;

    let summary = CrashLogSummary::from_reports(&[report]);
    assert_eq!(summary.reasons, vec!["Ground collision"]);
    assert_eq!(summary.distances, vec![9.0]);
}
