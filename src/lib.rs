//! Dronepilot core library.
//!
//! This crate exposes the telemetry codec, the safety monitor, the two
//! decision policies (rule-based and tabular Q-learning) and the session
//! loop that drives them over a websocket. The binary (`src/main.rs`) is a
//! thin harness around these components.

pub mod config;
pub mod crash_log;
pub mod logging;
pub mod pilot;
pub mod policy;
pub mod rl;
pub mod safety;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{Config, PolicyKind, RlConfig};

pub use crash_log::CrashLogSummary;

pub use logging::{EventSink, JsonlSink, MemorySink, NoopSink, StepKind, StepRecord};

pub use pilot::{PilotMode, PilotState, RulePilot};

pub use policy::{Observation, Policy};

pub use rl::{LearningParams, QLearningPolicy, QTable, StateKey};

pub use safety::{evaluate, CrashReason, SafetyVerdict};

pub use session::{
    connect_and_run, run_session, SessionConfig, SessionOutcome, SessionReport,
};

pub use telemetry::{format_telemetry, parse_telemetry, TelemetryParseError};

pub use transport::{MockFrame, MockTransport, Transport, TransportError, WsTransport};

pub use types::{Command, Metrics, Movement, Sensor, ServerEnvelope, ServerStatus, TelemetryRecord};

/// Build the policy selected by `cfg`. The RL policy loads its table from
/// `cfg.rl.qtable_path` and saves back to it when the session ends.
pub fn build_policy(cfg: &Config) -> Box<dyn Policy> {
    match cfg.policy {
        PolicyKind::Rule => Box::new(RulePilot::new()),
        PolicyKind::Rl => Box::new(QLearningPolicy::from_config(&cfg.rl)),
    }
}
