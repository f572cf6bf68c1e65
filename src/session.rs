// src/session.rs
//
// Session loop: one connection, strictly alternating receive -> decide -> send.
//
//   CONNECTING --seed command--> ACTIVE --+--> CRASHED  (server status "crashed")
//                                         +--> CLOSED   (peer closed)
//                                         +--> FAULTED  (transport error / malformed frame)
//
// Within ACTIVE a frame whose telemetry does not parse is skipped: no
// command is sent and no iteration is counted. The policy's `finish` runs
// once after any terminal state, including a timeout or the caller
// dropping the session future.

use std::time::Duration;

use crate::config::Config;
use crate::logging::{EventSink, StepKind, StepRecord, STEP_SCHEMA_VERSION};
use crate::policy::{Observation, Policy};
use crate::safety;
use crate::telemetry::parse_telemetry;
use crate::transport::{Transport, TransportError, WsTransport};
use crate::types::{Command, Metrics, ServerEnvelope};

/// Terminal state of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Server reported `status: crashed`.
    Crashed,
    /// Connection closed by the peer.
    Closed,
    /// Transport error, malformed frame or failed connect.
    Faulted(String),
    /// The session deadline elapsed first.
    TimedOut,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Crashed => "crashed",
            SessionOutcome::Closed => "closed",
            SessionOutcome::Faulted(_) => "faulted",
            SessionOutcome::TimedOut => "timed_out",
        }
    }

    fn from_transport(err: TransportError) -> Self {
        if err.is_closed() {
            eprintln!("[Connection Closed]: {err}");
            SessionOutcome::Closed
        } else {
            eprintln!("[Unhandled Exception]: {err}");
            SessionOutcome::Faulted(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Pause after each sent command.
    pub step_delay: Duration,
    pub timeout: Option<Duration>,
    /// Sent once, right after connecting.
    pub seed_command: Command,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            step_delay: cfg.step_delay,
            timeout: cfg.session_timeout,
            seed_command: Command::seed(),
        }
    }
}

/// Summary handed to the crash log.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub policy: String,
    pub outcome: SessionOutcome,
    pub local_iterations: u64,
    /// Last locally detected crash reason, or "Unknown".
    pub crash_reason: String,
    /// Last reported `total_distance`.
    pub final_distance: f64,
    /// Last reported server `iterations`.
    pub server_iterations: u64,
    pub frames_received: u64,
    /// Includes the seed command.
    pub commands_sent: u64,
    pub skipped_frames: u64,
    /// Set when the policy failed to persist its state.
    pub flush_error: Option<String>,
}

#[derive(Debug, Default)]
struct Progress {
    frames_received: u64,
    commands_sent: u64,
    skipped_frames: u64,
    last_reason: Option<String>,
    last_metrics: Metrics,
}

async fn send_command<T>(transport: &mut T, command: &Command) -> Result<(), SessionOutcome>
where
    T: Transport + ?Sized,
{
    let text = command
        .to_json()
        .map_err(|err| SessionOutcome::Faulted(format!("encode command: {err}")))?;
    transport
        .send_text(text)
        .await
        .map_err(SessionOutcome::from_transport)
}

async fn drive<T, P, S>(
    transport: &mut T,
    policy: &mut P,
    sink: &mut S,
    cfg: &SessionConfig,
    progress: &mut Progress,
) -> SessionOutcome
where
    T: Transport + ?Sized,
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    if let Err(outcome) = send_command(transport, &cfg.seed_command).await {
        return outcome;
    }
    progress.commands_sent += 1;

    loop {
        let text = match transport.recv_text().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                eprintln!("[Connection Closed]");
                return SessionOutcome::Closed;
            }
            Err(err) => return SessionOutcome::from_transport(err),
        };
        progress.frames_received += 1;

        let envelope = match ServerEnvelope::decode(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                let snippet: String = text.chars().take(160).collect();
                eprintln!("[Unhandled Exception]: malformed frame: {err} snippet={snippet}");
                return SessionOutcome::Faulted(format!("malformed frame: {err}"));
            }
        };
        progress.last_metrics = envelope.metrics.clone();
        let step = progress.frames_received;

        if envelope.is_crashed() {
            policy.on_crash(&envelope.metrics);
            eprintln!(
                "[CRASHED] Server Iterations: {}",
                envelope.metrics.iterations
            );
            eprintln!("[LOCAL ITERATIONS]: {}", policy.local_iterations());
            sink.log_step(&StepRecord {
                schema_version: STEP_SCHEMA_VERSION,
                step,
                policy: policy.name().to_string(),
                kind: StepKind::Crashed,
                telemetry: envelope.telemetry.clone(),
                reasons: Vec::new(),
                command: None,
                total_distance: envelope.metrics.total_distance,
                server_iterations: envelope.metrics.iterations,
            });
            return SessionOutcome::Crashed;
        }

        let raw = envelope.telemetry.as_deref().unwrap_or("");
        let telemetry = match parse_telemetry(raw) {
            Ok(t) => t,
            Err(err) => {
                eprintln!("[Invalid telemetry]: {err}");
                progress.skipped_frames += 1;
                sink.log_step(&StepRecord {
                    schema_version: STEP_SCHEMA_VERSION,
                    step,
                    policy: policy.name().to_string(),
                    kind: StepKind::Skipped,
                    telemetry: envelope.telemetry.clone(),
                    reasons: Vec::new(),
                    command: None,
                    total_distance: envelope.metrics.total_distance,
                    server_iterations: envelope.metrics.iterations,
                });
                continue;
            }
        };

        let verdict = safety::evaluate(&telemetry);
        for line in verdict.descriptions(&telemetry) {
            eprintln!("[CRASH] {line}");
            progress.last_reason = Some(line);
        }

        let command = policy.decide(&Observation {
            telemetry: &telemetry,
            verdict: &verdict,
            metrics: &envelope.metrics,
        });

        sink.log_step(&StepRecord {
            schema_version: STEP_SCHEMA_VERSION,
            step,
            policy: policy.name().to_string(),
            kind: StepKind::Command,
            telemetry: envelope.telemetry.clone(),
            reasons: verdict.reasons.iter().map(|r| r.as_str()).collect(),
            command: Some(command),
            total_distance: envelope.metrics.total_distance,
            server_iterations: envelope.metrics.iterations,
        });

        if let Err(outcome) = send_command(transport, &command).await {
            return outcome;
        }
        progress.commands_sent += 1;

        tokio::time::sleep(cfg.step_delay).await;
    }
}

/// Flushes the policy and sink when a session ends, including when the
/// caller drops the session future before it completes.
struct FlushGuard<'a, P, S>
where
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    policy: &'a mut P,
    sink: &'a mut S,
    armed: bool,
}

impl<'a, P, S> FlushGuard<'a, P, S>
where
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    fn new(policy: &'a mut P, sink: &'a mut S) -> Self {
        Self {
            policy,
            sink,
            armed: true,
        }
    }

    /// Flush once and disarm. Returns the policy's persistence error, if any.
    fn complete(&mut self) -> Option<String> {
        self.armed = false;
        let flush_error = match self.policy.finish() {
            Ok(()) => None,
            Err(err) => {
                eprintln!(
                    "WARN: policy {} failed to persist state: {err:#}",
                    self.policy.name()
                );
                Some(format!("{err:#}"))
            }
        };
        self.sink.flush();
        flush_error
    }

    fn report(&mut self, outcome: SessionOutcome, progress: Progress) -> SessionReport {
        let flush_error = self.complete();
        SessionReport {
            policy: self.policy.name().to_string(),
            outcome,
            local_iterations: self.policy.local_iterations(),
            crash_reason: progress
                .last_reason
                .unwrap_or_else(|| "Unknown".to_string()),
            final_distance: progress.last_metrics.total_distance,
            server_iterations: progress.last_metrics.iterations,
            frames_received: progress.frames_received,
            commands_sent: progress.commands_sent,
            skipped_frames: progress.skipped_frames,
            flush_error,
        }
    }
}

impl<P, S> Drop for FlushGuard<'_, P, S>
where
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    fn drop(&mut self) {
        if self.armed {
            eprintln!("WARN: session cancelled; flushing policy {}", self.policy.name());
            self.complete();
        }
    }
}

async fn run_guarded<T, P, S>(
    transport: &mut T,
    guard: &mut FlushGuard<'_, P, S>,
    cfg: &SessionConfig,
) -> SessionReport
where
    T: Transport + ?Sized,
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    let mut progress = Progress::default();

    let outcome = {
        let fut = drive(
            transport,
            &mut *guard.policy,
            &mut *guard.sink,
            cfg,
            &mut progress,
        );
        match cfg.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    eprintln!("WARN: session timed out after {}ms", limit.as_millis());
                    SessionOutcome::TimedOut
                }
            },
            None => fut.await,
        }
    };

    transport.close().await;
    guard.report(outcome, progress)
}

/// Run one session over an already-connected transport.
///
/// Always returns a report; the policy is flushed whatever the outcome.
/// Dropping the returned future early still flushes.
pub async fn run_session<T, P, S>(
    transport: &mut T,
    policy: &mut P,
    sink: &mut S,
    cfg: &SessionConfig,
) -> SessionReport
where
    T: Transport + ?Sized,
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    let mut guard = FlushGuard::new(policy, sink);
    run_guarded(transport, &mut guard, cfg).await
}

/// Connect to `cfg.ws_url` and run one session.
///
/// A failed connect ends as `Faulted`; the policy is still flushed.
pub async fn connect_and_run<P, S>(cfg: &Config, policy: &mut P, sink: &mut S) -> SessionReport
where
    P: Policy + ?Sized,
    S: EventSink + ?Sized,
{
    let session_cfg = SessionConfig::from_config(cfg);
    let mut guard = FlushGuard::new(policy, sink);
    match WsTransport::connect(&cfg.ws_url).await {
        Ok(mut transport) => run_guarded(&mut transport, &mut guard, &session_cfg).await,
        Err(err) => {
            eprintln!("[Unhandled Exception]: connect {} failed: {err:#}", cfg.ws_url);
            guard.report(
                SessionOutcome::Faulted(format!("connect: {err:#}")),
                Progress::default(),
            )
        }
    }
}
