// src/policy.rs
//
// Policy trait: the seam between the session loop and the decision
// strategies (rule-based pilot, tabular Q-learning).

use crate::safety::SafetyVerdict;
use crate::types::{Command, Metrics, TelemetryRecord};

/// Everything a policy may look at for one decision cycle.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub telemetry: &'a TelemetryRecord,
    pub verdict: &'a SafetyVerdict,
    pub metrics: &'a Metrics,
}

/// Decision strategy driven by the session loop, one call per decoded
/// telemetry report.
pub trait Policy: Send {
    /// Stable identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Choose the command for this cycle. May update internal state.
    fn decide(&mut self, obs: &Observation<'_>) -> Command;

    /// Server reported a crash; no further `decide` calls follow.
    fn on_crash(&mut self, _metrics: &Metrics) {}

    /// Flush durable state. Called exactly once when the session ends,
    /// whatever the outcome.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Steps this policy counts toward the local iteration tally.
    fn local_iterations(&self) -> u64;
}
