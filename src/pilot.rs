// src/pilot.rs
//
// Rule-based pilot.
//
// Two modes per cycle:
// - Emergency: any safety predicate fired; land (speed 0, descend, reverse).
// - Cruise: pick an altitude correction from altitude/tilt/sensor ceiling
//   and a speed from the reported battery band.
//
// The pilot also keeps its own battery estimate, decayed by a drain model of
// speed and altitude. It never gates commands; it is diagnostic only.

use crate::policy::{Observation, Policy};
use crate::safety::SafetyVerdict;
use crate::types::{Command, Movement, TelemetryRecord};

/// Climb when below this altitude.
pub const MIN_SAFE_ALTITUDE: i64 = 3;
/// Pre-emptive leveling climb above this tilt (below the hard 45° limit).
pub const LEVELING_TILT_DEGREES: f64 = 35.0;
/// Battery drain per unit of speed per cycle, before the altitude factor.
pub const BASE_DRAIN: f64 = 0.1;
pub const INITIAL_BATTERY_ESTIMATE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotMode {
    Cruise,
    Emergency,
}

/// Mutable per-session pilot state.
#[derive(Debug, Clone, PartialEq)]
pub struct PilotState {
    pub battery_estimate: f64,
    pub mode: PilotMode,
    /// Cruise steps with non-zero speed and a non-zero altitude change.
    pub local_iterations: u64,
}

impl Default for PilotState {
    fn default() -> Self {
        Self {
            battery_estimate: INITIAL_BATTERY_ESTIMATE,
            mode: PilotMode::Cruise,
            local_iterations: 0,
        }
    }
}

/// Speed band from reported battery. Boundaries are strict: 75.0 → 4.
pub fn speed_for_battery(battery: f64) -> u8 {
    if battery > 75.0 {
        5
    } else if battery > 50.0 {
        4
    } else if battery > 30.0 {
        3
    } else if battery > 15.0 {
        2
    } else {
        1
    }
}

/// Drain multiplier: flying low costs more, flying high (above 1000) costs
/// less, floored at 0.6.
pub fn altitude_factor(y: i64) -> f64 {
    if y < 100 {
        1.0 + 0.8 * (100 - y) as f64 / 100.0
    } else if y > 1000 {
        (1.0 - 0.4 * (y - 1000) as f64 / 4000.0).max(0.6)
    } else {
        1.0
    }
}

fn altitude_delta(t: &TelemetryRecord, tilt_degrees: f64) -> i8 {
    if t.y < MIN_SAFE_ALTITUDE {
        1
    } else if t.y > t.sensor.altitude_ceiling() {
        -1
    } else if tilt_degrees > LEVELING_TILT_DEGREES {
        1
    } else {
        0
    }
}

/// Decide one command and advance `state`.
pub fn decide(t: &TelemetryRecord, verdict: &SafetyVerdict, state: &mut PilotState) -> Command {
    if verdict.must_land() {
        if state.mode != PilotMode::Emergency {
            eprintln!("[EMERGENCY LANDING]");
        }
        state.mode = PilotMode::Emergency;
        return Command::emergency_landing();
    }
    state.mode = PilotMode::Cruise;

    let altitude = altitude_delta(t, verdict.tilt_degrees);
    let speed = speed_for_battery(t.battery);

    let drain = BASE_DRAIN * speed as f64 * altitude_factor(t.y);
    state.battery_estimate = (state.battery_estimate - drain).max(0.0);

    if speed > 0 && altitude != 0 {
        state.local_iterations += 1;
    }

    Command::new(speed, altitude, Movement::Forward)
}

/// Session-facing wrapper around [`decide`].
#[derive(Debug, Default)]
pub struct RulePilot {
    state: PilotState,
}

impl RulePilot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PilotState {
        &self.state
    }
}

impl Policy for RulePilot {
    fn name(&self) -> &str {
        "rule"
    }

    fn decide(&mut self, obs: &Observation<'_>) -> Command {
        decide(obs.telemetry, obs.verdict, &mut self.state)
    }

    fn local_iterations(&self) -> u64 {
        self.state.local_iterations
    }
}
