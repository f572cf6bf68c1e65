// src/safety.rs
//
// Safety monitor: independent crash predicates evaluated every cycle.
//
// Every predicate is checked on every report (no short-circuit) so the
// verdict lists all reasons that fired together. The verdict only changes
// what the pilot commands; the simulator remains the authority on whether
// the vehicle actually crashed.

use std::fmt;

use crate::types::{Sensor, TelemetryRecord};

/// Horizontal range limit (absolute x).
pub const MAX_X_RANGE: i64 = 100_000;
/// Tilt above this is treated as unrecoverable.
pub const CRITICAL_TILT_DEGREES: f64 = 45.0;
/// Gyro units per degree.
pub const DEGREES_TO_GYRO: f64 = 1.0 / 90.0;

/// Planar gyro magnitude (gx, gy only) converted to degrees.
pub fn tilt_degrees(gx: f64, gy: f64) -> f64 {
    (gx * gx + gy * gy).sqrt() / DEGREES_TO_GYRO
}

/// Crash predicates, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashReason {
    BatteryDepleted,
    GroundCollision,
    RangeExceeded,
    ExcessiveTilt,
    UnsafeSensorAltitude,
}

impl CrashReason {
    pub const ALL: [CrashReason; 5] = [
        CrashReason::BatteryDepleted,
        CrashReason::GroundCollision,
        CrashReason::RangeExceeded,
        CrashReason::ExcessiveTilt,
        CrashReason::UnsafeSensorAltitude,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrashReason::BatteryDepleted => "battery_depleted",
            CrashReason::GroundCollision => "ground_collision",
            CrashReason::RangeExceeded => "range_exceeded",
            CrashReason::ExcessiveTilt => "excessive_tilt",
            CrashReason::UnsafeSensorAltitude => "unsafe_sensor_altitude",
        }
    }

    fn triggered(&self, t: &TelemetryRecord, tilt: f64) -> bool {
        match self {
            CrashReason::BatteryDepleted => t.battery <= 0.0,
            CrashReason::GroundCollision => t.y < 0,
            CrashReason::RangeExceeded => t.x.unsigned_abs() > MAX_X_RANGE as u64,
            CrashReason::ExcessiveTilt => tilt > CRITICAL_TILT_DEGREES,
            // RED: y >= 3, YELLOW: y >= 1000. GREEN and unknown tiers never fire.
            CrashReason::UnsafeSensorAltitude => {
                matches!(t.sensor, Sensor::Red | Sensor::Yellow)
                    && t.y > t.sensor.altitude_ceiling()
            }
        }
    }

    /// Human-readable log line for this reason against a given report.
    pub fn describe(&self, t: &TelemetryRecord, tilt: f64) -> String {
        match self {
            CrashReason::BatteryDepleted => "Battery depleted".to_string(),
            CrashReason::GroundCollision => "Ground collision".to_string(),
            CrashReason::RangeExceeded => "Range exceeded".to_string(),
            CrashReason::ExcessiveTilt => format!(
                "Excessive tilt: {:.2}° > {}°",
                tilt, CRITICAL_TILT_DEGREES
            ),
            CrashReason::UnsafeSensorAltitude => {
                format!("Unsafe altitude for {} sensor: y={}", t.sensor, t.y)
            }
        }
    }
}

impl fmt::Display for CrashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one safety evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyVerdict {
    /// Triggered reasons in `CrashReason::ALL` order.
    pub reasons: Vec<CrashReason>,
    pub tilt_degrees: f64,
}

impl SafetyVerdict {
    pub fn must_land(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn contains(&self, reason: CrashReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn descriptions(&self, t: &TelemetryRecord) -> Vec<String> {
        self.reasons
            .iter()
            .map(|r| r.describe(t, self.tilt_degrees))
            .collect()
    }
}

/// Evaluate every crash predicate against one report.
pub fn evaluate(t: &TelemetryRecord) -> SafetyVerdict {
    let tilt = tilt_degrees(t.gx, t.gy);
    let reasons = CrashReason::ALL
        .iter()
        .copied()
        .filter(|r| r.triggered(t, tilt))
        .collect();
    SafetyVerdict {
        reasons,
        tilt_degrees: tilt,
    }
}
