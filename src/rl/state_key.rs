// src/rl/state_key.rs
//
// Discretisation of a telemetry report into a Q-table key.

use serde::{Deserialize, Serialize};

use crate::types::{Sensor, TelemetryRecord};

pub const ALTITUDE_BUCKET: i64 = 100;
pub const BATTERY_BUCKET: f64 = 10.0;
/// Raw gyro magnitude (not degrees) per tilt bucket.
pub const TILT_BUCKET: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    pub altitude_bucket: i64,
    pub battery_bucket: i64,
    pub tilt_bucket: i64,
    pub sensor: Sensor,
}

impl StateKey {
    /// `(floor(y/100), floor(battery/10), floor(|(gx,gy)|/10), sensor)`.
    pub fn from_telemetry(t: &TelemetryRecord) -> Self {
        let magnitude = (t.gx * t.gx + t.gy * t.gy).sqrt();
        Self {
            altitude_bucket: t.y.div_euclid(ALTITUDE_BUCKET),
            battery_bucket: (t.battery / BATTERY_BUCKET).floor() as i64,
            tilt_bucket: (magnitude / TILT_BUCKET).floor() as i64,
            sensor: t.sensor.clone(),
        }
    }
}
