// src/types.rs
//
// Shared types for the pilot: decoded telemetry, outbound commands and the
// server envelope that wraps every inbound frame.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Altitude-sensing tier reported by the simulator.
///
/// Always stored upper-cased; anything other than the three known tiers is
/// kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sensor {
    Green,
    Yellow,
    Red,
    Other(String),
}

impl Sensor {
    /// Canonicalise a raw sensor word (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        let upper = raw.to_ascii_uppercase();
        match upper.as_str() {
            "GREEN" => Sensor::Green,
            "YELLOW" => Sensor::Yellow,
            "RED" => Sensor::Red,
            _ => Sensor::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Sensor::Green => "GREEN",
            Sensor::Yellow => "YELLOW",
            Sensor::Red => "RED",
            Sensor::Other(name) => name.as_str(),
        }
    }

    /// Highest altitude the pilot will hold before commanding a descent.
    /// Unknown tiers get the GREEN ceiling.
    pub fn altitude_ceiling(&self) -> i64 {
        match self {
            Sensor::Green => 5000,
            Sensor::Yellow => 999,
            Sensor::Red => 2,
            Sensor::Other(_) => 5000,
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Sensor {
    fn from(value: String) -> Self {
        Sensor::parse(&value)
    }
}

impl From<Sensor> for String {
    fn from(value: Sensor) -> Self {
        value.as_str().to_string()
    }
}

/// One decoded telemetry report. Built fresh for every inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub x: i64,
    /// Altitude.
    pub y: i64,
    pub battery: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub wind: f64,
    pub dust: f64,
    pub sensor: Sensor,
}

/// Horizontal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    #[serde(rename = "fwd")]
    Forward,
    #[serde(rename = "rev")]
    Reverse,
}

/// Control command sent back to the simulator.
///
/// Wire shape: `{"speed": 3, "altitude": 0, "movement": "fwd"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// 0..=5
    pub speed: u8,
    /// -1, 0 or +1
    #[serde(rename = "altitude")]
    pub altitude_delta: i8,
    pub movement: Movement,
}

impl Command {
    pub const fn new(speed: u8, altitude_delta: i8, movement: Movement) -> Self {
        Self {
            speed,
            altitude_delta,
            movement,
        }
    }

    /// Fixed command issued whenever any safety predicate fires.
    pub const fn emergency_landing() -> Self {
        Self::new(0, -1, Movement::Reverse)
    }

    /// First command sent right after connecting.
    pub const fn seed() -> Self {
        Self::new(1, 1, Movement::Forward)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Run metrics attached to every server frame.
///
/// Missing or wrong-typed fields read as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub total_distance: f64,
    pub iterations: u64,
}

impl Metrics {
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(obj) = value.and_then(|v| v.as_object()) else {
            return Self::default();
        };
        Self {
            total_distance: obj
                .get("total_distance")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            iterations: obj
                .get("iterations")
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Ok,
    Crashed,
}

/// Decoded server frame:
/// `{"telemetry": "...", "metrics": {...}, "status": "ok"|"crashed"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEnvelope {
    /// Raw telemetry string; `None` if the key is absent or not a string.
    pub telemetry: Option<String>,
    pub metrics: Metrics,
    pub status: ServerStatus,
}

impl ServerEnvelope {
    /// Decode a text frame.
    ///
    /// Only malformed JSON is an error. Well-formed frames with missing keys
    /// decode with defaults: no telemetry, zero metrics, status `Ok`.
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let status = match value.get("status").and_then(|v| v.as_str()) {
            Some("crashed") => ServerStatus::Crashed,
            _ => ServerStatus::Ok,
        };
        Ok(Self {
            telemetry: value
                .get("telemetry")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            metrics: Metrics::from_value(value.get("metrics")),
            status,
        })
    }

    pub fn is_crashed(&self) -> bool {
        self.status == ServerStatus::Crashed
    }
}
