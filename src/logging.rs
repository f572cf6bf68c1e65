// src/logging.rs
//
// Per-step event sinks for the session loop.
// - EventSink: trait used by the session loop
// - NoopSink:  discards all events
// - JsonlSink: writes one JSON object per step, configured from env
//
// Environment:
// - DRONEPILOT_STEP_LOG_MODE:   "off" (default) | "jsonl"
// - DRONEPILOT_STEP_LOG_PATH:   target file, required for "jsonl"
// - DRONEPILOT_STEP_LOG_APPEND: "1"/"true"/"yes" appends instead of truncating
//
// Sinks never fail the control loop: an I/O error disables the sink for the
// rest of the process.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::types::Command;

pub const STEP_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Telemetry decoded and a command sent.
    Command,
    /// Telemetry rejected; no command this cycle.
    Skipped,
    /// Server reported a crash.
    Crashed,
}

/// One record per received frame.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub schema_version: u32,
    pub step: u64,
    pub policy: String,
    pub kind: StepKind,
    pub telemetry: Option<String>,
    pub reasons: Vec<&'static str>,
    pub command: Option<Command>,
    pub total_distance: f64,
    pub server_iterations: u64,
}

/// Abstract sink for per-step events.
pub trait EventSink {
    fn log_step(&mut self, record: &StepRecord);

    fn flush(&mut self) {}
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_step(&mut self, _record: &StepRecord) {}
}

/// In-memory sink, handy for tests and post-run inspection.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<StepRecord>,
}

impl EventSink for MemorySink {
    fn log_step(&mut self, record: &StepRecord) {
        self.records.push(record.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLogMode {
    Off,
    Jsonl,
}

#[derive(Debug, Clone)]
pub struct StepLogConfig {
    pub mode: StepLogMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl StepLogConfig {
    pub fn from_env() -> Self {
        let mode = match env::var("DRONEPILOT_STEP_LOG_MODE") {
            Ok(s) if s.eq_ignore_ascii_case("jsonl") => StepLogMode::Jsonl,
            // Treat any unknown value as Off.
            _ => StepLogMode::Off,
        };
        let path = if mode == StepLogMode::Jsonl {
            env::var("DRONEPILOT_STEP_LOG_PATH").ok().map(PathBuf::from)
        } else {
            None
        };
        let append = env::var("DRONEPILOT_STEP_LOG_APPEND")
            .ok()
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self { mode, path, append }
    }

    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: StepLogMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }
}

/// JSONL sink. The file is opened lazily on the first record.
pub struct JsonlSink {
    mode: StepLogMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    pub fn from_env() -> Self {
        Self::from_config(StepLogConfig::from_env())
    }

    pub fn from_config(cfg: StepLogConfig) -> Self {
        Self {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == StepLogMode::Jsonl
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != StepLogMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let Some(path) = self.path.clone() else {
                // Misconfigured: jsonl without a path.
                eprintln!("WARN: DRONEPILOT_STEP_LOG_MODE=jsonl without DRONEPILOT_STEP_LOG_PATH; step log disabled");
                self.mode = StepLogMode::Off;
                return None;
            };

            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }
            match options.open(&path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(err) => {
                    eprintln!(
                        "WARN: could not open step log path={} err={err}; step log disabled",
                        path.display()
                    );
                    self.mode = StepLogMode::Off;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }
}

impl EventSink for JsonlSink {
    fn log_step(&mut self, record: &StepRecord) {
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        if writeln!(writer, "{line}").is_err() {
            self.mode = StepLogMode::Off;
            self.writer = None;
        }
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
