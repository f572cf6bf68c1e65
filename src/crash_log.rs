// src/crash_log.rs
//
// Crash log: per-run iterations, crash reasons and distances across N
// sequential sessions, plus arithmetic means.
//
// A reason is the last locally detected crash description of the run as
// plain text ("Ground collision"), without the "[CRASH]" log tag, or
// "Unknown" when no predicate fired.
//
// File shape:
//   {"iterations":[..],"reasons":[..],"distances":[..],"outcomes":[..],
//    "mean_iterations":f,"mean_distance":f}

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::session::SessionReport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashLogSummary {
    pub iterations: Vec<u64>,
    pub reasons: Vec<String>,
    pub distances: Vec<f64>,
    #[serde(default)]
    pub outcomes: Vec<String>,
    pub mean_iterations: f64,
    pub mean_distance: f64,
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

impl CrashLogSummary {
    /// Aggregate reports in run order. No reports gives zero means.
    pub fn from_reports(reports: &[SessionReport]) -> Self {
        let iterations: Vec<u64> = reports.iter().map(|r| r.local_iterations).collect();
        let distances: Vec<f64> = reports.iter().map(|r| r.final_distance).collect();
        Self {
            mean_iterations: mean(iterations.iter().map(|&n| n as f64)),
            mean_distance: mean(distances.iter().copied()),
            iterations,
            distances,
            reasons: reports.iter().map(|r| r.crash_reason.clone()).collect(),
            outcomes: reports.iter().map(|r| r.outcome.as_str().to_string()).collect(),
        }
    }

    pub fn runs(&self) -> usize {
        self.iterations.len()
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create crash log dir {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("write crash log {}", path.display()))?;
        Ok(())
    }

    /// Closing lines printed after a multi-run.
    pub fn render_averages(&self) -> String {
        format!(
            "Average Iterations: {:.2}\nAverage Distance: {:.2} meters",
            self.mean_iterations, self.mean_distance
        )
    }
}
