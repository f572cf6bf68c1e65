// src/rl/qtable.rs
//
// Tabular action-value store.
//
// One fixed-size row of NUM_ACTIONS values per discretised state. Unseen
// states read as all zeros; rows are only materialised on update. The table
// is loaded once at session start and saved once at session end.
//
// On-disk format (JSON):
//   {"version":1,"entries":[{"state":{...},"values":[f64 x 15]}, ...]}
// Entries are written sorted by state so the file is stable across runs.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::action_encoding::NUM_ACTIONS;
use super::state_key::StateKey;

pub const QTABLE_VERSION: u32 = 1;

pub type ActionValues = [f64; NUM_ACTIONS];

/// Learning-rate / discount pair for the TD update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningParams {
    pub alpha: f64,
    pub gamma: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QTableEntry {
    state: StateKey,
    values: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QTableFile {
    version: u32,
    entries: Vec<QTableEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QTable {
    rows: HashMap<StateKey, ActionValues>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Action values for `state`, zeros if unseen.
    pub fn values(&self, state: &StateKey) -> ActionValues {
        self.rows
            .get(state)
            .copied()
            .unwrap_or([0.0; NUM_ACTIONS])
    }

    pub fn value(&self, state: &StateKey, action: usize) -> f64 {
        self.values(state)[action]
    }

    /// Greedy action; ties go to the lowest index.
    pub fn best_action(&self, state: &StateKey) -> usize {
        let values = self.values(state);
        let mut best = 0;
        for (i, v) in values.iter().enumerate().skip(1) {
            if *v > values[best] {
                best = i;
            }
        }
        best
    }

    pub fn max_value(&self, state: &StateKey) -> f64 {
        self.values(state)[self.best_action(state)]
    }

    /// `Q[s,a] += alpha * (r + gamma * max(Q[s']) - Q[s,a])`
    pub fn update_transition(
        &mut self,
        state: &StateKey,
        action: usize,
        reward: f64,
        next: &StateKey,
        params: LearningParams,
    ) {
        let best_next = self.max_value(next);
        let row = self.row_mut(state);
        row[action] += params.alpha * (reward + params.gamma * best_next - row[action]);
    }

    /// Terminal step: `Q[s,a] += alpha * (r - Q[s,a])`, no bootstrap.
    pub fn update_terminal(
        &mut self,
        state: &StateKey,
        action: usize,
        reward: f64,
        params: LearningParams,
    ) {
        let row = self.row_mut(state);
        row[action] += params.alpha * (reward - row[action]);
    }

    fn row_mut(&mut self, state: &StateKey) -> &mut ActionValues {
        self.rows
            .entry(state.clone())
            .or_insert([0.0; NUM_ACTIONS])
    }

    /// Load a table, falling back to an empty one when the file is missing
    /// or unreadable. Never fails.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(table)) => {
                eprintln!(
                    "INFO: loaded Q-table path={} states={}",
                    path.display(),
                    table.len()
                );
                table
            }
            Ok(None) => {
                eprintln!("INFO: no Q-table at {}; cold start", path.display());
                Self::new()
            }
            Err(err) => {
                eprintln!(
                    "WARN: ignoring unreadable Q-table path={} err={err}; cold start",
                    path.display()
                );
                Self::new()
            }
        }
    }

    /// Strict load: `Ok(None)` if the file does not exist.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let file: QTableFile = serde_json::from_str(&content)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if file.version != QTABLE_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported Q-table version {}", file.version),
            ));
        }
        let mut rows = HashMap::with_capacity(file.entries.len());
        for entry in file.entries {
            let values: ActionValues = entry.values.as_slice().try_into().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "expected {} action values, found {}",
                        NUM_ACTIONS,
                        entry.values.len()
                    ),
                )
            })?;
            rows.insert(entry.state, values);
        }
        Ok(Some(Self { rows }))
    }

    /// Write the table atomically (temp file in the same directory, then
    /// rename over the target). Last writer wins.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("create Q-table dir {}", parent.display()))?;

        let mut entries: Vec<QTableEntry> = self
            .rows
            .iter()
            .map(|(state, values)| QTableEntry {
                state: state.clone(),
                values: values.to_vec(),
            })
            .collect();
        entries.sort_by(|a, b| a.state.cmp(&b.state));
        let file = QTableFile {
            version: QTABLE_VERSION,
            entries,
        };
        let content = serde_json::to_string(&file)?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("qtable.json");
        let tmp_path = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));
        fs::write(&tmp_path, content)
            .with_context(|| format!("write Q-table {}", tmp_path.display()))?;
        // `fs::rename` replaces an existing file on every supported platform;
        // on failure the previous table stays in place.
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err).with_context(|| format!("replace Q-table {}", path.display()));
        }
        Ok(())
    }
}
