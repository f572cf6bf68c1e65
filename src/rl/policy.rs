// src/rl/policy.rs
//
// Online tabular Q-learning pilot.
//
// Each decoded report:
//   1. discretise into s'
//   2. pick a' epsilon-greedily from Q[s']
//   3. update the previous pair (s, a) with the reported reward and max Q[s']
//   4. remember (s', a') and send a'
// A crash report applies the terminal update (-100, no bootstrap) to the
// last pair. The table is saved when the session finishes.

use std::path::PathBuf;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::action_encoding::{decode_action, NUM_ACTIONS};
use super::qtable::{LearningParams, QTable};
use super::state_key::StateKey;
use crate::config::RlConfig;
use crate::policy::{Observation, Policy};
use crate::types::{Command, Metrics};

pub const CRASH_REWARD: f64 = -100.0;

/// Reward for one received frame. Non-terminal frames use the reported
/// cumulative distance as-is.
pub fn reward(metrics: &Metrics, crashed: bool) -> f64 {
    if crashed {
        CRASH_REWARD
    } else {
        metrics.total_distance
    }
}

pub struct QLearningPolicy {
    table: QTable,
    params: LearningParams,
    epsilon: f64,
    rng: ChaCha8Rng,
    /// Where `finish` persists the table; `None` keeps it in memory only.
    path: Option<PathBuf>,
    last: Option<(StateKey, usize)>,
    commands_sent: u64,
}

impl QLearningPolicy {
    pub fn new(table: QTable, params: LearningParams, epsilon: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            table,
            params,
            epsilon,
            rng,
            path: None,
            last: None,
            commands_sent: 0,
        }
    }

    /// Build from config, loading the table from `cfg.qtable_path`.
    pub fn from_config(cfg: &RlConfig) -> Self {
        let table = QTable::load_or_empty(&cfg.qtable_path);
        let params = LearningParams {
            alpha: cfg.alpha,
            gamma: cfg.gamma,
        };
        Self::new(table, params, cfg.epsilon, cfg.seed).with_path(cfg.qtable_path.clone())
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    fn choose_action(&mut self, state: &StateKey) -> usize {
        if self.rng.gen::<f64>() < self.epsilon {
            self.rng.gen_range(0..NUM_ACTIONS)
        } else {
            self.table.best_action(state)
        }
    }
}

impl Policy for QLearningPolicy {
    fn name(&self) -> &str {
        "rl"
    }

    fn decide(&mut self, obs: &Observation<'_>) -> Command {
        let state = StateKey::from_telemetry(obs.telemetry);
        let action = self.choose_action(&state);

        if let Some((prev_state, prev_action)) = self.last.take() {
            let r = reward(obs.metrics, false);
            self.table
                .update_transition(&prev_state, prev_action, r, &state, self.params);
        }

        self.last = Some((state, action));
        self.commands_sent += 1;
        decode_action(action)
    }

    fn on_crash(&mut self, metrics: &Metrics) {
        let r = reward(metrics, true);
        if let Some((state, action)) = self.last.take() {
            self.table.update_terminal(&state, action, r, self.params);
        }
        eprintln!("[CRASHED] Reward: {r}");
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.last = None;
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        self.table.save(path)?;
        eprintln!(
            "INFO: saved Q-table path={} states={}",
            path.display(),
            self.table.len()
        );
        Ok(())
    }

    fn local_iterations(&self) -> u64 {
        self.commands_sent
    }
}
