// src/rl/mod.rs
//
// Tabular Q-learning pilot.
//
// - action_encoding: the fixed 15-action space (speed x altitude delta)
// - state_key: telemetry -> discretised Q-table key
// - qtable: value store with zero default, TD updates, load/save boundary
// - policy: epsilon-greedy online learner implementing `Policy`

pub mod action_encoding;
pub mod policy;
pub mod qtable;
pub mod state_key;

pub use action_encoding::{decode_action, encode_action, NUM_ACTIONS};
pub use policy::{reward, QLearningPolicy, CRASH_REWARD};
pub use qtable::{ActionValues, LearningParams, QTable, QTABLE_VERSION};
pub use state_key::StateKey;
