// src/rl/action_encoding.rs
//
// Discrete action space for the Q-learning pilot.
//
// 5 speed levels (1..=5) x 3 altitude deltas (-1, 0, +1), always forward.
// Index order is speed-major:
//   0 = (1, -1), 1 = (1, 0), 2 = (1, +1), 3 = (2, -1), ... 14 = (5, +1)
// The index order is part of the persisted Q-table format.

use crate::types::{Command, Movement};

pub const SPEED_LEVELS: [u8; 5] = [1, 2, 3, 4, 5];
pub const ALTITUDE_DELTAS: [i8; 3] = [-1, 0, 1];
pub const NUM_ACTIONS: usize = SPEED_LEVELS.len() * ALTITUDE_DELTAS.len();

/// Command for an action index. Panics on an out-of-range index.
pub fn decode_action(index: usize) -> Command {
    assert!(index < NUM_ACTIONS, "action index {index} out of range");
    let speed = SPEED_LEVELS[index / ALTITUDE_DELTAS.len()];
    let altitude = ALTITUDE_DELTAS[index % ALTITUDE_DELTAS.len()];
    Command::new(speed, altitude, Movement::Forward)
}

/// Action index for a command, if it lies in the action space.
pub fn encode_action(cmd: &Command) -> Option<usize> {
    if cmd.movement != Movement::Forward {
        return None;
    }
    let s = SPEED_LEVELS.iter().position(|&s| s == cmd.speed)?;
    let a = ALTITUDE_DELTAS
        .iter()
        .position(|&a| a == cmd.altitude_delta)?;
    Some(s * ALTITUDE_DELTAS.len() + a)
}
