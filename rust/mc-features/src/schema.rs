//! Observation schema v1.
//!
//! Every vertex carries `F` feature channels. Channels 0..=2 are per-vertex, channels
//! 3..=7 are graph-global values broadcast to every vertex so that a per-vertex scorer
//! can see them.
//!
//! ### Layout (v1)
//! - **state**: vertex state in the configured basis (0/1 or +1/-1)
//! - **immediate_reward**: cut change from flipping this vertex, divided by n
//! - **time_since_flip**: steps since this vertex was last flipped, divided by max_steps
//! - **episode_time**: current step / max_steps
//! - **termination_imminence**: (max_steps - current step) / max_steps
//! - **greedy_available**: number of strictly improving flips, divided by n
//! - **distance_from_best_score**: (best score - score) / n
//! - **distance_from_best_state**: Hamming distance to the best assignment, divided by n
//!
//! Total: F = 8.

/// Increment this whenever the channel layout changes.
pub const FEATURE_SCHEMA_ID: u32 = 1;

/// Number of channels per vertex.
pub const F: usize = 8;

pub const CH_STATE: usize = 0;
pub const CH_IMMEDIATE_REWARD: usize = 1;
pub const CH_TIME_SINCE_FLIP: usize = 2;
pub const CH_EPISODE_TIME: usize = 3;
pub const CH_TERMINATION_IMMINENCE: usize = 4;
pub const CH_GREEDY_AVAILABLE: usize = 5;
pub const CH_DISTANCE_FROM_BEST_SCORE: usize = 6;
pub const CH_DISTANCE_FROM_BEST_STATE: usize = 7;

/// Human-readable channel names, indexed by channel.
pub const CHANNEL_NAMES: [&str; F] = [
    "state",
    "immediate_reward",
    "time_since_flip",
    "episode_time",
    "termination_imminence",
    "greedy_available",
    "distance_from_best_score",
    "distance_from_best_state",
];
