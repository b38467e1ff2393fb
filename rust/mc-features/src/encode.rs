//! Observation encoding for schema v1.

use crate::schema::{
    CH_DISTANCE_FROM_BEST_SCORE, CH_DISTANCE_FROM_BEST_STATE, CH_EPISODE_TIME,
    CH_GREEDY_AVAILABLE, CH_IMMEDIATE_REWARD, CH_STATE, CH_TERMINATION_IMMINENCE,
    CH_TIME_SINCE_FLIP, F,
};

/// Improvements at or below this are not counted as greedy moves.
const GREEDY_EPS: f64 = 1e-9;

/// Minimal spin-system view needed for encoding.
///
/// Kept free of any environment type so the schema can be versioned on its own.
#[derive(Debug, Clone, Copy)]
pub struct SpinStateView<'a> {
    /// Signed spins (+1 / -1). +1 is the unflipped state.
    pub spins: &'a [i8],
    /// Signed spins of the best assignment seen so far.
    pub best_spins: &'a [i8],
    /// Cut change of flipping each vertex.
    pub immediate_rewards: &'a [f64],
    /// Step at which each vertex was last flipped (0 if never).
    pub last_flip_step: &'a [u32],
    pub current_step: u32,
    pub max_steps: u32,
    pub score: f64,
    pub best_score: f64,
    /// Encode channel 0 in {0,1} instead of {+1,-1}.
    pub binary_basis: bool,
}

/// One environment observation: row-major `(n_vertices, F)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    n_vertices: usize,
    data: Vec<f32>,
}

impl Observation {
    /// Wrap raw row-major data. Returns `None` if the length is not `n_vertices * F`.
    pub fn from_raw(n_vertices: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != n_vertices * F {
            return None;
        }
        Some(Self { n_vertices, data })
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn vertex(&self, v: usize) -> &[f32] {
        &self.data[v * F..(v + 1) * F]
    }

    pub fn feature(&self, v: usize, ch: usize) -> f32 {
        self.data[v * F + ch]
    }

    /// Channel 0 for every vertex.
    pub fn states(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.chunks_exact(F).map(|row| row[CH_STATE])
    }
}

fn encode_spin(s: i8, binary_basis: bool) -> f32 {
    if binary_basis {
        // +1 (unflipped) -> 0, -1 -> 1
        if s > 0 {
            0.0
        } else {
            1.0
        }
    } else {
        s as f32
    }
}

fn ratio(num: f64, den: f64) -> f32 {
    if den > 0.0 {
        (num / den) as f32
    } else {
        0.0
    }
}

/// Encode a spin-system view into an observation.
pub fn encode_observation(s: &SpinStateView<'_>) -> Observation {
    let n = s.spins.len();
    assert_eq!(s.best_spins.len(), n, "best_spins length mismatch");
    assert_eq!(s.immediate_rewards.len(), n, "immediate_rewards length mismatch");
    assert_eq!(s.last_flip_step.len(), n, "last_flip_step length mismatch");

    let n_f = n as f64;
    let max_steps = s.max_steps as f64;
    let step = s.current_step as f64;

    let greedy_available = s
        .immediate_rewards
        .iter()
        .filter(|&&r| r > GREEDY_EPS)
        .count();
    let hamming = s
        .spins
        .iter()
        .zip(s.best_spins)
        .filter(|(a, b)| a != b)
        .count();

    let episode_time = ratio(step, max_steps);
    let imminence = ratio(max_steps - step, max_steps);
    let greedy = ratio(greedy_available as f64, n_f);
    let dist_score = ratio(s.best_score - s.score, n_f);
    let dist_state = ratio(hamming as f64, n_f);

    let mut data = vec![0.0f32; n * F];
    for (v, row) in data.chunks_exact_mut(F).enumerate() {
        row[CH_STATE] = encode_spin(s.spins[v], s.binary_basis);
        row[CH_IMMEDIATE_REWARD] = ratio(s.immediate_rewards[v], n_f);
        let since = s.current_step.saturating_sub(s.last_flip_step[v]) as f64;
        row[CH_TIME_SINCE_FLIP] = ratio(since, max_steps);
        row[CH_EPISODE_TIME] = episode_time;
        row[CH_TERMINATION_IMMINENCE] = imminence;
        row[CH_GREEDY_AVAILABLE] = greedy;
        row[CH_DISTANCE_FROM_BEST_SCORE] = dist_score;
        row[CH_DISTANCE_FROM_BEST_STATE] = dist_state;
    }

    Observation { n_vertices: n, data }
}
