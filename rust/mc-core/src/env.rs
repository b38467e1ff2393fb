//! Vertex-flipping spin system for max-cut.
//!
//! This module is the single place that mutates spin state. The scheduler, the greedy
//! policy and the evaluators all go through `SpinSystem`.

use std::str::FromStr;
use std::sync::Arc;

use mc_features::{encode_observation, Observation, SpinStateView};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::basis::VertexBasis;
use crate::graph::AdjacencyMatrix;

/// Kinds of decision process the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    VertexSystem,
}

impl FromStr for SystemKind {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VertexSystem" | "vertex_system" => Ok(SystemKind::VertexSystem),
            other => Err(EnvError::UnknownSystem(other.to_string())),
        }
    }
}

/// Reward returned by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSignal {
    /// Raw cut change of the flip.
    Dense,
    /// Improvement over the best cut seen so far in the episode, else 0.
    #[default]
    Blr,
}

/// Environment options shared by every graph in a run.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct EnvOptions {
    /// Whether a vertex may be flipped back after being flipped.
    #[serde(default = "default_true")]
    pub reversible_vertices: bool,
    #[serde(default)]
    pub vertex_basis: VertexBasis,
    #[serde(default)]
    pub reward_signal: RewardSignal,
    /// Divide rewards by the vertex count.
    #[serde(default = "default_true")]
    pub norm_rewards: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            reversible_vertices: true,
            vertex_basis: VertexBasis::default(),
            reward_signal: RewardSignal::default(),
            norm_rewards: true,
        }
    }
}

/// Always yields the same graph.
#[derive(Debug, Clone)]
pub struct SingleGraphGenerator {
    matrix: Arc<AdjacencyMatrix>,
}

impl SingleGraphGenerator {
    pub fn new(matrix: AdjacencyMatrix) -> Self {
        Self {
            matrix: Arc::new(matrix),
        }
    }

    pub fn from_arc(matrix: Arc<AdjacencyMatrix>) -> Self {
        Self { matrix }
    }

    pub fn get(&self) -> Arc<AdjacencyMatrix> {
        Arc::clone(&self.matrix)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    #[error("unknown system kind: {0}")]
    UnknownSystem(String),
    #[error("graph has no vertices")]
    EmptyGraph,
    #[error("adjacency matrix is not symmetric")]
    Asymmetric,
    #[error("action {action} out of range for {n} vertices")]
    ActionOutOfRange { action: usize, n: usize },
    #[error("episode already finished")]
    Finished,
    #[error("vertex {0} was already flipped in an irreversible episode")]
    AlreadyFlipped(usize),
    #[error("initial assignment has {got} entries, expected {expected}")]
    BadAssignmentLen { got: usize, expected: usize },
    #[error("value {value} at vertex {vertex} is not valid in the {basis:?} basis")]
    BadAssignmentValue {
        vertex: usize,
        value: i8,
        basis: VertexBasis,
    },
}

/// Result of one `step`.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    /// Cut value after the step.
    pub score: f64,
}

/// Build an environment template for one graph.
pub fn make(
    kind: SystemKind,
    generator: &SingleGraphGenerator,
    max_steps: u32,
    options: EnvOptions,
) -> Result<SpinSystem, EnvError> {
    match kind {
        SystemKind::VertexSystem => SpinSystem::new(generator.get(), max_steps, options),
    }
}

/// One max-cut decision process.
///
/// Cloning is the only way to obtain an independent instance; clones share the
/// immutable adjacency matrix and nothing else.
#[derive(Debug, Clone)]
pub struct SpinSystem {
    matrix: Arc<AdjacencyMatrix>,
    options: EnvOptions,
    max_steps: u32,

    spins: Vec<i8>,
    /// `fields[i] = sum_j w_ij s_j`
    fields: Vec<f64>,
    last_flip_step: Vec<u32>,
    current_step: u32,
    score: f64,

    best_score: f64,
    best_spins: Vec<i8>,
    done: bool,
}

impl SpinSystem {
    fn new(
        matrix: Arc<AdjacencyMatrix>,
        max_steps: u32,
        options: EnvOptions,
    ) -> Result<Self, EnvError> {
        let n = matrix.n();
        if n == 0 {
            return Err(EnvError::EmptyGraph);
        }
        if !matrix.is_symmetric() {
            return Err(EnvError::Asymmetric);
        }
        let mut env = Self {
            matrix,
            options,
            max_steps,
            spins: vec![1; n],
            fields: vec![0.0; n],
            last_flip_step: vec![0; n],
            current_step: 0,
            score: 0.0,
            best_score: 0.0,
            best_spins: vec![1; n],
            done: false,
        };
        env.load_spins(vec![1; n]);
        Ok(env)
    }

    /// Start a new episode.
    ///
    /// With `vertices` (basis-encoded) the episode starts from that assignment. Otherwise
    /// irreversible episodes start fully unflipped and reversible ones start from a uniform
    /// random assignment drawn from `rng`.
    pub fn reset<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        vertices: Option<&[i8]>,
    ) -> Result<Observation, EnvError> {
        let n = self.n_vertices();
        let spins = match vertices {
            Some(v) => return self.reset_to(v),
            None if !self.options.reversible_vertices => vec![1; n],
            None => (0..n)
                .map(|_| if rng.gen::<bool>() { 1 } else { -1 })
                .collect(),
        };
        self.load_spins(spins);
        Ok(self.observation())
    }

    /// Start a new episode from a basis-encoded assignment.
    pub fn reset_to(&mut self, vertices: &[i8]) -> Result<Observation, EnvError> {
        let spins = self.decode_assignment(vertices)?;
        self.load_spins(spins);
        Ok(self.observation())
    }

    /// Flip `action` and advance one step.
    pub fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        if self.done {
            return Err(EnvError::Finished);
        }
        let n = self.n_vertices();
        if action >= n {
            return Err(EnvError::ActionOutOfRange { action, n });
        }
        if !self.options.reversible_vertices && self.spins[action] != 1 {
            return Err(EnvError::AlreadyFlipped(action));
        }

        let prev_best = self.best_score;
        let delta = self.flip(action);
        self.current_step += 1;
        self.last_flip_step[action] = self.current_step;

        let mut reward = match self.options.reward_signal {
            RewardSignal::Dense => delta,
            RewardSignal::Blr => (self.best_score - prev_best).max(0.0),
        };
        if self.options.norm_rewards {
            reward /= n as f64;
        }

        self.done = self.reached_end();
        Ok(StepOutcome {
            observation: self.observation(),
            reward,
            done: self.done,
            score: self.score,
        })
    }

    /// Flip a vertex without consuming step budget. Best-cut tracking still applies.
    pub(crate) fn flip_unbudgeted(&mut self, v: usize) -> f64 {
        self.flip(v)
    }

    /// Cut change of flipping `v`. Self-loops never cross the cut.
    fn gain(&self, v: usize) -> f64 {
        self.spins[v] as f64 * self.fields[v] - self.matrix.get(v, v)
    }

    fn flip(&mut self, v: usize) -> f64 {
        let s = self.spins[v] as f64;
        let delta = self.gain(v);
        // s_v goes from s to -s.
        let change = -2.0 * s;
        for (h, &w) in self.fields.iter_mut().zip(self.matrix.row(v)) {
            *h += w * change;
        }
        self.spins[v] = -self.spins[v];
        self.score += delta;
        if self.score > self.best_score {
            self.best_score = self.score;
            self.best_spins.copy_from_slice(&self.spins);
        }
        delta
    }

    fn load_spins(&mut self, spins: Vec<i8>) {
        let n = self.n_vertices();
        debug_assert_eq!(spins.len(), n);
        for i in 0..n {
            self.fields[i] = self
                .matrix
                .row(i)
                .iter()
                .zip(&spins)
                .map(|(&w, &s)| w * s as f64)
                .sum();
        }
        self.score = self.matrix.cut_value(&spins);
        self.best_score = self.score;
        self.best_spins.copy_from_slice(&spins);
        self.spins = spins;
        self.last_flip_step.iter_mut().for_each(|x| *x = 0);
        self.current_step = 0;
        self.done = self.reached_end();
    }

    fn decode_assignment(&self, vertices: &[i8]) -> Result<Vec<i8>, EnvError> {
        let n = self.n_vertices();
        if vertices.len() != n {
            return Err(EnvError::BadAssignmentLen {
                got: vertices.len(),
                expected: n,
            });
        }
        let basis = self.options.vertex_basis;
        vertices
            .iter()
            .enumerate()
            .map(|(vertex, &value)| {
                basis.decode(value).ok_or(EnvError::BadAssignmentValue {
                    vertex,
                    value,
                    basis,
                })
            })
            .collect()
    }

    fn reached_end(&self) -> bool {
        if self.current_step >= self.max_steps {
            return true;
        }
        !self.options.reversible_vertices && self.spins.iter().all(|&s| s != 1)
    }

    /// Current observation.
    pub fn observation(&self) -> Observation {
        let rewards = self.immediate_rewards();
        encode_observation(&SpinStateView {
            spins: &self.spins,
            best_spins: &self.best_spins,
            immediate_rewards: &rewards,
            last_flip_step: &self.last_flip_step,
            current_step: self.current_step,
            max_steps: self.max_steps,
            score: self.score,
            best_score: self.best_score,
            binary_basis: self.options.vertex_basis.is_binary(),
        })
    }

    /// Cut change of flipping each vertex from the current state.
    pub fn immediate_rewards(&self) -> Vec<f64> {
        (0..self.n_vertices()).map(|v| self.gain(v)).collect()
    }

    /// Whether `v` may be flipped under the reversibility rule (ignores the step budget).
    pub fn is_flippable(&self, v: usize) -> bool {
        self.options.reversible_vertices || self.spins[v] == 1
    }

    /// Current cut value.
    pub fn calculate_score(&self) -> f64 {
        self.score
    }

    pub fn get_best_cut(&self) -> f64 {
        self.best_score
    }

    /// Best assignment so far, in basis encoding.
    pub fn best_vertices(&self) -> Vec<i8> {
        let basis = self.options.vertex_basis;
        self.best_spins.iter().map(|&s| basis.encode(s)).collect()
    }

    /// Current assignment, in basis encoding.
    pub fn vertices(&self) -> Vec<i8> {
        let basis = self.options.vertex_basis;
        self.spins.iter().map(|&s| basis.encode(s)).collect()
    }

    pub fn spins(&self) -> &[i8] {
        &self.spins
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn n_vertices(&self) -> usize {
        self.matrix.n()
    }

    pub fn options(&self) -> &EnvOptions {
        &self.options
    }

    pub fn matrix(&self) -> &AdjacencyMatrix {
        &self.matrix
    }
}
