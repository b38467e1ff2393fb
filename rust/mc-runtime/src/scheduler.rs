use std::time::{Duration, Instant};

use mc_core::{EnvError, SpinSystem};
use mc_features::Observation;
use mc_infer::{ActionSelector, Device, InferError, ObservationBatch, ValueNetwork};
use rand::Rng;
use thiserror::Error;

use crate::history::{BatchHistory, HistoryRecorder, StepRecord};
use crate::slot::SlotArena;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("reset failed: {0}")]
    Reset(#[source] EnvError),
    #[error("attempt {attempt}: {source}")]
    Env {
        attempt: usize,
        #[source]
        source: EnvError,
    },
    #[error("inference failed: {0}")]
    Infer(#[from] InferError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Lockstep rounds.
    pub rounds: u64,
    pub env_steps: u64,
    pub forward_passes: u64,
    /// Attempts run to termination.
    pub completed: u64,
}

impl SchedulerStats {
    pub fn merge(&mut self, other: &SchedulerStats) {
        self.rounds += other.rounds;
        self.env_steps += other.env_steps;
        self.forward_passes += other.forward_passes;
        self.completed += other.completed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutConfig {
    /// `None` runs every attempt in one batch.
    pub max_batch_size: Option<usize>,
    pub record_history: bool,
    pub device: Device,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_batch_size: None,
            record_history: false,
            device: Device::Cpu,
        }
    }
}

/// Final state of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    /// Index of the attempt within the graph.
    pub attempt: usize,
    pub best_cut: f64,
    /// Best assignment, basis-encoded.
    pub best_vertices: Vec<i8>,
    pub steps: u32,
}

/// Everything one sub-batch produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_index: usize,
    /// One per slot, in slot order.
    pub attempts: Vec<AttemptResult>,
    /// Post-reset clones, one per slot.
    pub initial_states: Vec<SpinSystem>,
    /// Post-reset assignments, basis-encoded.
    pub init_vertices: Vec<Vec<i8>>,
    pub history: Option<BatchHistory>,
    /// Lockstep rollout time, excluding slot setup.
    pub elapsed: Duration,
    pub stats: SchedulerStats,
}

impl BatchOutcome {
    pub fn size(&self) -> usize {
        self.attempts.len()
    }
}

/// Sub-batch sizes covering `n_attempts`.
pub fn plan_batches(n_attempts: usize, max_batch_size: Option<usize>) -> Vec<usize> {
    let cap = match max_batch_size {
        Some(m) if m > 0 => m,
        _ => n_attempts.max(1),
    };
    let mut out = Vec::new();
    let mut remaining = n_attempts;
    while remaining > 0 {
        let size = remaining.min(cap);
        out.push(size);
        remaining -= size;
    }
    out
}

struct Slot {
    env: SpinSystem,
    obs: Observation,
}

/// Runs many attempts on one graph in lockstep, one forward pass per round.
pub struct BatchedRolloutScheduler<'n, N: ValueNetwork + ?Sized> {
    network: &'n N,
    selector: ActionSelector,
    config: RolloutConfig,
    stats: SchedulerStats,
}

impl<'n, N: ValueNetwork + ?Sized> BatchedRolloutScheduler<'n, N> {
    pub fn new(
        network: &'n N,
        selector: ActionSelector,
        config: RolloutConfig,
    ) -> Result<Self, RolloutError> {
        if config.max_batch_size == Some(0) {
            return Err(RolloutError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            network,
            selector,
            config,
            stats: SchedulerStats::default(),
        })
    }

    /// Totals over every batch run so far.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    pub fn plan(&self, n_attempts: usize) -> Vec<usize> {
        plan_batches(n_attempts, self.config.max_batch_size)
    }

    /// Run all attempts for one graph, sub-batch after sub-batch.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        template: &SpinSystem,
        n_attempts: usize,
        rng: &mut R,
    ) -> Result<Vec<BatchOutcome>, RolloutError> {
        let mut out = Vec::new();
        let mut first = 0usize;
        for (batch_index, size) in self.plan(n_attempts).into_iter().enumerate() {
            out.push(self.run_batch(template, batch_index, first, size, rng)?);
            first += size;
        }
        Ok(out)
    }

    /// Run one sub-batch of `size` attempts numbered from `first_attempt`.
    pub fn run_batch<R: Rng + ?Sized>(
        &mut self,
        template: &SpinSystem,
        batch_index: usize,
        first_attempt: usize,
        size: usize,
        rng: &mut R,
    ) -> Result<BatchOutcome, RolloutError> {
        let mut slots = Vec::with_capacity(size);
        for _ in 0..size {
            let mut env = template.clone();
            let obs = env.reset(rng, None).map_err(RolloutError::Reset)?;
            slots.push(Slot { env, obs });
        }
        self.run_slots(batch_index, first_attempt, slots)
    }

    /// Run one sub-batch with each slot starting from the given basis-encoded assignment.
    pub fn run_batch_from(
        &mut self,
        template: &SpinSystem,
        batch_index: usize,
        first_attempt: usize,
        initial: &[Vec<i8>],
    ) -> Result<BatchOutcome, RolloutError> {
        let mut slots = Vec::with_capacity(initial.len());
        for vertices in initial {
            let mut env = template.clone();
            let obs = env.reset_to(vertices).map_err(RolloutError::Reset)?;
            slots.push(Slot { env, obs });
        }
        self.run_slots(batch_index, first_attempt, slots)
    }

    fn run_slots(
        &mut self,
        batch_index: usize,
        first_attempt: usize,
        slots: Vec<Slot>,
    ) -> Result<BatchOutcome, RolloutError> {
        let size = slots.len();
        let mut stats = SchedulerStats::default();
        let init_vertices: Vec<Vec<i8>> = slots.iter().map(|s| s.env.vertices()).collect();
        let initial_states: Vec<SpinSystem> = slots.iter().map(|s| s.env.clone()).collect();

        let mut recorder = self
            .config
            .record_history
            .then(|| HistoryRecorder::new(slots.iter().map(|s| s.env.calculate_score()).collect()));
        let mut results: Vec<Option<AttemptResult>> = vec![None; size];
        let mut arena = SlotArena::new(slots);

        for idx in 0..size {
            if arena.get(idx).is_some_and(|s| s.env.is_done()) {
                if let Some(s) = arena.free(idx) {
                    results[idx] = Some(finish(first_attempt + idx, &s.env));
                    stats.completed += 1;
                }
            }
        }

        let start = Instant::now();
        while arena.active() > 0 {
            let active = arena.active_indices();
            let batch = ObservationBatch::from_observations(
                arena.iter_active().map(|(_, s)| &s.obs),
            )?;
            let actions = self
                .selector
                .predict(self.network, batch, self.config.device)?;
            stats.rounds += 1;
            stats.forward_passes += 1;

            let mut round = recorder.as_ref().map(|_| vec![None; size]);
            for (&idx, &action) in active.iter().zip(&actions) {
                let Some(slot) = arena.get_mut(idx) else {
                    continue;
                };
                let outcome = slot.env.step(action).map_err(|source| RolloutError::Env {
                    attempt: first_attempt + idx,
                    source,
                })?;
                stats.env_steps += 1;
                if let Some(r) = round.as_mut() {
                    r[idx] = Some(StepRecord {
                        action,
                        score: outcome.score,
                        reward: outcome.reward,
                    });
                }
                if outcome.done {
                    if let Some(s) = arena.free(idx) {
                        results[idx] = Some(finish(first_attempt + idx, &s.env));
                        stats.completed += 1;
                    }
                } else {
                    slot.obs = outcome.observation;
                }
            }
            if let (Some(rec), Some(r)) = (recorder.as_mut(), round) {
                rec.record_round(r);
            }
        }

        self.stats.merge(&stats);
        Ok(BatchOutcome {
            batch_index,
            attempts: results.into_iter().flatten().collect(),
            initial_states,
            init_vertices,
            history: recorder.map(HistoryRecorder::finish),
            elapsed: start.elapsed(),
            stats,
        })
    }
}

fn finish(attempt: usize, env: &SpinSystem) -> AttemptResult {
    AttemptResult {
        attempt,
        best_cut: env.get_best_cut(),
        best_vertices: env.best_vertices(),
        steps: env.current_step(),
    }
}
