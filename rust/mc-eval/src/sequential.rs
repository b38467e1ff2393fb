//! One attempt at a time, batch-of-one predictions.

use std::time::{Duration, Instant};

use mc_core::SpinSystem;
use mc_infer::{ActionSelector, Device, InferError, ObservationBatch, ValueNetwork};
use mc_runtime::AttemptResult;
use rand::Rng;

use crate::GraphFailure;

/// A finished sequential attempt.
#[derive(Debug, Clone)]
pub struct SequentialAttempt {
    pub result: AttemptResult,
    pub init_vertices: Vec<i8>,
    /// Post-reset clone for the matched baseline.
    pub initial_state: SpinSystem,
    pub elapsed: Duration,
}

/// Clone the template, reset it from `rng`, and roll out until done.
pub fn run_attempt<N, R>(
    network: &N,
    selector: &ActionSelector,
    template: &SpinSystem,
    attempt: usize,
    device: Device,
    rng: &mut R,
) -> Result<SequentialAttempt, GraphFailure>
where
    N: ValueNetwork + ?Sized,
    R: Rng + ?Sized,
{
    let mut env = template.clone();
    let mut obs = env.reset(rng, None)?;
    let init_vertices = env.vertices();
    let initial_state = env.clone();

    let start = Instant::now();

    while !env.is_done() {
        let action = selector
            .predict(network, ObservationBatch::single(&obs), device)?
            .into_iter()
            .next()
            .ok_or_else(|| InferError::Shape("selector returned no action".to_string()))?;
        obs = env.step(action)?.observation;
    }

    Ok(SequentialAttempt {
        result: AttemptResult {
            attempt,
            best_cut: env.get_best_cut(),
            best_vertices: env.best_vertices(),
            steps: env.current_step(),
        },
        init_vertices,
        initial_state,
        elapsed: start.elapsed(),
    })
}
