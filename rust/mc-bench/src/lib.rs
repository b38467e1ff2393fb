//! mc-bench: deterministic fixtures shared by the criterion benches.

use std::error::Error;

use mc_core::{make, AdjacencyMatrix, EnvOptions, SingleGraphGenerator, SpinSystem, SystemKind};
use mc_infer::{ObservationBatch, QValues};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

pub type FixtureResult<T> = Result<T, Box<dyn Error>>;

/// Erdős–Rényi graph with unit weights.
pub fn er_graph(n: usize, p: f64, seed: u64) -> AdjacencyMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut m = AdjacencyMatrix::zeros(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if rng.gen_bool(p) {
                m.set_symmetric(i, j, 1.0);
            }
        }
    }
    m
}

/// Environment template with a budget of `step_factor * n` steps.
pub fn template(n: usize, step_factor: f64, options: EnvOptions) -> FixtureResult<SpinSystem> {
    let budget = (n as f64 * step_factor).floor() as u32;
    let generator = SingleGraphGenerator::new(er_graph(n, 0.15, n as u64));
    Ok(make(SystemKind::VertexSystem, &generator, budget, options)?)
}

/// `batch` freshly reset observations of `env` plus random q-values for them.
pub fn batch_with_q(
    env: &SpinSystem,
    batch: usize,
    seed: u64,
) -> FixtureResult<(ObservationBatch, QValues)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut observations = Vec::with_capacity(batch);
    for _ in 0..batch {
        let mut e = env.clone();
        observations.push(e.reset(&mut rng, None)?);
    }
    let obs = ObservationBatch::from_observations(&observations)?;
    let n = env.n_vertices();
    let q: Vec<f32> = (0..batch * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let q = QValues::new(batch, n, q, obs.device())?;
    Ok((obs, q))
}
