//! mc-eval: Network-vs-greedy evaluation over a graph corpus.

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod aggregate;
pub mod baseline;
pub mod sequential;

pub use aggregate::{GraphAccumulator, GraphResultRow, HistoryRow, RawResultRow, ResultTables};
pub use baseline::{GreedyBaselineRunner, GreedyOutcome};

use mc_core::config::EvalConfig;
use mc_core::{make, AdjacencyMatrix, EnvError, EnvOptions, SingleGraphGenerator, SystemKind};
use mc_infer::{ActionSelector, Device, InferError, ValueNetwork};
use mc_runtime::{BatchOutcome, BatchedRolloutScheduler, RolloutConfig, RolloutError};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphFailure {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Rollout(#[from] RolloutError),
    #[error(transparent)]
    Infer(#[from] InferError),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unsupported option combination: {0}")]
    Unsupported(&'static str),
    #[error("invalid eval config: {0}")]
    InvalidConfig(String),
    #[error("graph {index}: {source}")]
    Graph {
        index: usize,
        #[source]
        source: GraphFailure,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOptions {
    pub n_attempts: usize,
    /// Step budget per attempt is `floor(n_vertices * step_factor)`.
    pub step_factor: f64,
    pub batched: bool,
    pub max_batch_size: Option<usize>,
    pub return_raw: bool,
    pub return_history: bool,
    pub seed: u64,
    pub device: Device,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self::from_config(&EvalConfig::default(), Device::Cpu)
    }
}

impl EvalOptions {
    pub fn from_config(cfg: &EvalConfig, device: Device) -> Self {
        Self {
            n_attempts: cfg.n_attempts as usize,
            step_factor: cfg.step_factor,
            batched: cfg.batched,
            max_batch_size: cfg.max_batch_size.map(|m| m as usize),
            return_raw: cfg.return_raw,
            return_history: cfg.return_history,
            seed: cfg.seed,
            device,
        }
    }
}

/// Timing and work counters for one finished sub-batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub batch_index: usize,
    pub size: usize,
    pub rounds: u64,
    pub env_steps: u64,
    pub seconds: f64,
}

impl From<&BatchOutcome> for BatchSummary {
    fn from(b: &BatchOutcome) -> Self {
        Self {
            batch_index: b.batch_index,
            size: b.size(),
            rounds: b.stats.rounds,
            env_steps: b.stats.env_steps,
            seconds: b.elapsed.as_secs_f64(),
        }
    }
}

pub trait EvalProgress {
    fn on_graph_started(&mut self, _index: usize, _n_vertices: usize, _n_attempts: usize) {}
    fn on_batch_finished(&mut self, _graph: usize, _batch: &BatchSummary) {}
    fn on_graph_finished(&mut self, _row: &GraphResultRow) {}
    fn on_warning(&mut self, _msg: &str) {}
}

/// Silent.
impl EvalProgress for () {}

/// Prints one line per graph to stdout; warnings go to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutProgress;

impl EvalProgress for StdoutProgress {
    fn on_graph_finished(&mut self, row: &GraphResultRow) {
        println!("{}", summary_line(row));
    }

    fn on_warning(&mut self, msg: &str) {
        eprintln!("warning: {msg}");
    }
}

fn fmt_opt(v: Option<f64>, digits: usize) -> String {
    match v {
        Some(x) => format!("{x:.digits$}"),
        None => "-".to_string(),
    }
}

/// Human summary of one graph.
pub fn summary_line(row: &GraphResultRow) -> String {
    format!(
        "graph {}: n={} attempts={} best={} mean={} greedy_fixed={:.3} greedy_random={} time={}s",
        row.graph,
        row.n_vertices,
        row.n_attempts,
        fmt_opt(row.cut, 3),
        fmt_opt(row.mean_cut, 3),
        row.greedy_fixed_cut,
        fmt_opt(row.greedy_random_cut, 3),
        fmt_opt(row.time, 4),
    )
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// RNG used for every reset on graph `index`.
pub fn graph_rng(seed: u64, index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(splitmix64(seed ^ index as u64))
}

/// Attempts actually run per graph.
pub fn effective_attempts(env: &EnvOptions, requested: usize) -> usize {
    if env.reversible_vertices {
        requested
    } else {
        1
    }
}

pub fn step_budget(n_vertices: usize, step_factor: f64) -> u32 {
    (n_vertices as f64 * step_factor).floor() as u32
}

fn validate(opts: &EvalOptions, progress: &mut dyn EvalProgress) -> Result<(), EvalError> {
    if !opts.batched && opts.return_raw {
        return Err(EvalError::Unsupported(
            "raw results are only available in batched mode",
        ));
    }
    if !opts.batched && opts.return_history {
        return Err(EvalError::Unsupported(
            "history is only available in batched mode",
        ));
    }
    if !opts.step_factor.is_finite() || opts.step_factor < 0.0 {
        return Err(EvalError::InvalidConfig(format!(
            "step_factor must be finite and non-negative, got {}",
            opts.step_factor
        )));
    }
    match (opts.batched, opts.max_batch_size) {
        (true, Some(0)) => Err(EvalError::InvalidConfig(
            "max_batch_size must be at least 1".to_string(),
        )),
        (false, Some(m)) => {
            progress.on_warning(&format!(
                "max_batch_size={m} argument ignored in sequential mode"
            ));
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Evaluate `network` on every graph, in order, against the greedy baseline.
pub fn evaluate_network<N: ValueNetwork + ?Sized>(
    network: &N,
    env: &EnvOptions,
    graphs: &[AdjacencyMatrix],
    opts: &EvalOptions,
    progress: &mut dyn EvalProgress,
) -> Result<ResultTables, EvalError> {
    validate(opts, progress)?;
    let n_attempts = effective_attempts(env, opts.n_attempts);
    let selector = ActionSelector::from_options(env);

    let mut tables = ResultTables {
        summary: Vec::with_capacity(graphs.len()),
        raw: opts.return_raw.then(Vec::new),
        history: opts.return_history.then(Vec::new),
    };

    for (index, graph) in graphs.iter().enumerate() {
        let (row, raw, history) =
            evaluate_graph(network, &selector, env, index, graph, n_attempts, opts, progress)
                .map_err(|source| EvalError::Graph { index, source })?;
        progress.on_graph_finished(&row);
        tables.summary.push(row);
        if let Some(r) = tables.raw.as_mut() {
            r.push(raw);
        }
        if let Some(h) = tables.history.as_mut() {
            h.push(history);
        }
    }
    Ok(tables)
}

#[allow(clippy::too_many_arguments)]
fn evaluate_graph<N: ValueNetwork + ?Sized>(
    network: &N,
    selector: &ActionSelector,
    env: &EnvOptions,
    index: usize,
    graph: &AdjacencyMatrix,
    n_attempts: usize,
    opts: &EvalOptions,
    progress: &mut dyn EvalProgress,
) -> Result<(GraphResultRow, RawResultRow, HistoryRow), GraphFailure> {
    let n = graph.n();
    let template = make(
        SystemKind::VertexSystem,
        &SingleGraphGenerator::new(graph.clone()),
        step_budget(n, opts.step_factor),
        *env,
    )?;
    let mut rng = graph_rng(opts.seed, index);
    progress.on_graph_started(index, n, n_attempts);

    let baseline = GreedyBaselineRunner::new(&template);
    let mut acc = GraphAccumulator::new(
        index,
        n,
        env.reversible_vertices,
        baseline.fixed_init()?,
    );

    if opts.batched {
        let mut sched = BatchedRolloutScheduler::new(
            network,
            *selector,
            RolloutConfig {
                max_batch_size: opts.max_batch_size,
                record_history: opts.return_history,
                device: opts.device,
            },
        )?;
        let mut first = 0usize;
        for (batch_index, size) in sched.plan(n_attempts).into_iter().enumerate() {
            let outcome = sched.run_batch(&template, batch_index, first, size, &mut rng)?;
            first += size;
            let greedy = if env.reversible_vertices {
                baseline.matched(&outcome.initial_states)
            } else {
                Vec::new()
            };
            progress.on_batch_finished(index, &BatchSummary::from(&outcome));
            acc.push_batch(outcome, greedy);
        }
    } else {
        for attempt in 0..n_attempts {
            let a = sequential::run_attempt(
                network,
                selector,
                &template,
                attempt,
                opts.device,
                &mut rng,
            )?;
            let greedy = env
                .reversible_vertices
                .then(|| baseline::converge(a.initial_state));
            acc.push_attempt(a.result, a.init_vertices, greedy, a.elapsed.as_secs_f64());
        }
    }
    Ok(acc.finish())
}


#[cfg(test)]
mod eval_tests;
