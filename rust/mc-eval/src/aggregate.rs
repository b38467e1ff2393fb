//! Folding per-attempt results into per-graph tables.

use mc_runtime::{AttemptResult, BatchOutcome};
use serde::Serialize;

use crate::baseline::GreedyOutcome;

/// Summary statistics for one graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphResultRow {
    pub graph: usize,
    pub n_vertices: usize,
    pub n_attempts: usize,
    /// Best cut across attempts.
    pub cut: Option<f64>,
    pub sol: Option<Vec<i8>>,
    pub mean_cut: Option<f64>,
    pub greedy_fixed_cut: f64,
    pub greedy_fixed_sol: Vec<i8>,
    pub greedy_random_cut: Option<f64>,
    pub greedy_random_sol: Option<Vec<i8>>,
    pub greedy_random_mean_cut: Option<f64>,
    /// Mean seconds per attempt.
    pub time: Option<f64>,
}

/// Per-attempt values for one graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawResultRow {
    pub graph: usize,
    pub init_vertices: Vec<Vec<i8>>,
    pub cuts: Vec<f64>,
    pub sols: Vec<Vec<i8>>,
    pub greedy_cuts: Vec<f64>,
    pub greedy_sols: Vec<Vec<i8>>,
}

/// Per-attempt trajectories for one graph, `[attempt][step]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryRow {
    pub graph: usize,
    pub initial_scores: Vec<f64>,
    pub actions: Vec<Vec<usize>>,
    pub scores: Vec<Vec<f64>>,
    pub rewards: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTables {
    pub summary: Vec<GraphResultRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<RawResultRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryRow>>,
}

/// Accumulates everything produced for one graph.
#[derive(Debug, Clone)]
pub struct GraphAccumulator {
    n_vertices: usize,
    reversible: bool,
    fixed: GreedyOutcome,
    raw: RawResultRow,
    history: HistoryRow,
    total_seconds: f64,
}

impl GraphAccumulator {
    pub fn new(graph: usize, n_vertices: usize, reversible: bool, fixed: GreedyOutcome) -> Self {
        Self {
            n_vertices,
            reversible,
            fixed,
            raw: RawResultRow {
                graph,
                ..RawResultRow::default()
            },
            history: HistoryRow {
                graph,
                ..HistoryRow::default()
            },
            total_seconds: 0.0,
        }
    }

    pub fn attempts(&self) -> usize {
        self.raw.cuts.len()
    }

    /// Add one attempt. `greedy` is the matched baseline; ignored for the irreversible variant.
    pub fn push_attempt(
        &mut self,
        attempt: AttemptResult,
        init_vertices: Vec<i8>,
        greedy: Option<GreedyOutcome>,
        seconds: f64,
    ) {
        let greedy = match greedy {
            Some(g) if self.reversible => g,
            _ => self.fixed.clone(),
        };
        self.raw.init_vertices.push(init_vertices);
        self.raw.cuts.push(attempt.best_cut);
        self.raw.sols.push(attempt.best_vertices);
        self.raw.greedy_cuts.push(greedy.cut);
        self.raw.greedy_sols.push(greedy.solution);
        self.total_seconds += seconds;
    }

    /// Add a whole sub-batch. Batch wall time is split evenly across its attempts.
    pub fn push_batch(&mut self, outcome: BatchOutcome, greedy: Vec<GreedyOutcome>) {
        let size = outcome.attempts.len().max(1);
        let per_attempt = outcome.elapsed.as_secs_f64() / size as f64;
        if let Some(h) = outcome.history {
            self.history.initial_scores.extend(h.initial_scores);
            self.history.actions.extend(h.actions);
            self.history.scores.extend(h.scores);
            self.history.rewards.extend(h.rewards);
        }
        let mut greedy = greedy.into_iter();
        for (attempt, init) in outcome.attempts.into_iter().zip(outcome.init_vertices) {
            self.push_attempt(attempt, init, greedy.next(), per_attempt);
        }
    }

    /// Summary row, raw row and history row for this graph.
    pub fn finish(self) -> (GraphResultRow, RawResultRow, HistoryRow) {
        let n = self.raw.cuts.len();
        let best = argmax_first(&self.raw.cuts);
        let greedy_best = argmax_first(&self.raw.greedy_cuts);
        let row = GraphResultRow {
            graph: self.raw.graph,
            n_vertices: self.n_vertices,
            n_attempts: n,
            cut: best.map(|i| self.raw.cuts[i]),
            sol: best.map(|i| self.raw.sols[i].clone()),
            mean_cut: mean(&self.raw.cuts),
            greedy_fixed_cut: self.fixed.cut,
            greedy_fixed_sol: self.fixed.solution.clone(),
            greedy_random_cut: greedy_best.map(|i| self.raw.greedy_cuts[i]),
            greedy_random_sol: greedy_best.map(|i| self.raw.greedy_sols[i].clone()),
            greedy_random_mean_cut: mean(&self.raw.greedy_cuts),
            time: (n > 0).then(|| self.total_seconds / n as f64),
        };
        (row, self.raw, self.history)
    }
}

/// First index of the maximum.
fn argmax_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
