//! Per-step trajectory capture.

/// What one slot did in one lockstep round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    pub action: usize,
    /// Cut value after the step.
    pub score: f64,
    pub reward: f64,
}

/// Per-attempt sequences, indexed `[attempt_in_batch][step]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchHistory {
    pub initial_scores: Vec<f64>,
    pub actions: Vec<Vec<usize>>,
    pub scores: Vec<Vec<f64>>,
    pub rewards: Vec<Vec<f64>>,
}

/// Collects step-major rounds and transposes them at the end of a batch.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    initial_scores: Vec<f64>,
    rounds: Vec<Vec<Option<StepRecord>>>,
}

impl HistoryRecorder {
    pub fn new(initial_scores: Vec<f64>) -> Self {
        Self {
            initial_scores,
            rounds: Vec::new(),
        }
    }

    pub fn n_slots(&self) -> usize {
        self.initial_scores.len()
    }

    /// One entry per slot; `None` for slots that were already free.
    pub fn record_round(&mut self, round: Vec<Option<StepRecord>>) {
        debug_assert_eq!(round.len(), self.n_slots());
        self.rounds.push(round);
    }

    pub fn finish(self) -> BatchHistory {
        let n = self.n_slots();
        let mut out = BatchHistory {
            initial_scores: self.initial_scores,
            actions: vec![Vec::new(); n],
            scores: vec![Vec::new(); n],
            rewards: vec![Vec::new(); n],
        };
        for round in self.rounds {
            for (slot, rec) in round.into_iter().enumerate() {
                if let Some(r) = rec {
                    out.actions[slot].push(r.action);
                    out.scores[slot].push(r.score);
                    out.rewards[slot].push(r.reward);
                }
            }
        }
        out
    }
}
