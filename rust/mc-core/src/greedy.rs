//! Deterministic greedy local search used as the evaluation baseline.

use crate::env::SpinSystem;

/// Gains at or below this are treated as "no improvement".
const IMPROVEMENT_EPS: f64 = 1e-9;

/// Repeatedly flips the legal vertex with the largest cut gain until no flip improves the cut.
///
/// The policy runs outside the environment's step budget and terminates on its own: every
/// flip strictly increases the cut, and there are finitely many assignments.
pub struct Greedy<'a> {
    env: &'a mut SpinSystem,
}

impl<'a> Greedy<'a> {
    pub fn new(env: &'a mut SpinSystem) -> Self {
        Self { env }
    }

    /// Best legal improving move, lowest index on ties.
    pub fn best_move(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (v, gain) in self.env.immediate_rewards().into_iter().enumerate() {
            if !self.env.is_flippable(v) || gain <= IMPROVEMENT_EPS {
                continue;
            }
            match best {
                Some((_, g)) if g >= gain => {}
                _ => best = Some((v, gain)),
            }
        }
        best
    }

    /// Run to a local optimum. Returns the number of flips made.
    ///
    /// Calling this again on a converged environment makes no flips.
    pub fn solve(&mut self) -> usize {
        let mut flips = 0usize;
        while let Some((v, _gain)) = self.best_move() {
            self.env.flip_unbudgeted(v);
            flips += 1;
        }
        flips
    }
}
