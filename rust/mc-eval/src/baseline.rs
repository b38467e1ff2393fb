//! Greedy reference solutions.

use mc_core::{EnvError, Greedy, SpinSystem};

/// Result of running greedy to convergence.
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyOutcome {
    pub cut: f64,
    /// Basis-encoded.
    pub solution: Vec<i8>,
    pub flips: usize,
}

/// Runs the greedy policy on clones; never touches the template or the given states.
pub struct GreedyBaselineRunner<'t> {
    template: &'t SpinSystem,
}

impl<'t> GreedyBaselineRunner<'t> {
    pub fn new(template: &'t SpinSystem) -> Self {
        Self { template }
    }

    /// Greedy from the all-unflipped assignment.
    pub fn fixed_init(&self) -> Result<GreedyOutcome, EnvError> {
        let mut env = self.template.clone();
        let unflipped = env.options().vertex_basis.unflipped();
        let init = vec![unflipped; env.n_vertices()];
        env.reset_to(&init)?;
        Ok(converge(env))
    }

    /// Greedy from each of the given post-reset states.
    pub fn matched(&self, initial_states: &[SpinSystem]) -> Vec<GreedyOutcome> {
        initial_states.iter().cloned().map(converge).collect()
    }
}

/// Run greedy on `env` until no legal flip improves the cut.
pub fn converge(mut env: SpinSystem) -> GreedyOutcome {
    let flips = Greedy::new(&mut env).solve();
    GreedyOutcome {
        cut: env.get_best_cut(),
        solution: env.best_vertices(),
        flips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_core::{make, AdjacencyMatrix, EnvOptions, SingleGraphGenerator, SystemKind, VertexBasis};

    fn path3(options: EnvOptions) -> SpinSystem {
        let mut m = AdjacencyMatrix::zeros(3);
        m.set_symmetric(0, 1, 1.0);
        m.set_symmetric(1, 2, 1.0);
        make(SystemKind::VertexSystem, &SingleGraphGenerator::new(m), 6, options).unwrap()
    }

    #[test]
    fn fixed_init_starts_all_unflipped_in_either_basis() {
        for (reversible_vertices, vertex_basis) in
            [(true, VertexBasis::Signed), (false, VertexBasis::Binary)]
        {
            let tpl = path3(EnvOptions {
                reversible_vertices,
                vertex_basis,
                ..EnvOptions::default()
            });
            let before = tpl.vertices();
            let out = GreedyBaselineRunner::new(&tpl).fixed_init().unwrap();
            // Only the middle vertex improves the empty cut.
            assert_eq!(out.flips, 1);
            assert_eq!(out.cut, 2.0);
            let flipped = vertex_basis.encode(-1);
            let unflipped = vertex_basis.unflipped();
            assert_eq!(out.solution, vec![unflipped, flipped, unflipped]);
            assert_eq!(tpl.vertices(), before);
        }
    }
}
