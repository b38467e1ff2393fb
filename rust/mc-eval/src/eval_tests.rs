use mc_core::{AdjacencyMatrix, EnvOptions, VertexBasis};
use mc_infer::{Device, LinearValueNet};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

use crate::{evaluate_network, BatchSummary, EvalError, EvalOptions, EvalProgress, GraphResultRow};

fn k4() -> AdjacencyMatrix {
    let mut m = AdjacencyMatrix::zeros(4);
    for i in 0..4 {
        for j in (i + 1)..4 {
            m.set_symmetric(i, j, 1.0);
        }
    }
    m
}

fn random_graph(n: usize, seed: u64) -> AdjacencyMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut m = AdjacencyMatrix::zeros(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if rng.gen_bool(0.4) {
                m.set_symmetric(i, j, rng.gen_range(0.1..2.0));
            }
        }
    }
    m
}

fn brute_force_max_cut(m: &AdjacencyMatrix) -> f64 {
    let n = m.n();
    (0u32..(1 << n))
        .map(|mask| {
            let spins: Vec<i8> = (0..n)
                .map(|i| if mask & (1 << i) != 0 { -1 } else { 1 })
                .collect();
            m.cut_value(&spins)
        })
        .fold(f64::NEG_INFINITY, f64::max)
}

fn decode(basis: VertexBasis, v: &[i8]) -> Vec<i8> {
    v.iter().map(|&x| basis.decode(x).unwrap()).collect()
}

fn is_local_optimum(m: &AdjacencyMatrix, spins: &[i8]) -> bool {
    let base = m.cut_value(spins);
    (0..spins.len()).all(|i| {
        let mut s = spins.to_vec();
        s[i] = -s[i];
        m.cut_value(&s) <= base + 1e-9
    })
}

fn batched(n_attempts: usize) -> EvalOptions {
    EvalOptions {
        n_attempts,
        step_factor: 2.0,
        batched: true,
        max_batch_size: Some(3),
        return_raw: true,
        return_history: true,
        seed: 17,
        device: Device::Cpu,
    }
}

#[derive(Default)]
struct Recorder {
    started: Vec<usize>,
    batches: Vec<(usize, BatchSummary)>,
    finished: Vec<usize>,
    warnings: Vec<String>,
}

impl EvalProgress for Recorder {
    fn on_graph_started(&mut self, index: usize, _n: usize, _a: usize) {
        self.started.push(index);
    }

    fn on_batch_finished(&mut self, graph: usize, batch: &BatchSummary) {
        self.batches.push((graph, *batch));
    }

    fn on_graph_finished(&mut self, row: &GraphResultRow) {
        self.finished.push(row.graph);
    }

    fn on_warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }
}

#[test]
fn best_is_max_and_mean_is_mean_of_attempts() {
    let graphs = vec![random_graph(9, 1), random_graph(6, 2)];
    let net = LinearValueNet::immediate_reward();
    let tables = evaluate_network(&net, &EnvOptions::default(), &graphs, &batched(7), &mut ())
        .unwrap();
    let raw = tables.raw.as_ref().unwrap();
    for (row, raw) in tables.summary.iter().zip(raw) {
        assert_eq!(row.n_attempts, 7);
        assert_eq!(raw.cuts.len(), 7);
        let max = raw.cuts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = raw.cuts.iter().sum::<f64>() / 7.0;
        assert_eq!(row.cut, Some(max));
        assert!((row.mean_cut.unwrap() - mean).abs() < 1e-12);

        let gmax = raw.greedy_cuts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(row.greedy_random_cut, Some(gmax));
    }
}

#[test]
fn matched_greedy_starts_from_the_attempt_initial_state() {
    let graphs = vec![random_graph(8, 5)];
    let net = LinearValueNet::immediate_reward();
    let env = EnvOptions::default();
    let tables = evaluate_network(&net, &env, &graphs, &batched(5), &mut ()).unwrap();
    let raw_rows = tables.raw.unwrap();
    let raw = &raw_rows[0];
    for (init, g) in raw.init_vertices.iter().zip(&raw.greedy_cuts) {
        let start = graphs[0].cut_value(&decode(env.vertex_basis, init));
        assert!(*g >= start - 1e-9);
    }
    for sol in &raw.greedy_sols {
        assert!(is_local_optimum(&graphs[0], &decode(env.vertex_basis, sol)));
    }
}

#[test]
fn irreversible_runs_exactly_one_attempt() {
    let graphs = vec![random_graph(6, 3), random_graph(5, 4)];
    let env = EnvOptions {
        reversible_vertices: false,
        ..EnvOptions::default()
    };
    let net = LinearValueNet::immediate_reward();
    let opts = EvalOptions {
        n_attempts: 50,
        ..batched(50)
    };
    let tables = evaluate_network(&net, &env, &graphs, &opts, &mut ()).unwrap();
    for row in &tables.summary {
        assert_eq!(row.n_attempts, 1);
        assert_eq!(row.greedy_random_cut, Some(row.greedy_fixed_cut));
    }
}

#[test]
fn k4_policy_is_bounded_by_brute_force_and_greedy_is_local_optimum() {
    let env = EnvOptions {
        vertex_basis: VertexBasis::Binary,
        ..EnvOptions::default()
    };
    let opts = EvalOptions {
        n_attempts: 1,
        step_factor: 1.0,
        ..batched(1)
    };
    let net = LinearValueNet::immediate_reward();
    let graphs = vec![k4()];
    let tables = evaluate_network(&net, &env, &graphs, &opts, &mut ()).unwrap();
    let row = &tables.summary[0];

    let optimum = brute_force_max_cut(&graphs[0]);
    assert_eq!(optimum, 4.0);
    assert!(row.cut.unwrap() <= optimum + 1e-9);

    let fixed = decode(env.vertex_basis, &row.greedy_fixed_sol);
    assert!(is_local_optimum(&graphs[0], &fixed));
    assert_eq!(graphs[0].cut_value(&fixed), row.greedy_fixed_cut);
    let random = decode(env.vertex_basis, row.greedy_random_sol.as_ref().unwrap());
    assert!(is_local_optimum(&graphs[0], &random));
}

#[test]
fn sequential_matches_batched_with_same_seed() {
    let graphs = vec![random_graph(7, 8), random_graph(10, 9), random_graph(4, 10)];
    let env = EnvOptions::default();
    let net = LinearValueNet::immediate_reward();
    let b = evaluate_network(&net, &env, &graphs, &batched(6), &mut ()).unwrap();
    let seq_opts = EvalOptions {
        batched: false,
        max_batch_size: None,
        return_raw: false,
        return_history: false,
        ..batched(6)
    };
    let s = evaluate_network(&net, &env, &graphs, &seq_opts, &mut ()).unwrap();
    assert!(s.raw.is_none());
    for (x, y) in b.summary.iter().zip(&s.summary) {
        assert_eq!(x.cut, y.cut);
        assert_eq!(x.sol, y.sol);
        assert_eq!(x.mean_cut, y.mean_cut);
        assert_eq!(x.greedy_fixed_cut, y.greedy_fixed_cut);
        assert_eq!(x.greedy_random_cut, y.greedy_random_cut);
        assert_eq!(x.greedy_random_sol, y.greedy_random_sol);
        assert_eq!(x.greedy_random_mean_cut, y.greedy_random_mean_cut);
    }
}

#[test]
fn history_lengths_match_step_counts() {
    let graphs = vec![random_graph(6, 12)];
    let net = LinearValueNet::immediate_reward();
    let opts = EvalOptions {
        step_factor: 1.5,
        ..batched(4)
    };
    let tables =
        evaluate_network(&net, &EnvOptions::default(), &graphs, &opts, &mut ()).unwrap();
    let history = tables.history.unwrap();
    let h = &history[0];
    assert_eq!(h.actions.len(), 4);
    assert_eq!(h.initial_scores.len(), 4);
    for k in 0..4 {
        // floor(6 * 1.5) = 9 steps per reversible attempt.
        assert_eq!(h.actions[k].len(), 9);
        assert_eq!(h.scores[k].len(), 9);
        assert_eq!(h.rewards[k].len(), 9);
    }
}

#[test]
fn sequential_with_raw_or_history_is_unsupported() {
    let net = LinearValueNet::immediate_reward();
    let graphs = vec![k4()];
    for (raw, history) in [(true, false), (false, true)] {
        let opts = EvalOptions {
            batched: false,
            return_raw: raw,
            return_history: history,
            ..batched(2)
        };
        let mut rec = Recorder::default();
        let err = evaluate_network(&net, &EnvOptions::default(), &graphs, &opts, &mut rec)
            .unwrap_err();
        assert!(matches!(err, EvalError::Unsupported(_)));
        assert!(rec.started.is_empty());
    }
}

#[test]
fn max_batch_size_in_sequential_mode_only_warns() {
    let net = LinearValueNet::immediate_reward();
    let graphs = vec![k4()];
    let opts = EvalOptions {
        batched: false,
        return_raw: false,
        return_history: false,
        max_batch_size: Some(8),
        ..batched(2)
    };
    let mut rec = Recorder::default();
    let tables = evaluate_network(&net, &EnvOptions::default(), &graphs, &opts, &mut rec).unwrap();
    assert_eq!(tables.summary.len(), 1);
    assert_eq!(rec.warnings.len(), 1);
    assert!(rec.warnings[0].contains("ignored"));
}

#[test]
fn zero_max_batch_size_is_invalid() {
    let net = LinearValueNet::immediate_reward();
    let opts = EvalOptions {
        max_batch_size: Some(0),
        ..batched(2)
    };
    assert!(matches!(
        evaluate_network(&net, &EnvOptions::default(), &[k4()], &opts, &mut ()),
        Err(EvalError::InvalidConfig(_))
    ));
}

#[test]
fn rows_follow_input_order_and_report_batches() {
    let graphs = vec![random_graph(3, 20), random_graph(8, 21), random_graph(5, 22)];
    let net = LinearValueNet::immediate_reward();
    let mut rec = Recorder::default();
    let tables =
        evaluate_network(&net, &EnvOptions::default(), &graphs, &batched(7), &mut rec).unwrap();
    let order: Vec<usize> = tables.summary.iter().map(|r| r.graph).collect();
    assert_eq!(order, vec![0, 1, 2]);
    let sizes: Vec<usize> = tables.summary.iter().map(|r| r.n_vertices).collect();
    assert_eq!(sizes, vec![3, 8, 5]);
    assert_eq!(rec.started, vec![0, 1, 2]);
    assert_eq!(rec.finished, vec![0, 1, 2]);
    // 7 attempts in batches of at most 3.
    assert_eq!(rec.batches.len(), 9);
    let first: Vec<usize> = rec
        .batches
        .iter()
        .filter(|(g, _)| *g == 0)
        .map(|(_, b)| b.size)
        .collect();
    assert_eq!(first, vec![3, 3, 1]);
}

#[test]
fn failing_graph_aborts_with_its_index() {
    let mut bad = AdjacencyMatrix::zeros(3);
    bad.set(0, 1, 1.0);
    let graphs = vec![k4(), bad, k4()];
    let net = LinearValueNet::immediate_reward();
    let mut rec = Recorder::default();
    let err = evaluate_network(&net, &EnvOptions::default(), &graphs, &batched(2), &mut rec)
        .unwrap_err();
    assert!(matches!(err, EvalError::Graph { index: 1, .. }));
    assert_eq!(rec.finished, vec![0]);
}

#[test]
fn zero_attempts_yield_rows_without_statistics() {
    let net = LinearValueNet::immediate_reward();
    let tables =
        evaluate_network(&net, &EnvOptions::default(), &[k4()], &batched(0), &mut ()).unwrap();
    let row = &tables.summary[0];
    assert_eq!(row.n_attempts, 0);
    assert_eq!(row.cut, None);
    assert_eq!(row.greedy_fixed_cut, 4.0);
}
