use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use mc_core::AdjacencyMatrix;
use serde_json::Value;

fn mceval_bin() -> String {
    env!("CARGO_BIN_EXE_mceval").to_string()
}

fn run(args: &[&str]) -> Output {
    Command::new(mceval_bin()).args(args).output().unwrap()
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

fn cycle(n: usize) -> AdjacencyMatrix {
    let mut m = AdjacencyMatrix::zeros(n);
    for i in 0..n {
        m.set_symmetric(i, (i + 1) % n, 1.0);
    }
    m
}

fn write_corpus(dir: &Path) -> String {
    let path = dir.join("graphs.json");
    mc_graphs::save_graph_set_json(&path, &[cycle(5), cycle(8)]).unwrap();
    path.to_str().unwrap().to_string()
}

fn write_config(dir: &Path) -> String {
    let path = dir.join("eval.yaml");
    fs::write(
        &path,
        r#"
env:
  reversible_vertices: true
  vertex_basis: signed

eval:
  n_attempts: 3
  step_factor: 1.0

logging:
  flush_every_lines: 1
"#,
    )
    .unwrap();
    path.to_str().unwrap().to_string()
}

fn ndjson(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn start_dummy_infer_server_tcp() -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
    use std::net::TcpListener;
    use std::thread;

    use mc_infer::codec::{decode_request_v1, encode_response_v1};
    use mc_infer::frame::{read_frame, write_frame};
    use mc_infer::protocol::PredictResponseV1;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let Ok((mut sock, _)) = listener.accept() else {
            return;
        };
        // Serve until the client hangs up; q is each vertex's immediate reward channel.
        while let Ok(payload) = read_frame(&mut sock) {
            let Ok(req) = decode_request_v1(&payload) else {
                break;
            };
            let f = req.n_features as usize;
            let resp = PredictResponseV1 {
                request_id: req.request_id,
                batch: req.batch,
                n_vertices: req.n_vertices,
                q_values: req.observations.chunks_exact(f).map(|v| v[1]).collect(),
            };
            if write_frame(&mut sock, &encode_response_v1(&resp)).is_err() {
                break;
            }
        }
    });
    (addr, handle)
}

#[test]
fn help_and_version_run() {
    let out = run(&["--version"]);
    assert_success(&out);
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("mceval "));

    let out = run(&["eval", "--help"]);
    assert_success(&out);
    assert!(String::from_utf8_lossy(&out.stdout).contains("mceval eval"));
}

#[test]
fn unknown_command_fails() {
    let out = run(&["frobnicate"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn graphs_prints_vertex_and_edge_counts() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = write_corpus(dir.path());
    let out = run(&["graphs", "--graphs", &graphs]);
    assert_success(&out);
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("2 target graphs loaded from"));
    assert!(s.contains("graph 0: n=5 edges=5"));
    assert!(s.contains("graph 1: n=8 edges=8"));
}

#[test]
fn graphs_lists_benchmark_instances() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("instances")).unwrap();
    fs::create_dir_all(dir.path().join("bkvl")).unwrap();
    fs::write(dir.path().join("instances/tri.mc"), "3 3\n1 2 1\n2 3 1\n1 3 1\n").unwrap();
    fs::write(dir.path().join("bkvl/tri.bkvl"), "2\n").unwrap();

    let out = run(&["graphs", "--instances", dir.path().to_str().unwrap()]);
    assert_success(&out);
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("tri: n=3 edges=3 best_known=2"), "{s}");
}

#[test]
fn greedy_reports_every_graph() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = write_corpus(dir.path());
    let out = run(&["greedy", "--graphs", &graphs]);
    assert_success(&out);
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("graph 0: n=5"));
    assert!(s.contains("graph 1: n=8"));
    assert!(s.contains("mean greedy cut"));
}

#[test]
fn eval_with_local_weights_writes_manifest_events_and_tables() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = write_corpus(dir.path());
    let config = write_config(dir.path());
    let weights = dir.path().join("linear.safetensors");
    let run_dir = dir.path().join("run");

    assert_success(&run(&["weights-init", "--out", weights.to_str().unwrap()]));
    assert!(weights.exists());

    let out = run(&[
        "eval",
        "--config",
        &config,
        "--graphs",
        &graphs,
        "--weights",
        weights.to_str().unwrap(),
        "--out",
        run_dir.to_str().unwrap(),
        "--max-batch",
        "2",
        "--raw",
        "--history",
        "--seed",
        "11",
    ]);
    assert_success(&out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("graph 0: n=5 attempts=3"));
    assert!(stdout.contains("graph 1: n=8 attempts=3"));

    let manifest = mc_logging::read_manifest(run_dir.join("run.json")).unwrap();
    assert!(manifest.completed);
    assert_eq!(manifest.n_graphs, 2);
    assert_eq!(manifest.graphs_completed, 2);
    assert_eq!(manifest.seed, 11);
    assert_eq!(manifest.n_attempts, 3);
    assert!(manifest.batched);
    assert!(manifest.config_hash.is_some());
    assert!(manifest.network.starts_with("linear"));

    let summary = ndjson(&run_dir.join("summary.ndjson"));
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[1]["n_vertices"], 8);
    assert_eq!(summary[0]["n_attempts"], 3);

    let raw = ndjson(&run_dir.join("raw.ndjson"));
    assert_eq!(raw[0]["cuts"].as_array().unwrap().len(), 3);

    let history = ndjson(&run_dir.join("history.ndjson"));
    let actions = history[1]["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0].as_array().unwrap().len(), 8);

    let events = ndjson(&run_dir.join("events.ndjson"));
    let count = |kind: &str| events.iter().filter(|e| e["event"] == kind).count();
    assert_eq!(count("graph_summary"), 2);
    // Three attempts in sub-batches of at most two, per graph.
    assert_eq!(count("batch"), 4);
}

#[test]
fn sequential_with_raw_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let graphs = write_corpus(dir.path());
    let config = write_config(dir.path());
    let run_dir = dir.path().join("run");

    let out = run(&[
        "eval",
        "--config",
        &config,
        "--graphs",
        &graphs,
        "--out",
        run_dir.to_str().unwrap(),
        "--sequential",
        "--raw",
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unsupported"));
    assert!(!run_dir.join("summary.ndjson").exists());
}

#[test]
fn eval_without_graphs_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let out = run(&["eval", "--config", &config]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Missing --graphs"));
}

#[test]
fn eval_against_remote_server() {
    let (addr, server) = start_dummy_infer_server_tcp();
    let dir = tempfile::tempdir().unwrap();
    let graphs = write_corpus(dir.path());
    let config = write_config(dir.path());
    let run_dir = dir.path().join("run");

    let endpoint = format!("tcp://{addr}");
    let out = run(&[
        "eval",
        "--config",
        &config,
        "--graphs",
        &graphs,
        "--infer",
        &endpoint,
        "--out",
        run_dir.to_str().unwrap(),
    ]);
    assert_success(&out);
    server.join().unwrap();

    let manifest = mc_logging::read_manifest(run_dir.join("run.json")).unwrap();
    assert!(manifest.completed);
    assert!(manifest.network.contains("remote model 0"));
    assert_eq!(ndjson(&run_dir.join("summary.ndjson")).len(), 2);
}
