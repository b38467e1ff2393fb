//! mceval: CLI binary for max-cut value network evaluation.
//!
//! Subcommands:
//! - eval
//! - greedy
//! - graphs
//! - weights-init

use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use mc_core::config::{Config, InferenceBackend, InferenceConfig};
use mc_core::{make, SingleGraphGenerator, SystemKind};
use mc_eval::{
    effective_attempts, step_budget, BatchSummary, EvalOptions, EvalProgress,
    GreedyBaselineRunner, GraphResultRow, StdoutProgress,
};
use mc_infer::{Device, LinearValueNet, RemoteValueNet, ValueNetwork};
use mc_logging::{
    BatchEventV1, GraphSummaryEventV1, NdjsonError, NdjsonWriter, RunManifestV1, VersionInfoV1,
};

const EVENTS_FILE: &str = "events.ndjson";
const SUMMARY_FILE: &str = "summary.ndjson";
const RAW_FILE: &str = "raw.ndjson";
const HISTORY_FILE: &str = "history.ndjson";

fn fail(msg: impl Display) -> ! {
    eprintln!("{msg}");
    process::exit(1);
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v,
        None => fail(format!("Missing value for {flag}")),
    }
}

fn parse_flag<T: FromStr>(args: &[String], i: usize, flag: &str) -> T {
    let v = flag_value(args, i, flag);
    v.parse()
        .unwrap_or_else(|_| fail(format!("Invalid {flag} value: {v}")))
}

fn load_config(path: &str) -> Config {
    Config::load(path).unwrap_or_else(|e| fail(format!("Failed to load config: {e}")))
}

fn load_corpus(path: &Path) -> mc_graphs::GraphCorpus {
    mc_graphs::load_graph_set(path).unwrap_or_else(|e| {
        fail(format!("Failed to load graphs from {}: {e}", path.display()))
    })
}

/// Build the configured value network and the device its batches go to.
fn build_network(inf: &InferenceConfig) -> (Box<dyn ValueNetwork>, Device) {
    let device = Device::resolve(&inf.device, Device::Cpu)
        .unwrap_or_else(|e| fail(format!("Invalid inference device: {e}")));
    match inf.backend {
        InferenceBackend::Local => {
            if device != Device::Cpu {
                fail(format!(
                    "The local linear backend only runs on cpu, not {device}"
                ));
            }
            let net = match &inf.weights {
                Some(p) => LinearValueNet::load(p).unwrap_or_else(|e| {
                    fail(format!("Failed to load weights {}: {e}", p.display()))
                }),
                None => LinearValueNet::immediate_reward(),
            };
            (Box::new(net), device)
        }
        InferenceBackend::Remote => {
            let endpoint = inf.endpoint.as_deref().unwrap_or_else(|| {
                fail("Remote backend needs an endpoint (--infer or inference.endpoint)")
            });
            let net = RemoteValueNet::connect(endpoint, inf.model_id)
                .unwrap_or_else(|e| fail(format!("Failed to connect to {endpoint}: {e}")))
                .with_device(device);
            (Box::new(net), device)
        }
    }
}

/// Console lines plus NDJSON events. Logging errors are kept until the run ends.
struct EventLog {
    console: StdoutProgress,
    events: NdjsonWriter,
    run_id: String,
    graphs_completed: u64,
    error: Option<NdjsonError>,
}

impl EventLog {
    fn keep(&mut self, r: Result<(), NdjsonError>) {
        if let Err(e) = r {
            self.error.get_or_insert(e);
        }
    }
}

impl EvalProgress for EventLog {
    fn on_graph_started(&mut self, index: usize, n_vertices: usize, n_attempts: usize) {
        self.console.on_graph_started(index, n_vertices, n_attempts);
    }

    fn on_batch_finished(&mut self, graph: usize, batch: &BatchSummary) {
        let ev = BatchEventV1 {
            event: mc_logging::EVENT_BATCH,
            ts_ms: mc_logging::now_ms(),
            run_id: self.run_id.clone(),
            graph: graph as u64,
            batch: batch.batch_index as u64,
            size: batch.size as u64,
            rounds: batch.rounds,
            env_steps: batch.env_steps,
            seconds: batch.seconds,
        };
        let r = self.events.write_event(&ev);
        self.keep(r);
    }

    fn on_graph_finished(&mut self, row: &GraphResultRow) {
        self.console.on_graph_finished(row);
        let ev = GraphSummaryEventV1 {
            event: mc_logging::EVENT_GRAPH_SUMMARY,
            ts_ms: mc_logging::now_ms(),
            v: VersionInfoV1 {
                protocol_version: mc_infer::protocol::PROTOCOL_VERSION,
                feature_schema_id: mc_features::FEATURE_SCHEMA_ID,
            },
            run_id: self.run_id.clone(),
            graph: row.graph as u64,
            n_vertices: row.n_vertices as u64,
            attempts: row.n_attempts as u64,
            best_cut: row.cut,
            mean_cut: row.mean_cut,
            greedy_fixed_cut: row.greedy_fixed_cut,
            greedy_random_cut: row.greedy_random_cut,
            greedy_random_mean_cut: row.greedy_random_mean_cut,
            mean_attempt_s: row.time,
        };
        let r = self.events.write_event(&ev);
        self.keep(r);
        self.graphs_completed += 1;
    }

    fn on_warning(&mut self, msg: &str) {
        self.console.on_warning(msg);
    }
}

fn cmd_eval(args: &[String]) {
    let mut config_path: Option<String> = None;
    let mut graphs: Option<PathBuf> = None;
    let mut weights: Option<PathBuf> = None;
    let mut infer: Option<String> = None;
    let mut out: Option<PathBuf> = None;
    let mut attempts: Option<u32> = None;
    let mut max_batch: Option<u32> = None;
    let mut seed: Option<u64> = None;
    let mut sequential = false;
    let mut raw = false;
    let mut history = false;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mceval eval

USAGE:
    mceval eval --config cfg.yaml --graphs graphs.json [--weights W | --infer ENDPOINT] [--out DIR]

OPTIONS:
    --config PATH       Path to YAML config (required)
    --graphs PATH       Graph collection (.json or .safetensors); overrides paths.graphs
    --weights PATH      Local linear weights (.safetensors)
    --infer ENDPOINT    Remote value network (tcp://host:port or unix:///path)
    --out DIR           Output directory; overrides paths.out_dir (default: runs/<run id>)
    --attempts N        Attempts per graph
    --max-batch N       Cap on concurrent attempts per sub-batch
    --sequential        Run attempts one at a time
    --raw               Also write per-attempt results
    --history           Also write per-attempt action/score/reward histories
    --seed S            Base RNG seed
"#
                );
                return;
            }
            "--config" => {
                config_path = Some(flag_value(args, i, "--config").to_string());
                i += 2;
            }
            "--graphs" => {
                graphs = Some(PathBuf::from(flag_value(args, i, "--graphs")));
                i += 2;
            }
            "--weights" => {
                weights = Some(PathBuf::from(flag_value(args, i, "--weights")));
                i += 2;
            }
            "--infer" => {
                infer = Some(flag_value(args, i, "--infer").to_string());
                i += 2;
            }
            "--out" => {
                out = Some(PathBuf::from(flag_value(args, i, "--out")));
                i += 2;
            }
            "--attempts" => {
                attempts = Some(parse_flag(args, i, "--attempts"));
                i += 2;
            }
            "--max-batch" => {
                max_batch = Some(parse_flag(args, i, "--max-batch"));
                i += 2;
            }
            "--seed" => {
                seed = Some(parse_flag(args, i, "--seed"));
                i += 2;
            }
            "--sequential" => {
                sequential = true;
                i += 1;
            }
            "--raw" => {
                raw = true;
                i += 1;
            }
            "--history" => {
                history = true;
                i += 1;
            }
            other => {
                eprintln!("Unknown option for `mceval eval`: {}", other);
                eprintln!("Run `mceval eval --help` for usage.");
                process::exit(1);
            }
        }
    }

    let config_path = config_path.unwrap_or_else(|| fail("Missing --config"));
    if weights.is_some() && infer.is_some() {
        fail("--weights and --infer are mutually exclusive");
    }

    let mut cfg = load_config(&config_path);
    if let Some(n) = attempts {
        cfg.eval.n_attempts = n;
    }
    if max_batch.is_some() {
        cfg.eval.max_batch_size = max_batch;
    }
    if let Some(s) = seed {
        cfg.eval.seed = s;
    }
    if sequential {
        cfg.eval.batched = false;
    }
    cfg.eval.return_raw |= raw;
    cfg.eval.return_history |= history;
    if let Some(w) = weights {
        cfg.inference.backend = InferenceBackend::Local;
        cfg.inference.weights = Some(w);
    }
    if let Some(ep) = infer {
        cfg.inference.backend = InferenceBackend::Remote;
        cfg.inference.endpoint = Some(ep);
    }

    let graphs_path = graphs
        .or_else(|| cfg.paths.graphs.clone())
        .unwrap_or_else(|| fail("Missing --graphs (and no paths.graphs in config)"));
    let corpus = load_corpus(&graphs_path);
    println!("{corpus}");

    let (network, device) = build_network(&cfg.inference);
    let opts = EvalOptions::from_config(&cfg.eval, device);

    let config_bytes = std::fs::read(&config_path)
        .unwrap_or_else(|e| fail(format!("Failed to read config file: {e}")));
    let config_hash = mc_logging::hash_config_bytes(&config_bytes);
    let created_ts_ms = mc_logging::now_ms();
    let run_id = mc_logging::make_run_id(created_ts_ms, Some(&config_hash));

    let out = out
        .or_else(|| cfg.paths.out_dir.clone())
        .unwrap_or_else(|| PathBuf::from("runs").join(&run_id));
    std::fs::create_dir_all(&out)
        .unwrap_or_else(|e| fail(format!("Failed to create output dir: {e}")));

    let run_json = out.join("run.json");
    let mut manifest = RunManifestV1 {
        run_manifest_version: mc_logging::RUN_MANIFEST_VERSION,
        run_id: run_id.clone(),
        created_ts_ms,
        finished_ts_ms: None,
        protocol_version: mc_infer::protocol::PROTOCOL_VERSION,
        feature_schema_id: mc_features::FEATURE_SCHEMA_ID,
        git_hash: mc_logging::try_git_hash(),
        config_hash: Some(config_hash),
        seed: opts.seed,
        graphs_path: graphs_path.display().to_string(),
        n_graphs: corpus.len() as u64,
        network: network.describe(),
        n_attempts: effective_attempts(&cfg.env, opts.n_attempts) as u64,
        batched: opts.batched,
        events_path: EVENTS_FILE.to_string(),
        summary_path: SUMMARY_FILE.to_string(),
        raw_path: opts.return_raw.then(|| RAW_FILE.to_string()),
        history_path: opts.return_history.then(|| HISTORY_FILE.to_string()),
        graphs_completed: 0,
        completed: false,
    };
    mc_logging::write_manifest_atomic(&run_json, &manifest)
        .unwrap_or_else(|e| fail(format!("Failed to write run manifest: {e}")));

    let events = NdjsonWriter::open_append_with_flush(
        out.join(EVENTS_FILE),
        cfg.logging.flush_every_lines,
    )
    .unwrap_or_else(|e| fail(format!("Failed to open event log: {e}")));
    let mut log = EventLog {
        console: StdoutProgress,
        events,
        run_id,
        graphs_completed: 0,
        error: None,
    };

    let result = mc_eval::evaluate_network(
        network.as_ref(),
        &cfg.env,
        &corpus.graphs,
        &opts,
        &mut log,
    );
    let flushed = log.events.flush();
    log.keep(flushed);
    manifest.graphs_completed = log.graphs_completed;

    let tables = match result {
        Ok(t) => t,
        Err(e) => {
            // Best effort: the manifest still records how far the run got.
            let _ = mc_logging::write_manifest_atomic(&run_json, &manifest);
            fail(format!("Evaluation failed: {e}"));
        }
    };
    if let Some(e) = log.error.take() {
        fail(format!("Failed to write event log: {e}"));
    }

    mc_logging::write_rows_ndjson(out.join(SUMMARY_FILE), &tables.summary)
        .unwrap_or_else(|e| fail(format!("Failed to write summary table: {e}")));
    if let Some(rows) = &tables.raw {
        mc_logging::write_rows_ndjson(out.join(RAW_FILE), rows)
            .unwrap_or_else(|e| fail(format!("Failed to write raw table: {e}")));
    }
    if let Some(rows) = &tables.history {
        mc_logging::write_rows_ndjson(out.join(HISTORY_FILE), rows)
            .unwrap_or_else(|e| fail(format!("Failed to write history table: {e}")));
    }

    manifest.completed = true;
    manifest.finished_ts_ms = Some(mc_logging::now_ms());
    mc_logging::write_manifest_atomic(&run_json, &manifest)
        .unwrap_or_else(|e| fail(format!("Failed to write run manifest: {e}")));

    println!(
        "Evaluation complete. graphs={} out={}",
        tables.summary.len(),
        out.display()
    );
}

fn cmd_greedy(args: &[String]) {
    let mut graphs: Option<PathBuf> = None;
    let mut config_path: Option<String> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mceval greedy

USAGE:
    mceval greedy --graphs graphs.json [--config cfg.yaml]

OPTIONS:
    --graphs PATH    Graph collection (.json or .safetensors)
    --config PATH    YAML config for environment options (default: built-in defaults)
"#
                );
                return;
            }
            "--graphs" => {
                graphs = Some(PathBuf::from(flag_value(args, i, "--graphs")));
                i += 2;
            }
            "--config" => {
                config_path = Some(flag_value(args, i, "--config").to_string());
                i += 2;
            }
            other => {
                eprintln!("Unknown option for `mceval greedy`: {}", other);
                eprintln!("Run `mceval greedy --help` for usage.");
                process::exit(1);
            }
        }
    }

    let cfg = config_path.as_deref().map(load_config).unwrap_or_default();
    let graphs_path = graphs
        .or_else(|| cfg.paths.graphs.clone())
        .unwrap_or_else(|| fail("Missing --graphs"));
    let corpus = load_corpus(&graphs_path);
    println!("{corpus}");

    let mut total = 0.0f64;
    for (i, g) in corpus.iter().enumerate() {
        let template = make(
            SystemKind::VertexSystem,
            &SingleGraphGenerator::new(g.clone()),
            step_budget(g.n(), cfg.eval.step_factor),
            cfg.env,
        )
        .unwrap_or_else(|e| fail(format!("graph {i}: {e}")));
        let outcome = GreedyBaselineRunner::new(&template)
            .fixed_init()
            .unwrap_or_else(|e| fail(format!("graph {i}: {e}")));
        println!(
            "graph {i}: n={} greedy_fixed={:.3} flips={}",
            g.n(),
            outcome.cut,
            outcome.flips
        );
        total += outcome.cut;
    }
    if !corpus.is_empty() {
        println!("mean greedy cut: {:.4}", total / corpus.len() as f64);
    }
}

fn cmd_graphs(args: &[String]) {
    let mut graphs: Option<PathBuf> = None;
    let mut instances: Option<PathBuf> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mceval graphs

USAGE:
    mceval graphs --graphs graphs.json
    mceval graphs --instances DIR

OPTIONS:
    --graphs PATH      Graph collection (.json or .safetensors)
    --instances DIR    Benchmark directory with instances/, bkvl/ and bksol/
"#
                );
                return;
            }
            "--graphs" => {
                graphs = Some(PathBuf::from(flag_value(args, i, "--graphs")));
                i += 2;
            }
            "--instances" => {
                instances = Some(PathBuf::from(flag_value(args, i, "--instances")));
                i += 2;
            }
            other => {
                eprintln!("Unknown option for `mceval graphs`: {}", other);
                eprintln!("Run `mceval graphs --help` for usage.");
                process::exit(1);
            }
        }
    }

    match (graphs, instances) {
        (Some(path), None) => {
            let corpus = load_corpus(&path);
            println!("{corpus}");
            for (i, g) in corpus.iter().enumerate() {
                println!("graph {i}: n={} edges={}", g.n(), g.edge_count());
            }
        }
        (None, Some(dir)) => {
            let names = mc_graphs::list_instances(&dir)
                .unwrap_or_else(|e| fail(format!("Failed to list {}: {e}", dir.display())));
            for name in names {
                let inst = mc_graphs::load_graph(&dir, &name)
                    .unwrap_or_else(|e| fail(format!("Failed to load {name}: {e}")));
                let best = inst
                    .best_known_value
                    .map(|v| format!("{v}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}: n={} edges={} best_known={}",
                    inst.name, inst.n_vertices, inst.n_edges, best
                );
            }
        }
        (Some(_), Some(_)) => fail("--graphs and --instances are mutually exclusive"),
        (None, None) => fail("Missing --graphs or --instances"),
    }
}

fn cmd_weights_init(args: &[String]) {
    let mut out: Option<PathBuf> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mceval weights-init

USAGE:
    mceval weights-init --out linear.safetensors

Writes linear weights that score each vertex by its immediate cut gain.
"#
                );
                return;
            }
            "--out" => {
                out = Some(PathBuf::from(flag_value(args, i, "--out")));
                i += 2;
            }
            other => {
                eprintln!("Unknown option for `mceval weights-init`: {}", other);
                eprintln!("Run `mceval weights-init --help` for usage.");
                process::exit(1);
            }
        }
    }

    let out = out.unwrap_or_else(|| fail("Missing --out"));
    let net = LinearValueNet::immediate_reward();
    net.save(&out)
        .unwrap_or_else(|e| fail(format!("Failed to write weights: {e}")));
    println!("Wrote {} to {}", net.describe(), out.display());
}

fn print_help() {
    eprintln!(
        r#"mceval - max-cut value network evaluation

USAGE:
    mceval <COMMAND> [OPTIONS]

COMMANDS:
    eval            Evaluate a value network against the greedy baseline
    greedy          Run the fixed-init greedy baseline only
    graphs          Print vertex and edge counts of a graph collection
    weights-init    Write immediate-reward linear weights

OPTIONS:
    -h, --help      Print this help message
    -V, --version   Print version

Run `mceval <COMMAND> --help` for command options.
"#
    );
}

fn print_version() {
    println!("mceval {}", env!("CARGO_PKG_VERSION"));
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        process::exit(0);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => {
            print_help();
        }
        "-V" | "--version" => {
            print_version();
        }
        "eval" => {
            cmd_eval(&args[2..]);
        }
        "greedy" => {
            cmd_greedy(&args[2..]);
        }
        "graphs" => {
            cmd_graphs(&args[2..]);
        }
        "weights-init" => {
            cmd_weights_init(&args[2..]);
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            eprintln!("Run `mceval --help` for usage.");
            process::exit(1);
        }
    }
}
