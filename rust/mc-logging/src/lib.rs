//! mc-logging: NDJSON events, table export and the run manifest.
//!
//! Append-only NDJSON logs for post-mortems of evaluation runs.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run manifest schema version.
pub const RUN_MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifestV1 {
    pub run_manifest_version: u32,

    pub run_id: String,
    pub created_ts_ms: u64,
    pub finished_ts_ms: Option<u64>,

    pub protocol_version: u32,
    pub feature_schema_id: u32,

    // Reproducibility.
    pub git_hash: Option<String>,
    pub config_hash: Option<String>,
    pub seed: u64,

    // Inputs.
    pub graphs_path: String,
    pub n_graphs: u64,
    pub network: String,
    pub n_attempts: u64,
    pub batched: bool,

    // Outputs.
    pub events_path: String,
    pub summary_path: String,
    pub raw_path: Option<String>,
    pub history_path: Option<String>,

    pub graphs_completed: u64,
    pub completed: bool,
}

pub fn now_ms() -> u64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_millis() as u64
}

pub fn hash_config_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// `eval-<ms>-<hash prefix>`; unique per start time and config.
pub fn make_run_id(ts_ms: u64, config_hash: Option<&str>) -> String {
    match config_hash {
        Some(h) => format!("eval-{ts_ms}-{}", h.chars().take(8).collect::<String>()),
        None => format!("eval-{ts_ms}"),
    }
}

pub fn try_git_hash() -> Option<String> {
    use std::process::Command;

    let out = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8(out.stdout).ok()?;
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<RunManifestV1, NdjsonError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<RunManifestV1>(&bytes)?)
}

pub fn write_manifest_atomic(path: impl AsRef<Path>, m: &RunManifestV1) -> Result<(), NdjsonError> {
    let path = path.as_ref();
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(m)?;
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfoV1 {
    pub protocol_version: u32,
    pub feature_schema_id: u32,
}

/// One per graph, after all its attempts.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummaryEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub v: VersionInfoV1,
    pub run_id: String,

    pub graph: u64,
    pub n_vertices: u64,
    pub attempts: u64,
    pub best_cut: Option<f64>,
    pub mean_cut: Option<f64>,
    pub greedy_fixed_cut: f64,
    pub greedy_random_cut: Option<f64>,
    pub greedy_random_mean_cut: Option<f64>,
    pub mean_attempt_s: Option<f64>,
}

/// One per scheduler sub-batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub run_id: String,

    pub graph: u64,
    pub batch: u64,
    pub size: u64,
    pub rounds: u64,
    pub env_steps: u64,
    pub seconds: f64,
}

pub const EVENT_GRAPH_SUMMARY: &str = "graph_summary";
pub const EVENT_BATCH: &str = "batch";

#[derive(Debug, Error)]
pub enum NdjsonError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only NDJSON writer.
///
/// Contract: each call writes exactly one JSON object followed by a newline.
pub struct NdjsonWriter {
    w: BufWriter<File>,
    lines_since_flush: u64,
    flush_every_lines: u64,
}

impl NdjsonWriter {
    /// Open a file for append. Creates it if it doesn't exist.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, NdjsonError> {
        Self::open_append_with_flush(path, 0)
    }

    /// `flush_every_lines=0` disables periodic flushing.
    pub fn open_append_with_flush(
        path: impl AsRef<Path>,
        flush_every_lines: u64,
    ) -> Result<Self, NdjsonError> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            w: BufWriter::new(f),
            lines_since_flush: 0,
            flush_every_lines,
        })
    }

    pub fn write_event<T: Serialize>(&mut self, event: &T) -> Result<(), NdjsonError> {
        let mut buf = serde_json::to_vec(event)?;
        buf.push(b'\n');
        self.w.write_all(&buf)?;
        self.lines_since_flush += 1;
        if self.flush_every_lines > 0 && self.lines_since_flush >= self.flush_every_lines {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), NdjsonError> {
        self.w.flush()?;
        self.lines_since_flush = 0;
        Ok(())
    }
}

/// Write `rows` to a fresh file, one object per line, via temp file + rename.
pub fn write_rows_ndjson<T: Serialize>(
    path: impl AsRef<Path>,
    rows: &[T],
) -> Result<(), NdjsonError> {
    let path = path.as_ref();
    let tmp = path.with_extension("ndjson.tmp");
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        for row in rows {
            serde_json::to_writer(&mut w, row)?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use serde_json::Value;

    fn read_ndjson_lenient(path: &Path) -> Vec<Value> {
        let s = fs::read_to_string(path).expect("read");
        s.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str::<Value>(l).ok())
            .collect()
    }

    fn manifest() -> RunManifestV1 {
        RunManifestV1 {
            run_manifest_version: RUN_MANIFEST_VERSION,
            run_id: "r".to_string(),
            created_ts_ms: now_ms(),
            finished_ts_ms: None,
            protocol_version: 1,
            feature_schema_id: 1,
            git_hash: None,
            config_hash: Some("abc".to_string()),
            seed: 0,
            graphs_path: "graphs.json".to_string(),
            n_graphs: 3,
            network: "linear".to_string(),
            n_attempts: 50,
            batched: true,
            events_path: "events.ndjson".to_string(),
            summary_path: "summary.ndjson".to_string(),
            raw_path: None,
            history_path: None,
            graphs_completed: 0,
            completed: false,
        }
    }

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn writes_one_valid_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let mut w = NdjsonWriter::open_append_with_flush(&path, 1).unwrap();

        let ev = BatchEventV1 {
            event: EVENT_BATCH,
            ts_ms: 1,
            run_id: "r".to_string(),
            graph: 0,
            batch: 2,
            size: 16,
            rounds: 40,
            env_steps: 640,
            seconds: 0.25,
        };
        w.write_event(&ev).unwrap();
        w.write_event(&BatchEventV1 { batch: 3, ..ev }).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        let vals = read_ndjson_lenient(&path);
        assert_eq!(vals[0]["event"], "batch");
        assert_eq!(vals[0]["batch"], 2);
        assert_eq!(vals[1]["batch"], 3);
    }

    #[test]
    fn lenient_reader_tolerates_trailing_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        {
            let mut w = NdjsonWriter::open_append(&path).unwrap();
            #[derive(Serialize)]
            struct E {
                event: &'static str,
                x: u32,
            }
            w.write_event(&E { event: "e", x: 1 }).unwrap();
            w.flush().unwrap();
        }

        // Simulate a crash mid-line.
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(br#"{"event":"e","x":"#).unwrap();
        f.flush().unwrap();

        let vals = read_ndjson_lenient(&path);
        assert_eq!(vals.len(), 1);
        assert_eq!(vals[0]["x"], 1);
    }

    #[test]
    fn rows_export_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.ndjson");
        #[derive(Serialize)]
        struct Row {
            graph: usize,
            cut: Option<f64>,
        }
        write_rows_ndjson(&path, &[Row { graph: 0, cut: Some(1.5) }, Row { graph: 1, cut: None }])
            .unwrap();
        write_rows_ndjson(&path, &[Row { graph: 7, cut: None }]).unwrap();
        let vals = read_ndjson_lenient(&path);
        assert_eq!(vals.len(), 1);
        assert_eq!(vals[0]["graph"], 7);
        assert!(vals[0]["cut"].is_null());
    }

    #[test]
    fn manifest_write_is_atomic_wrt_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let run_json = dir.path().join("run.json");

        let mut m = manifest();
        write_manifest_atomic(&run_json, &m).unwrap();

        // A corrupt leftover tmp file must not affect run.json.
        fs::write(run_json.with_extension("json.tmp"), b"{not valid json").unwrap();
        assert_eq!(read_manifest(&run_json).unwrap(), m);

        m.graphs_completed = 3;
        m.completed = true;
        write_manifest_atomic(&run_json, &m).unwrap();
        let got = read_manifest(&run_json).unwrap();
        assert!(got.completed);
        assert_eq!(got.graphs_completed, 3);
    }

    #[test]
    fn run_id_and_hash_are_stable() {
        let h = hash_config_bytes(b"eval: {}");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_config_bytes(b"eval: {}"));
        assert_eq!(make_run_id(5, Some(&h)), format!("eval-5-{}", &h[..8]));
        assert_eq!(make_run_id(5, None), "eval-5");
    }

    #[test]
    fn manifest_read_errors_keep_their_cause() {
        use std::error::Error as _;

        let dir = tempfile::tempdir().unwrap();
        let missing = read_manifest(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, NdjsonError::Io(_)));
        assert!(missing.to_string().starts_with("io error: "));
        assert!(missing.source().is_some());

        let bad = dir.path().join("run.json");
        fs::write(&bad, b"{not json").unwrap();
        let err = read_manifest(&bad).unwrap_err();
        assert!(matches!(err, NdjsonError::Json(_)));
        assert!(err.to_string().starts_with("json error: "));
        assert!(err.source().is_some());
    }
}
