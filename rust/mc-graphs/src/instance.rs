//! Benchmark instances laid out as `instances/NAME.mc`, `bkvl/NAME.bkvl`, `bksol/NAME.bksol`.

use std::fs;
use std::path::{Path, PathBuf};

use mc_core::{AdjacencyMatrix, GraphInstance};

use crate::store::GraphLoadError;

fn instance_err(path: &Path, line: usize, msg: impl Into<String>) -> GraphLoadError {
    GraphLoadError::Instance {
        path: path.to_path_buf(),
        line,
        msg: msg.into(),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, GraphLoadError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Load one named instance from `dir`.
///
/// The `.mc` file is required; best-known value and solution files are optional. Vertex
/// indices in the `.mc` file are 1-based.
pub fn load_graph(dir: impl AsRef<Path>, name: &str) -> Result<GraphInstance, GraphLoadError> {
    let dir = dir.as_ref();
    let inst_path = dir.join("instances").join(format!("{name}.mc"));
    let text = fs::read_to_string(&inst_path)?;
    let (matrix, n_edges) = parse_mc(&inst_path, &text)?;

    let val_path = dir.join("bkvl").join(format!("{name}.bkvl"));
    let best_known_value = match read_optional(&val_path)? {
        None => None,
        Some(s) => {
            let first = s.lines().next().unwrap_or("").trim();
            let v = first
                .parse::<f64>()
                .map_err(|e| instance_err(&val_path, 1, format!("bad value {first:?}: {e}")))?;
            Some(v)
        }
    };

    let sol_path = dir.join("bksol").join(format!("{name}.bksol"));
    let best_known_solution = match read_optional(&sol_path)? {
        None => None,
        Some(s) => Some(parse_bitstring(&sol_path, &s)?),
    };

    Ok(GraphInstance {
        name: name.to_string(),
        n_vertices: matrix.n(),
        n_edges,
        matrix,
        best_known_value,
        best_known_solution,
    })
}

fn parse_mc(path: &Path, text: &str) -> Result<(AdjacencyMatrix, usize), GraphLoadError> {
    let mut header: Option<(usize, usize)> = None;
    let mut matrix = AdjacencyMatrix::zeros(0);
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match (header, fields.len()) {
            (None, 2) => {
                let n = parse_usize(path, line_no, fields[0])?;
                let m = parse_usize(path, line_no, fields[1])?;
                matrix = AdjacencyMatrix::try_zeros(n)
                    .map_err(|e| instance_err(path, line_no, e.to_string()))?;
                header = Some((n, m));
            }
            (None, _) => {
                return Err(instance_err(
                    path,
                    line_no,
                    "first line must be `n_vertices n_edges`",
                ))
            }
            (Some((n, _)), 3) => {
                let i = parse_usize(path, line_no, fields[0])?;
                let j = parse_usize(path, line_no, fields[1])?;
                let w = fields[2].parse::<f64>().map_err(|e| {
                    instance_err(path, line_no, format!("bad weight {:?}: {e}", fields[2]))
                })?;
                if i == 0 || j == 0 || i > n || j > n {
                    return Err(instance_err(
                        path,
                        line_no,
                        format!("edge ({i}, {j}) out of range 1..={n}"),
                    ));
                }
                if !w.is_finite() {
                    return Err(instance_err(path, line_no, "non-finite weight"));
                }
                matrix.set_symmetric(i - 1, j - 1, w);
            }
            (Some(_), k) => {
                return Err(instance_err(
                    path,
                    line_no,
                    format!("expected `i j w`, got {k} fields"),
                ))
            }
        }
    }
    match header {
        Some((_, m)) => Ok((matrix, m)),
        None => Err(instance_err(path, 0, "empty instance file")),
    }
}

fn parse_usize(path: &Path, line: usize, s: &str) -> Result<usize, GraphLoadError> {
    s.parse::<usize>()
        .map_err(|e| instance_err(path, line, format!("bad integer {s:?}: {e}")))
}

fn parse_bitstring(path: &Path, s: &str) -> Result<Vec<u8>, GraphLoadError> {
    let first = s.lines().next().unwrap_or("").trim();
    first
        .chars()
        .map(|c| match c {
            '0' => Ok(0),
            '1' => Ok(1),
            other => Err(instance_err(path, 1, format!("bad solution digit {other:?}"))),
        })
        .collect()
}

/// Instance names found under `dir/instances`, sorted.
pub fn list_instances(dir: impl AsRef<Path>) -> Result<Vec<String>, GraphLoadError> {
    let inst_dir: PathBuf = dir.as_ref().join("instances");
    let mut names = Vec::new();
    for entry in fs::read_dir(&inst_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("mc") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
