use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bytemuck::cast_slice;
use mc_core::{AdjacencyMatrix, GraphError};
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{tensor_name, META_COUNT, TENSOR_PREFIX};

#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("safetensors: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
    #[error("unsupported graph collection format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("graph {index}: {source}")]
    Matrix {
        index: usize,
        #[source]
        source: GraphError,
    },
    #[error("graph {index}: invalid sparse matrix: {msg}")]
    Sparse { index: usize, msg: String },
    #[error("graph {index}: edge ({u}, {v}) out of range for {n} vertices")]
    EdgeOutOfRange {
        index: usize,
        u: usize,
        v: usize,
        n: usize,
    },
    #[error("tensor {name}: unsupported dtype {dtype}")]
    BadDtype { name: String, dtype: String },
    #[error("tensor {name}: expected a square rank-2 tensor, got shape {shape:?}")]
    BadShape { name: String, shape: Vec<usize> },
    #[error("collection declares {declared} graphs but holds {found}")]
    CountMismatch { declared: usize, found: usize },
    #[error("{}:{line}: {msg}", path.display())]
    Instance {
        path: PathBuf,
        line: usize,
        msg: String,
    },
}

fn default_weight() -> f64 {
    1.0
}

/// One weighted edge of a graph object.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct StoredEdge {
    pub u: usize,
    pub v: usize,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// A graph as persisted. Every variant normalizes to one dense matrix.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredGraph {
    /// Nested rows.
    Dense { matrix: Vec<Vec<f64>> },
    /// Compressed sparse rows.
    Sparse {
        n: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    },
    /// Vertex count + undirected edge list.
    Graph {
        n_vertices: usize,
        edges: Vec<StoredEdge>,
    },
}

impl StoredGraph {
    /// Normalize to a dense matrix. `index` is only used for error context.
    pub fn to_dense(&self, index: usize) -> Result<AdjacencyMatrix, GraphLoadError> {
        match self {
            StoredGraph::Dense { matrix } => AdjacencyMatrix::from_rows(matrix)
                .map_err(|source| GraphLoadError::Matrix { index, source }),
            StoredGraph::Sparse {
                n,
                indptr,
                indices,
                data,
            } => csr_to_dense(index, *n, indptr, indices, data),
            StoredGraph::Graph { n_vertices, edges } => {
                let n = *n_vertices;
                let mut m = AdjacencyMatrix::try_zeros(n)
                    .map_err(|source| GraphLoadError::Matrix { index, source })?;
                for e in edges {
                    if e.u >= n || e.v >= n {
                        return Err(GraphLoadError::EdgeOutOfRange {
                            index,
                            u: e.u,
                            v: e.v,
                            n,
                        });
                    }
                    if !e.weight.is_finite() {
                        return Err(GraphLoadError::Matrix {
                            index,
                            source: GraphError::NonFinite { i: e.u, j: e.v },
                        });
                    }
                    m.set_symmetric(e.u, e.v, e.weight);
                }
                Ok(m)
            }
        }
    }
}

impl From<&AdjacencyMatrix> for StoredGraph {
    fn from(m: &AdjacencyMatrix) -> Self {
        StoredGraph::Dense { matrix: m.rows() }
    }
}

fn csr_to_dense(
    index: usize,
    n: usize,
    indptr: &[usize],
    indices: &[usize],
    data: &[f64],
) -> Result<AdjacencyMatrix, GraphLoadError> {
    let bad = |msg: String| GraphLoadError::Sparse { index, msg };
    let len = AdjacencyMatrix::entry_count(n)
        .map_err(|source| GraphLoadError::Matrix { index, source })?;
    if indptr.len() != n + 1 {
        return Err(bad(format!(
            "indptr has {} entries, expected {}",
            indptr.len(),
            n + 1
        )));
    }
    if indices.len() != data.len() {
        return Err(bad(format!(
            "indices ({}) and data ({}) lengths differ",
            indices.len(),
            data.len()
        )));
    }
    if indptr[0] != 0 || indptr[n] != indices.len() {
        return Err(bad("indptr must start at 0 and end at nnz".to_string()));
    }
    let mut out = vec![0.0f64; len];
    for row in 0..n {
        let (lo, hi) = (indptr[row], indptr[row + 1]);
        if lo > hi {
            return Err(bad(format!("indptr decreases at row {row}")));
        }
        for k in lo..hi {
            let col = indices[k];
            if col >= n {
                return Err(bad(format!("column {col} out of range in row {row}")));
            }
            // Duplicate entries are summed, as scipy does.
            out[row * n + col] += data[k];
        }
    }
    AdjacencyMatrix::from_row_major(n, out).map_err(|source| GraphLoadError::Matrix { index, source })
}

/// An ordered, fully validated graph collection.
#[derive(Debug, Clone)]
pub struct GraphCorpus {
    pub source: PathBuf,
    pub graphs: Vec<AdjacencyMatrix>,
}

impl GraphCorpus {
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AdjacencyMatrix> {
        self.graphs.iter()
    }

    pub fn into_matrices(self) -> Vec<AdjacencyMatrix> {
        self.graphs
    }
}

impl fmt::Display for GraphCorpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} target graphs loaded from {}",
            self.graphs.len(),
            self.source.display()
        )
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Load a graph collection. The format is chosen by file extension.
///
/// Nothing is returned unless every graph in the file is valid.
pub fn load_graph_set(path: impl AsRef<Path>) -> Result<GraphCorpus, GraphLoadError> {
    let path = path.as_ref();
    let graphs = match extension(path) {
        Some("json") => load_json(path)?,
        Some("safetensors") => load_safetensors(path)?,
        _ => return Err(GraphLoadError::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(GraphCorpus {
        source: path.to_path_buf(),
        graphs,
    })
}

fn load_json(path: &Path) -> Result<Vec<AdjacencyMatrix>, GraphLoadError> {
    let bytes = fs::read(path)?;
    let stored: Vec<StoredGraph> = serde_json::from_slice(&bytes)?;
    stored
        .iter()
        .enumerate()
        .map(|(i, g)| g.to_dense(i))
        .collect()
}

fn load_safetensors(path: &Path) -> Result<Vec<AdjacencyMatrix>, GraphLoadError> {
    let bytes = fs::read(path)?;
    let (_, meta) = SafeTensors::read_metadata(&bytes)?;
    let declared = meta
        .metadata()
        .as_ref()
        .and_then(|m| m.get(META_COUNT))
        .and_then(|s| s.parse::<usize>().ok());

    let st = SafeTensors::deserialize(&bytes)?;
    let mut names: Vec<&String> = st
        .names()
        .into_iter()
        .filter(|n| n.starts_with(TENSOR_PREFIX))
        .collect();
    names.sort();

    if let Some(declared) = declared {
        if declared != names.len() {
            return Err(GraphLoadError::CountMismatch {
                declared,
                found: names.len(),
            });
        }
    }

    let mut out = Vec::with_capacity(names.len());
    for (index, name) in names.into_iter().enumerate() {
        let view = st.tensor(name)?;
        let shape = view.shape().to_vec();
        if shape.len() != 2 || shape[0] != shape[1] {
            return Err(GraphLoadError::BadShape {
                name: name.clone(),
                shape,
            });
        }
        let n = shape[0];
        let data: Vec<f64> = match view.dtype() {
            Dtype::F64 => view
                .data()
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            Dtype::F32 => view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            other => {
                return Err(GraphLoadError::BadDtype {
                    name: name.clone(),
                    dtype: format!("{other:?}"),
                })
            }
        };
        let m = AdjacencyMatrix::from_row_major(n, data)
            .map_err(|source| GraphLoadError::Matrix { index, source })?;
        out.push(m);
    }
    Ok(out)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), GraphLoadError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Save graphs as a JSON array of tagged `dense` graphs.
pub fn save_graph_set_json(
    path: impl AsRef<Path>,
    graphs: &[AdjacencyMatrix],
) -> Result<(), GraphLoadError> {
    let stored: Vec<StoredGraph> = graphs.iter().map(StoredGraph::from).collect();
    let bytes = serde_json::to_vec(&stored)?;
    write_atomic(path.as_ref(), &bytes)
}

/// Save graphs as one F64 tensor per graph.
pub fn save_graph_set_safetensors(
    path: impl AsRef<Path>,
    graphs: &[AdjacencyMatrix],
) -> Result<(), GraphLoadError> {
    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    for (i, m) in graphs.iter().enumerate() {
        let n = m.n();
        tensors.insert(
            tensor_name(i),
            TensorView::new(Dtype::F64, vec![n, n], cast_slice(m.as_slice()))?,
        );
    }
    let mut info = HashMap::new();
    info.insert(META_COUNT.to_string(), graphs.len().to_string());
    let bytes = safetensors::serialize(&tensors, &Some(info))?;
    write_atomic(path.as_ref(), &bytes)
}
