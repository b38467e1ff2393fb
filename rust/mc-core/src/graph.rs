//! Dense weighted graphs.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("matrix data has {got} entries, expected {expected} for n={n}")]
    BadLen { n: usize, got: usize, expected: usize },
    #[error("matrix row {row} has {got} entries, expected {expected}")]
    Ragged { row: usize, got: usize, expected: usize },
    #[error("non-finite weight at ({i}, {j})")]
    NonFinite { i: usize, j: usize },
    #[error("{n} vertices exceeds the limit of {max}")]
    TooLarge { n: usize, max: usize },
}

/// Largest vertex count a dense matrix may have (`n * n` f64 entries, 8 GiB at the limit).
pub const MAX_VERTICES: usize = 32_768;

/// Square, row-major adjacency matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMatrix {
    n: usize,
    data: Vec<f64>,
}

impl AdjacencyMatrix {
    /// All-zero matrix with `n` vertices. Panics above [`MAX_VERTICES`]; loaders use
    /// [`AdjacencyMatrix::try_zeros`].
    pub fn zeros(n: usize) -> Self {
        match Self::try_zeros(n) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_zeros(n: usize) -> Result<Self, GraphError> {
        let len = Self::entry_count(n)?;
        Ok(Self {
            n,
            data: vec![0.0; len],
        })
    }

    /// `n * n`, or `TooLarge` when `n` exceeds [`MAX_VERTICES`].
    pub fn entry_count(n: usize) -> Result<usize, GraphError> {
        if n > MAX_VERTICES {
            return Err(GraphError::TooLarge {
                n,
                max: MAX_VERTICES,
            });
        }
        n.checked_mul(n).ok_or(GraphError::TooLarge {
            n,
            max: MAX_VERTICES,
        })
    }

    pub fn from_row_major(n: usize, data: Vec<f64>) -> Result<Self, GraphError> {
        let expected = Self::entry_count(n)?;
        if data.len() != expected {
            return Err(GraphError::BadLen {
                n,
                got: data.len(),
                expected,
            });
        }
        if let Some(k) = data.iter().position(|w| !w.is_finite()) {
            return Err(GraphError::NonFinite { i: k / n, j: k % n });
        }
        Ok(Self { n, data })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, GraphError> {
        let n = rows.len();
        let mut data = Vec::with_capacity(Self::entry_count(n)?);
        for (row, r) in rows.iter().enumerate() {
            if r.len() != n {
                return Err(GraphError::Ragged {
                    row,
                    got: r.len(),
                    expected: n,
                });
            }
            data.extend_from_slice(r);
        }
        Self::from_row_major(n, data)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn set(&mut self, i: usize, j: usize, w: f64) {
        self.data[i * self.n + j] = w;
    }

    /// Set both `(i, j)` and `(j, i)`.
    pub fn set_symmetric(&mut self, i: usize, j: usize, w: f64) {
        self.set(i, j, w);
        self.set(j, i, w);
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks_exact(self.n.max(1)).map(|r| r.to_vec()).collect()
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.n).all(|i| (i + 1..self.n).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Number of non-zero entries strictly above the diagonal.
    pub fn edge_count(&self) -> usize {
        (0..self.n)
            .map(|i| self.row(i)[i + 1..].iter().filter(|&&w| w != 0.0).count())
            .sum()
    }

    /// Cut value of a signed assignment: `1/4 * sum_ij w_ij (1 - s_i s_j)`.
    pub fn cut_value(&self, spins: &[i8]) -> f64 {
        assert_eq!(spins.len(), self.n, "assignment length mismatch");
        let mut acc = 0.0;
        for i in 0..self.n {
            let si = spins[i] as f64;
            for (j, &w) in self.row(i).iter().enumerate() {
                if w != 0.0 {
                    acc += w * (1.0 - si * spins[j] as f64);
                }
            }
        }
        acc / 4.0
    }
}

/// A named benchmark graph with optional best-known solution data.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphInstance {
    pub name: String,
    pub n_vertices: usize,
    pub n_edges: usize,
    pub matrix: AdjacencyMatrix,
    pub best_known_value: Option<f64>,
    /// Best-known assignment as read from disk (one entry per character of the bitstring).
    pub best_known_solution: Option<Vec<u8>>,
}
