//! Masked argmax over q-values.

use mc_core::{EnvOptions, VertexBasis};
use mc_features::schema::CH_STATE;

use crate::tensor::{Device, ObservationBatch, QValues};
use crate::{InferError, ValueNetwork};

/// Chooses one vertex per observation.
///
/// In the reversible variant every vertex is legal. In the irreversible variant only
/// vertices whose state channel still equals the basis' unflipped value are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSelector {
    reversible: bool,
    basis: VertexBasis,
}

impl ActionSelector {
    pub fn new(reversible: bool, basis: VertexBasis) -> Self {
        Self { reversible, basis }
    }

    pub fn from_options(options: &EnvOptions) -> Self {
        Self::new(options.reversible_vertices, options.vertex_basis)
    }

    pub fn is_reversible(&self) -> bool {
        self.reversible
    }

    /// Legality of every `(batch, vertex)` entry, row-major.
    pub fn legal_mask(&self, obs: &ObservationBatch) -> Vec<bool> {
        let (b, n, _) = obs.shape();
        if self.reversible {
            return vec![true; b * n];
        }
        let sentinel = self.basis.unflipped() as f32;
        (0..b)
            .flat_map(|row| (0..n).map(move |v| (row, v)))
            .map(|(row, v)| obs.feature(row, v, CH_STATE) == sentinel)
            .collect()
    }

    /// One action per batch row, each in `[0, vertices)`.
    ///
    /// A row with no legal entry falls back to its unmasked argmax.
    pub fn select(&self, obs: &ObservationBatch, q: &QValues) -> Result<Vec<usize>, InferError> {
        let (b, n, _) = obs.shape();
        if q.shape() != (b, n) {
            return Err(InferError::Shape(format!(
                "q-values {:?} do not match observations ({b}, {n})",
                q.shape()
            )));
        }
        if !q.device().is_host() {
            return Err(InferError::DeviceMismatch {
                got: q.device(),
                expected: Device::Cpu,
            });
        }
        let mask = self.legal_mask(obs);
        Ok((0..b)
            .map(|row| {
                let legal = &mask[row * n..(row + 1) * n];
                argmax_tie_lowest(q.row(row), Some(legal))
                    .or_else(|| argmax_tie_lowest(q.row(row), None))
                    .unwrap_or(0)
            })
            .collect())
    }

    /// Place `obs` on `device`, run one forward pass, read back, select.
    pub fn predict<N: ValueNetwork + ?Sized>(
        &self,
        network: &N,
        obs: ObservationBatch,
        device: Device,
    ) -> Result<Vec<usize>, InferError> {
        let obs = obs.to_device(device);
        let q = network.predict(&obs)?.to_host();
        self.select(&obs, &q)
    }
}

/// Index of the largest value among allowed entries; lowest index on ties. NaN never wins.
fn argmax_tie_lowest(values: &[f32], allowed: Option<&[bool]>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if let Some(mask) = allowed {
            if !mask[i] {
                continue;
            }
        }
        match best {
            Some((_, bv)) if !(v > bv) => {}
            _ if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i).or_else(|| {
        // All allowed entries were NaN.
        allowed.map_or(Some(0), |m| m.iter().position(|&ok| ok))
    })
}
