//! In-process linear value network over the observation channels.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use bytemuck::cast_slice;
use mc_features::schema::CH_IMMEDIATE_REWARD;
use mc_features::F;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};

use crate::tensor::{Device, ObservationBatch, QValues};
use crate::{InferError, ValueNetwork};

const WEIGHT: &str = "weight";
const BIAS: &str = "bias";

/// `q[b, v] = sum_c weight[c] * obs[b, v, c] + bias`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearValueNet {
    weight: [f32; F],
    bias: f32,
}

impl LinearValueNet {
    pub fn new(weight: [f32; F], bias: f32) -> Self {
        Self { weight, bias }
    }

    /// Scores each vertex by its immediate cut gain, which makes the argmax a greedy step.
    pub fn immediate_reward() -> Self {
        let mut weight = [0.0f32; F];
        weight[CH_IMMEDIATE_REWARD] = 1.0;
        Self { weight, bias: 0.0 }
    }

    pub fn weight(&self) -> &[f32; F] {
        &self.weight
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferError> {
        let bytes = fs::read(path)?;
        let st = SafeTensors::deserialize(&bytes)?;
        let w = read_f32_tensor(&st, WEIGHT, F)?;
        let b = read_f32_tensor(&st, BIAS, 1)?;
        let mut weight = [0.0f32; F];
        weight.copy_from_slice(&w);
        Ok(Self { weight, bias: b[0] })
    }

    /// Write weights to `path` via temp file + rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), InferError> {
        let path = path.as_ref();
        let bias = [self.bias];
        let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
        tensors.insert(
            WEIGHT.to_string(),
            TensorView::new(Dtype::F32, vec![F], cast_slice(&self.weight))?,
        );
        tensors.insert(
            BIAS.to_string(),
            TensorView::new(Dtype::F32, vec![1], cast_slice(&bias))?,
        );
        let mut info = HashMap::new();
        info.insert(
            "feature_schema_id".to_string(),
            mc_features::FEATURE_SCHEMA_ID.to_string(),
        );
        let bytes = safetensors::serialize(&tensors, &Some(info))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn read_f32_tensor(st: &SafeTensors<'_>, name: &str, len: usize) -> Result<Vec<f32>, InferError> {
    let view = st.tensor(name)?;
    if view.dtype() != Dtype::F32 {
        return Err(InferError::Weights(format!(
            "{name}: expected F32, got {:?}",
            view.dtype()
        )));
    }
    if view.shape() != [len].as_slice() {
        return Err(InferError::Weights(format!(
            "{name}: expected shape [{len}], got {:?}",
            view.shape()
        )));
    }
    Ok(view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl ValueNetwork for LinearValueNet {
    fn predict(&self, batch: &ObservationBatch) -> Result<QValues, InferError> {
        if batch.device() != Device::Cpu {
            return Err(InferError::DeviceMismatch {
                got: batch.device(),
                expected: Device::Cpu,
            });
        }
        let q: Vec<f32> = batch
            .as_slice()
            .chunks_exact(F)
            .map(|x| {
                x.iter()
                    .zip(&self.weight)
                    .map(|(a, w)| a * w)
                    .sum::<f32>()
                    + self.bias
            })
            .collect();
        QValues::new(batch.batch(), batch.n_vertices(), q, Device::Cpu)
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn describe(&self) -> String {
        format!("linear(weight={:?}, bias={})", self.weight, self.bias)
    }
}
