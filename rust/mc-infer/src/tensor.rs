//! Canonical rank-3 observation batches and rank-2 q-value tensors.

use std::fmt;
use std::str::FromStr;

use mc_features::{Observation, F};

use crate::InferError;

/// Where a tensor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
    Mps,
}

impl Device {
    /// Resolve a configured device name. `"default"` becomes `best`.
    pub fn resolve(name: &str, best: Device) -> Result<Device, InferError> {
        if name.eq_ignore_ascii_case("default") {
            return Ok(best);
        }
        name.parse()
    }

    pub fn is_host(self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl FromStr for Device {
    type Err = InferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "mps" => Ok(Device::Mps),
            "cuda" => Ok(Device::Cuda(0)),
            _ => match lower.strip_prefix("cuda:") {
                Some(idx) => idx
                    .parse::<u32>()
                    .map(Device::Cuda)
                    .map_err(|_| InferError::UnknownDevice(s.to_string())),
                None => Err(InferError::UnknownDevice(s.to_string())),
            },
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(i) => write!(f, "cuda:{i}"),
            Device::Mps => write!(f, "mps"),
        }
    }
}

/// `(batch, vertices, F)` observations, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationBatch {
    batch: usize,
    n_vertices: usize,
    data: Vec<f32>,
    device: Device,
}

impl ObservationBatch {
    /// Stack observations of one graph. The result lives on the host.
    pub fn from_observations<'a, I>(observations: I) -> Result<Self, InferError>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let mut iter = observations.into_iter().peekable();
        let n_vertices = match iter.peek() {
            Some(o) => o.n_vertices(),
            None => return Err(InferError::EmptyBatch),
        };
        let mut data = Vec::new();
        let mut batch = 0usize;
        for obs in iter {
            if obs.n_vertices() != n_vertices {
                return Err(InferError::Shape(format!(
                    "observation {batch} has {} vertices, expected {n_vertices}",
                    obs.n_vertices()
                )));
            }
            data.extend_from_slice(obs.as_slice());
            batch += 1;
        }
        Ok(Self {
            batch,
            n_vertices,
            data,
            device: Device::Cpu,
        })
    }

    /// A batch of one.
    pub fn single(observation: &Observation) -> Self {
        Self {
            batch: 1,
            n_vertices: observation.n_vertices(),
            data: observation.as_slice().to_vec(),
            device: Device::Cpu,
        }
    }

    pub fn from_raw(batch: usize, n_vertices: usize, data: Vec<f32>) -> Result<Self, InferError> {
        if batch == 0 {
            return Err(InferError::EmptyBatch);
        }
        if data.len() != batch * n_vertices * F {
            return Err(InferError::Shape(format!(
                "{} values for shape ({batch}, {n_vertices}, {F})",
                data.len()
            )));
        }
        Ok(Self {
            batch,
            n_vertices,
            data,
            device: Device::Cpu,
        })
    }

    /// Place the batch on `device`.
    pub fn to_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// `(batch, vertices, F)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.batch, self.n_vertices, F)
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// One observation, `vertices * F` values.
    pub fn row(&self, b: usize) -> &[f32] {
        let stride = self.n_vertices * F;
        &self.data[b * stride..(b + 1) * stride]
    }

    pub fn feature(&self, b: usize, v: usize, ch: usize) -> f32 {
        self.data[(b * self.n_vertices + v) * F + ch]
    }
}

/// `(batch, vertices)` network outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct QValues {
    batch: usize,
    n_vertices: usize,
    data: Vec<f32>,
    device: Device,
}

impl QValues {
    pub fn new(
        batch: usize,
        n_vertices: usize,
        data: Vec<f32>,
        device: Device,
    ) -> Result<Self, InferError> {
        if data.len() != batch * n_vertices {
            return Err(InferError::Shape(format!(
                "{} q-values for shape ({batch}, {n_vertices})",
                data.len()
            )));
        }
        Ok(Self {
            batch,
            n_vertices,
            data,
            device,
        })
    }

    /// Read the values back to the host.
    pub fn to_host(mut self) -> Self {
        self.device = Device::Cpu;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.batch, self.n_vertices)
    }

    pub fn row(&self, b: usize) -> &[f32] {
        &self.data[b * self.n_vertices..(b + 1) * self.n_vertices]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
