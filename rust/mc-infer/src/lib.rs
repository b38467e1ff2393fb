//! mc-infer: Value networks, observation batches and the action selector.

pub mod client;
pub mod codec;
pub mod frame;
pub mod linear;
pub mod protocol;
pub mod select;
pub mod tensor;

pub use client::{ClientError, RemoteValueNet};
pub use linear::LinearValueNet;
pub use select::ActionSelector;
pub use tensor::{Device, ObservationBatch, QValues};

use thiserror::Error;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum InferError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("observation batch is empty")]
    EmptyBatch,
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("backend runs on {expected}, batch is on {got}")]
    DeviceMismatch { got: Device, expected: Device },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("safetensors: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
    #[error("invalid weights: {0}")]
    Weights(String),
    #[error("inference client: {0}")]
    Client(#[from] ClientError),
}

/// A network scoring every vertex of every observation in a batch.
///
/// Output is always `(batch, vertices)`. Implementations take `&self`; backends with
/// mutable IO state serialise it internally.
pub trait ValueNetwork {
    fn predict(&self, batch: &ObservationBatch) -> Result<QValues, InferError>;

    /// Device batches should be placed on before `predict`.
    fn device(&self) -> Device;

    /// Short human-readable description for manifests and logs.
    fn describe(&self) -> String {
        format!("network on {}", self.device())
    }
}

impl<T: ValueNetwork + ?Sized> ValueNetwork for &T {
    fn predict(&self, batch: &ObservationBatch) -> Result<QValues, InferError> {
        (**self).predict(batch)
    }

    fn device(&self) -> Device {
        (**self).device()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: ValueNetwork + ?Sized> ValueNetwork for Box<T> {
    fn predict(&self, batch: &ObservationBatch) -> Result<QValues, InferError> {
        (**self).predict(batch)
    }

    fn device(&self) -> Device {
        (**self).device()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}


#[cfg(test)]
mod select_tests;
