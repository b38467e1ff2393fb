//! mc-core: Spin-system environment, greedy policy, graph types, and configuration.

pub mod basis;
pub mod config;
pub mod env;
pub mod graph;
pub mod greedy;

pub use basis::VertexBasis;
pub use config::{Config, ConfigError};
pub use env::{
    make, EnvError, EnvOptions, RewardSignal, SingleGraphGenerator, SpinSystem, StepOutcome,
    SystemKind,
};
pub use graph::{AdjacencyMatrix, GraphError, GraphInstance, MAX_VERTICES};
pub use greedy::Greedy;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
