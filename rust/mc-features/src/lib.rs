//! mc-features: Observation schema + canonical encoding.

pub mod encode;
pub mod schema;

pub use encode::{encode_observation, Observation, SpinStateView};
pub use schema::{F, FEATURE_SCHEMA_ID};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
