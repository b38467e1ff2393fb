//! mc-runtime: Batched rollout scheduling.

pub mod history;
pub mod scheduler;
pub mod slot;

pub use history::{BatchHistory, HistoryRecorder, StepRecord};
pub use scheduler::{
    plan_batches, AttemptResult, BatchOutcome, BatchedRolloutScheduler, RolloutConfig,
    RolloutError, SchedulerStats,
};
pub use slot::SlotArena;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
