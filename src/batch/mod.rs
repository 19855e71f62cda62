//! Batch entities and the batch scheduler.
//!
//! This module provides:
//! - The batch/session/attempt data model and external projections
//! - The retry config-mutation strategies
//! - The scheduler that admits, bounds, retries, and completes sessions

mod model;
mod retry;
mod scheduler;

// Re-export public API
pub use model::{
    Attempt, AttemptStatus, Batch, BatchConfig, BatchStats, BatchStatus, BatchStatusView,
    Session, SessionConfig, SessionStatus, SessionView,
};
pub use retry::{mutate_for_retry, RetryMutation};
pub use scheduler::{BatchScheduler, SchedulerStatsSnapshot};
