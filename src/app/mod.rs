//! Main application modules.
//!
//! This module provides logging setup, progress logging, and statistics
//! printing used by the binary.

pub mod logging;
pub mod statistics;

// Re-export public API
pub use logging::{init_logger_with, log_progress};
pub use statistics::{print_batch_summary, print_event_statistics};
