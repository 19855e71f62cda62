//! Error handling and event statistics.
//!
//! This module provides:
//! - Error type definitions for the pool and the scheduler
//! - Event statistics tracking (failure and info counters)
//! - Retry strategy configuration for source fetching
//!
//! Events are categorized into:
//! - **Errors**: contained failures (source fetch, proxy test, cache, runner)
//! - **Info**: notable events that aren't failures (cache hits, retries, fallbacks)

mod stats;
mod types;

use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;

// Re-export public API
pub use stats::EventStats;
pub use types::{ErrorType, InfoType, InitializationError, PoolError, SchedulerError};

/// Creates the exponential backoff strategy used when fetching a discovery
/// source.
///
/// Returns a retry strategy configured with:
/// - Initial delay: `RETRY_INITIAL_DELAY_MS` milliseconds
/// - Backoff factor: `RETRY_FACTOR` (doubles delay each retry)
/// - Maximum delay: `RETRY_MAX_DELAY_SECS` seconds
/// - Maximum attempts: `RETRY_MAX_ATTEMPTS` (prevents infinite retries)
pub fn get_retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(crate::config::RETRY_INITIAL_DELAY_MS)
        .factor(crate::config::RETRY_FACTOR)
        .max_delay(Duration::from_secs(crate::config::RETRY_MAX_DELAY_SECS))
        .take(crate::config::RETRY_MAX_ATTEMPTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_strategy_is_bounded() {
        let delays: Vec<Duration> = get_retry_strategy().collect();
        assert_eq!(delays.len(), crate::config::RETRY_MAX_ATTEMPTS);
        for delay in &delays {
            assert!(*delay <= Duration::from_secs(crate::config::RETRY_MAX_DELAY_SECS));
        }
    }

    #[test]
    fn test_retry_strategy_backs_off() {
        let delays: Vec<Duration> = get_retry_strategy().collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }
}
