//! Configuration constants.
//!
//! This module defines all configuration constants used throughout the application,
//! including pool caps, TTLs, timeouts, and batch limits.

use std::time::Duration;

// Batch limits (requested values are clamped to these)
/// Maximum number of sessions a single batch may contain
pub const MAX_SESSIONS_PER_BATCH: usize = 500;
/// Maximum concurrent sessions per batch
pub const MAX_CONCURRENT_SESSIONS: usize = 50;

/// Default interval between completion-watch polls, in seconds.
/// The runner only exposes a point-in-time active-session query, so session
/// completion is observed by polling rather than by a push event.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

// Proxy pool collection caps
/// Maximum proxies retained in the fresh (host:port) collection
pub const FRESH_POOL_CAP: usize = 100;
/// Maximum gateway-style proxies retained
pub const GATEWAY_POOL_CAP: usize = 20;
/// Maximum extension-style proxies retained
pub const EXTENSION_POOL_CAP: usize = 20;

/// Pool cache TTL. A cache younger than this satisfies `refresh()` without
/// network discovery, provided it still holds enough working proxies.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Round-robin cursors unseen for this long are evicted.
/// Tied to the cache TTL so cursor lifetime tracks pool content lifetime.
pub const CURSOR_TTL: Duration = CACHE_TTL;

/// Default pool cache location
pub const DEFAULT_CACHE_PATH: &str = ".proxy_cache/pool.json";

// Validation
/// A proxy is only marked working if its test round-trip beats this ceiling
pub const SPEED_CEILING: Duration = Duration::from_secs(8);
/// Per-endpoint timeout during a proxy test
pub const PROXY_TEST_TIMEOUT: Duration = Duration::from_secs(10);
/// A proxy that failed a test within this window is skipped, not retested
pub const RETEST_BACKOFF: Duration = Duration::from_secs(5 * 60);
/// Number of proxies tested concurrently per validation wave
pub const VALIDATION_WAVE_WIDTH: usize = 20;
/// Pause between validation waves so test endpoints are not hammered
pub const WAVE_PAUSE: Duration = Duration::from_millis(500);

/// Below this many working proxies, a health check triggers an unscheduled refresh
pub const MIN_WORKING_PROXIES: usize = 3;
/// Interval between periodic health checks
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Per-source fetch timeout during discovery
pub const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

// Source-fetch retry backoff
/// Base retry delay for a flaky source, in milliseconds
pub const RETRY_INITIAL_DELAY_MS: u64 = 100;
/// Backoff multiplier between source-fetch retries
pub const RETRY_FACTOR: u64 = 2;
/// Ceiling on the source-fetch retry delay, in seconds.
/// Kept tight: a refresh fans out over many sources, and one flaky source
/// must not stall the whole cycle.
pub const RETRY_MAX_DELAY_SECS: u64 = 1;
/// Retries per source beyond the initial attempt
pub const RETRY_MAX_ATTEMPTS: usize = 2;

// Session defaults
/// Default retry budget per session
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay before a failed session becomes admissible again, in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
