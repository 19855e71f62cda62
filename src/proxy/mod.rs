//! Proxy discovery, validation, caching, and rotation.
//!
//! This module provides:
//! - `ProxyRecord`/`ProxyKind`: individual egress proxies and their kinds
//! - Source-text parsing into candidate records
//! - Discovery sources and the emergency fallback list
//! - Live validation (single and concurrency-wave batch)
//! - The JSON pool cache
//! - `ProxyPool`: the bounded collections plus rotating selection

mod cache;
mod parse;
mod pool;
mod record;
mod sources;
mod validate;

// Re-export public API
pub use cache::PoolCache;
pub use parse::{parse_line, parse_source_text};
pub use pool::{PoolConfig, PoolStatsSnapshot, ProxyPool};
pub use record::{ProxyKind, ProxyRecord};
pub use sources::{default_sources, emergency_proxies, ProxySource};
pub use validate::{test_batch, test_one, ValidationSettings, TEST_ENDPOINTS};
