//! Error type definitions.
//!
//! This module defines the typed errors surfaced by the pool and the
//! scheduler, plus the event enums used for statistics tracking.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Error types for proxy pool operations.
///
/// Per-source and per-proxy failures are contained inside the pool (logged
/// and counted, never raised); only the all-sources-empty condition reaches
/// the caller of `refresh()`.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A single discovery source failed. Logged and skipped; the other
    /// sources proceed.
    #[error("proxy source '{source_name}' failed: {reason}")]
    SourceFetch {
        /// Name of the failing source
        source_name: String,
        /// Underlying failure description
        reason: String,
    },

    /// Every source failed or returned nothing. The caller falls back to
    /// the emergency list or direct mode.
    #[error("no proxies found from any source")]
    NoProxiesFound,

    /// The HTTP client used for discovery could not be built.
    #[error("HTTP client initialization error: {0}")]
    HttpClient(#[from] ReqwestError),
}

/// Error types for scheduler operations.
///
/// Session failures are data (attempts, terminal states), never errors;
/// only batch-identity problems propagate to the caller.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// The referenced batch id is unknown.
    #[error("batch not found: {0}")]
    BatchNotFound(String),
}

/// Failure events counted during a run.
///
/// These never abort processing; they are tallied for the end-of-run
/// summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    /// A discovery source could not be fetched
    SourceFetchError,
    /// A proxy failed its live validation round-trip
    ProxyTestFailure,
    /// The pool cache file could not be read or parsed
    CacheReadError,
    /// The pool cache file could not be written
    CacheWriteError,
    /// A session runner invocation raised an error
    SessionRunError,
}

impl ErrorType {
    /// Human-readable label for the summary printout.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::SourceFetchError => "Source fetch error",
            ErrorType::ProxyTestFailure => "Proxy test failure",
            ErrorType::CacheReadError => "Cache read error",
            ErrorType::CacheWriteError => "Cache write error",
            ErrorType::SessionRunError => "Session run error",
        }
    }
}

/// Notable non-failure events counted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum InfoType {
    /// `refresh()` was satisfied from the cache file
    CacheHit,
    /// A failed session was requeued for another attempt
    SessionRetry,
    /// A session exhausted its retry budget
    RetriesExhausted,
    /// `acquire()` fell back to the direct pseudo-proxy
    DirectFallback,
    /// Discovery fell back to the hardcoded emergency list
    EmergencyFallback,
}

impl InfoType {
    /// Human-readable label for the summary printout.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::CacheHit => "Pool cache hit",
            InfoType::SessionRetry => "Session retried",
            InfoType::RetriesExhausted => "Session retries exhausted",
            InfoType::DirectFallback => "Direct (unproxied) fallback",
            InfoType::EmergencyFallback => "Emergency proxy list used",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::SourceFetch {
            source_name: "list-a".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.to_string(), "proxy source 'list-a' failed: timeout");
        assert_eq!(
            PoolError::NoProxiesFound.to_string(),
            "no proxies found from any source"
        );
    }

    #[test]
    fn test_scheduler_error_display() {
        let err = SchedulerError::BatchNotFound("batch_42".into());
        assert_eq!(err.to_string(), "batch not found: batch_42");
    }

    #[test]
    fn test_event_labels_are_distinct() {
        use std::collections::HashSet;
        use strum::IntoEnumIterator;

        let labels: HashSet<&str> = ErrorType::iter().map(|e| e.as_str()).collect();
        assert_eq!(labels.len(), ErrorType::iter().count());
    }
}
