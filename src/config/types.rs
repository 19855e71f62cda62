//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::constants::{
    DEFAULT_CACHE_PATH, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RETRY_DELAY_MS,
    MIN_WORKING_PROXIES,
};
use crate::proxy::ProxyKind;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Proxy kind preference selectable from the command line.
///
/// Only dialable kinds are offered here; the gateway/extension/direct kinds
/// are internal pool concepts, not user preferences.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum KindChoice {
    /// Plain HTTP proxies
    Http,
    /// TLS proxies
    Https,
    /// SOCKS4 proxies
    Socks4,
    /// SOCKS5 proxies
    Socks5,
}

impl KindChoice {
    /// Maps the CLI choice onto the pool's kind enum.
    pub fn to_kind(self) -> ProxyKind {
        match self {
            KindChoice::Http => ProxyKind::Http,
            KindChoice::Https => ProxyKind::Https,
            KindChoice::Socks4 => ProxyKind::Socks4,
            KindChoice::Socks5 => ProxyKind::Socks5,
        }
    }
}

/// Application configuration.
///
/// Doubles as the CLI argument definition for the binary; library users can
/// construct it programmatically and rely on `Default` for everything they
/// don't care about.
///
/// # Examples
///
/// ```no_run
/// use session_dispatch::Config;
///
/// let config = Config {
///     target_url: "https://example.com/".into(),
///     sessions: 20,
///     concurrency: 5,
///     ..Default::default()
/// };
/// ```
#[derive(Parser, Debug, Clone)]
#[command(
    name = "session_dispatch",
    about = "Runs batches of automated sessions through a rotating proxy pool"
)]
pub struct Config {
    /// Target URL each session visits
    pub target_url: String,

    /// Number of sessions in the batch
    #[arg(long, default_value_t = 10)]
    pub sessions: usize,

    /// Maximum sessions running at once
    #[arg(long, default_value_t = 3)]
    pub concurrency: usize,

    /// Retry budget per session
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Delay before a failed session is readmitted, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Preferred proxy kind for sessions
    #[arg(long, value_enum, default_value = "http")]
    pub proxy_kind: KindChoice,

    /// Pool cache file location
    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    pub cache_path: PathBuf,

    /// Minimum working proxies before a health check forces a refresh
    #[arg(long, default_value_t = MIN_WORKING_PROXIES)]
    pub min_working: usize,

    /// Completion-watch poll interval in seconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Override the session User-Agent (default: rotated per retry)
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            sessions: 10,
            concurrency: 3,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            proxy_kind: KindChoice::Http,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            min_working: MIN_WORKING_PROXIES,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            user_agent: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_kind_choice_maps_onto_pool_kinds() {
        assert_eq!(KindChoice::Http.to_kind(), ProxyKind::Http);
        assert_eq!(KindChoice::Socks5.to_kind(), ProxyKind::Socks5);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sessions, 10);
        assert_eq!(config.concurrency, 3);
        assert!(config.user_agent.is_none());
    }
}
