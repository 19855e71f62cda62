//! Logger initialization and progress logging.
//!
//! Configures `env_logger` with custom formatting. Supports both plain
//! text (with colors) and JSON formats for structured logging. The logger
//! reads from the `RUST_LOG` environment variable by default, but the
//! provided level parameter overrides it, so `RUST_LOG=debug` works for
//! quick debugging while `--log-level` keeps explicit CLI control.

use std::io::Write;

use colored::*;
use log::{info, LevelFilter};

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

/// Initializes the logger with the specified level and format.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if logger setup fails (for
/// example when a logger is already installed).
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(true);

    let mut builder = env_logger::Builder::from_default_env();

    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("session_dispatch", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{{\"ts\":{},\"level\":\"{}\",\"target\":\"{}\",\"msg\":{}}}",
                    chrono::Utc::now().timestamp_millis(),
                    record.level(),
                    record.target(),
                    serde_json::to_string(&record.args().to_string())
                        .unwrap_or_else(|_| "\"\"".into())
                )
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let level = record.level();
                let colored_level = match level {
                    log::Level::Error => level.to_string().red(),
                    log::Level::Warn => level.to_string().yellow(),
                    log::Level::Info => level.to_string().green(),
                    log::Level::Debug => level.to_string().blue(),
                    log::Level::Trace => level.to_string().purple(),
                };

                writeln!(
                    buf,
                    "{} [{}] {}",
                    record.target().cyan(),
                    colored_level,
                    record.args()
                )
            });
        }
    }

    // try_init() instead of init(): tests may initialize more than once.
    builder.try_init().map_err(InitializationError::from)?;

    Ok(())
}

/// Logs progress for a batch: sessions settled so far and the rate.
pub fn log_progress(start_time: std::time::Instant, settled: usize, total: usize) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let rate = if elapsed_secs > 0.0 {
        settled as f64 / elapsed_secs
    } else {
        0.0
    };
    info!(
        "Settled {}/{} sessions in {:.2} seconds (~{:.2} sessions/sec)",
        settled, total, elapsed_secs, rate
    );
}
