//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `session_dispatch` library that
//! handles command-line argument parsing, logger initialization, and
//! user-facing output formatting. All core functionality is implemented
//! in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use session_dispatch::app::init_logger_with;
use session_dispatch::{run_batch, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let log_level = config.log_level.clone();
    let log_format = config.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    match run_batch(config).await {
        Ok(report) => {
            println!(
                "Batch {} {:?}: {} session{} ({} completed, {} failed) in {:.1}s",
                report.batch_id,
                report.status,
                report.total,
                if report.total == 1 { "" } else { "s" },
                report.completed,
                report.failed,
                report.elapsed_seconds
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("session_dispatch error: {:#}", e);
            process::exit(1);
        }
    }
}
