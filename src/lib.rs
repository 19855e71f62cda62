//! session_dispatch library: batched session scheduling over a rotating proxy pool.
//!
//! This library runs large numbers of independent sessions in controlled
//! batches, each session routed through one of a rotating pool of egress
//! proxies that are continuously sourced, validated, and retired.
//!
//! # Example
//!
//! ```no_run
//! use session_dispatch::{run_batch, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     target_url: "https://example.com/".into(),
//!     sessions: 20,
//!     concurrency: 5,
//!     ..Default::default()
//! };
//!
//! let report = run_batch(config).await?;
//! println!("Batch {}: {} completed, {} failed",
//!          report.batch_id, report.completed, report.failed);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your
//! application or ensure you're calling library functions within an async
//! context.

#![warn(missing_docs)]

pub mod app;
pub mod batch;
pub mod config;
mod controller;
pub mod error_handling;
pub mod proxy;
pub mod runner;
pub mod user_agent;

// Re-export public API
pub use config::{Config, LogFormat, LogLevel};
pub use controller::{BatchRequest, Controller, ProcessStats};
pub use run::{run_batch, BatchReport};

// Internal run module (wires pool + scheduler + controller for one batch)
mod run {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{bail, Context, Result};
    use log::info;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio_util::sync::CancellationToken;

    use crate::app::{log_progress, print_batch_summary, print_event_statistics};
    use crate::batch::{BatchScheduler, BatchStatus};
    use crate::config::{Config, HEALTH_CHECK_INTERVAL, PROXY_TEST_TIMEOUT};
    use crate::controller::{BatchRequest, Controller};
    use crate::error_handling::EventStats;
    use crate::proxy::{PoolConfig, ProxyPool};
    use crate::runner::HttpProbeRunner;

    /// Results of a completed (or stopped) batch run.
    #[derive(Debug, Clone)]
    pub struct BatchReport {
        /// Batch identifier
        pub batch_id: String,
        /// Final batch status
        pub status: BatchStatus,
        /// Total sessions in the batch
        pub total: usize,
        /// Sessions that finished successfully
        pub completed: usize,
        /// Sessions that failed or were stopped
        pub failed: usize,
        /// Elapsed wall time in seconds
        pub elapsed_seconds: f64,
    }

    /// Runs one batch end to end with the provided configuration.
    ///
    /// This is the main entry point for the library: it builds the proxy
    /// pool (cache-first refresh, emergency fallback), starts the periodic
    /// pool health check, schedules the batch, and waits until every
    /// session reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable (empty target
    /// URL) or the pool's HTTP client cannot be built. Session failures
    /// are not errors; they are reported in the `BatchReport`.
    pub async fn run_batch(config: Config) -> Result<BatchReport> {
        if config.target_url.trim().is_empty() {
            bail!("target URL must not be empty");
        }

        let events = Arc::new(EventStats::new());

        let pool_config = PoolConfig {
            cache_path: Some(config.cache_path.clone()),
            min_working: config.min_working,
            ..Default::default()
        };
        let pool = Arc::new(
            ProxyPool::new(pool_config, Arc::clone(&events))
                .context("Failed to initialize proxy pool")?,
        );

        let working = pool.refresh_or_fallback().await;
        info!("Proxy pool ready: {} working", working);

        let shutdown = CancellationToken::new();
        let health_loop = pool.spawn_health_loop(HEALTH_CHECK_INTERVAL, shutdown.clone());

        let runner = Arc::new(HttpProbeRunner::new(PROXY_TEST_TIMEOUT));
        let scheduler = BatchScheduler::with_settings(
            Arc::clone(&pool),
            runner,
            Arc::clone(&events),
            Duration::from_secs(config.poll_interval_secs),
            StdRng::from_os_rng(),
        );
        let controller = Controller::new(scheduler, Arc::clone(&pool));

        let batch_id = controller.create_batch(BatchRequest {
            target_url: config.target_url.clone(),
            total_sessions: config.sessions,
            concurrent_sessions: config.concurrency,
            kind_preference: config.proxy_kind.to_kind(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            user_agent: config.user_agent.clone(),
        });

        let start_time = std::time::Instant::now();
        controller
            .start_batch(&batch_id)
            .context("Failed to start batch")?;

        // Status polling: completion is detected by the scheduler; this
        // loop only observes and reports progress.
        let mut last_settled = 0usize;
        let view = loop {
            let view = controller
                .batch_status(&batch_id)
                .context("Batch disappeared mid-run")?;
            let settled = view.stats.completed + view.stats.failed;
            if settled != last_settled {
                last_settled = settled;
                log_progress(start_time, settled, view.stats.total);
            }
            if matches!(view.status, BatchStatus::Completed | BatchStatus::Stopped) {
                break view;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        };

        shutdown.cancel();
        let _ = health_loop.await;

        let elapsed_seconds = start_time.elapsed().as_secs_f64();
        print_batch_summary(&view, elapsed_seconds);
        print_event_statistics(&events);

        Ok(BatchReport {
            batch_id,
            status: view.status,
            total: view.stats.total,
            completed: view.stats.completed,
            failed: view.stats.failed,
            elapsed_seconds,
        })
    }
}
