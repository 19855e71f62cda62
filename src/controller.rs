//! Batch lifecycle facade.
//!
//! Thin surface external callers go through: create/start/stop/status over
//! batches, plus process-wide totals. All real work happens in the
//! scheduler and the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::batch::{
    Batch, BatchConfig, BatchScheduler, BatchStatusView, SchedulerStatsSnapshot, Session,
    SessionConfig,
};
use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};
use crate::error_handling::SchedulerError;
use crate::proxy::{PoolStatsSnapshot, ProxyKind, ProxyPool};
use crate::user_agent;

/// Parameters for creating a batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Target URL every session visits
    pub target_url: String,
    /// Requested session count (clamped to the system maximum)
    pub total_sessions: usize,
    /// Requested concurrency cap (clamped to the system maximum)
    pub concurrent_sessions: usize,
    /// Preferred proxy kind for the sessions
    pub kind_preference: ProxyKind,
    /// Retry budget per session
    pub max_retries: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Optional fixed User-Agent; defaults to the built-in desktop profile
    pub user_agent: Option<String>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        BatchRequest {
            target_url: String::new(),
            total_sessions: 10,
            concurrent_sessions: 3,
            kind_preference: ProxyKind::Http,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            user_agent: None,
        }
    }
}

/// Combined process-wide totals exposed by [`Controller::stats`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProcessStats {
    /// Scheduler totals
    pub scheduler: SchedulerStatsSnapshot,
    /// Pool totals
    pub pool: PoolStatsSnapshot,
}

/// Facade over the scheduler and the pool.
pub struct Controller {
    scheduler: BatchScheduler,
    pool: Arc<ProxyPool>,
    batch_seq: AtomicU64,
}

impl Controller {
    /// Creates a controller over an existing scheduler and pool.
    pub fn new(scheduler: BatchScheduler, pool: Arc<ProxyPool>) -> Self {
        Controller {
            scheduler,
            pool,
            batch_seq: AtomicU64::new(0),
        }
    }

    /// Creates a batch from the request and returns its id. The batch is
    /// registered `Pending`; nothing runs until [`Controller::start_batch`].
    pub fn create_batch(&self, request: BatchRequest) -> String {
        let config = BatchConfig::clamped(request.total_sessions, request.concurrent_sessions);
        let seq = self.batch_seq.fetch_add(1, Ordering::SeqCst);
        let batch_id = format!("batch_{}_{}", Utc::now().timestamp_millis(), seq);

        let user_agent = request
            .user_agent
            .unwrap_or_else(|| user_agent::default_user_agent().to_string());
        let sessions = (1..=config.total_sessions)
            .map(|i| {
                Session::new(
                    format!("{}_s{}", batch_id, i),
                    SessionConfig {
                        target_url: request.target_url.clone(),
                        user_agent: user_agent.clone(),
                        kind_preference: request.kind_preference,
                        max_retries: request.max_retries,
                        retry_delay_ms: request.retry_delay_ms,
                    },
                )
            })
            .collect();

        self.scheduler
            .insert_batch(Batch::new(batch_id.clone(), config, sessions));
        batch_id
    }

    /// Starts a pending batch.
    ///
    /// # Errors
    ///
    /// `SchedulerError::BatchNotFound` for an unknown id.
    pub fn start_batch(&self, batch_id: &str) -> Result<(), SchedulerError> {
        self.scheduler.start_batch(batch_id)
    }

    /// Stops a running batch. Returns `false` for unknown ids and batches
    /// that are not running.
    pub fn stop_batch(&self, batch_id: &str) -> bool {
        self.scheduler.stop_batch(batch_id)
    }

    /// Status projection of one batch.
    ///
    /// # Errors
    ///
    /// `SchedulerError::BatchNotFound` for an unknown id.
    pub fn batch_status(&self, batch_id: &str) -> Result<BatchStatusView, SchedulerError> {
        self.scheduler.batch_view(batch_id)
    }

    /// Status projections of every known batch, oldest first.
    pub fn all_batches(&self) -> Vec<BatchStatusView> {
        self.scheduler.all_views()
    }

    /// Process-wide totals.
    pub fn stats(&self) -> ProcessStats {
        ProcessStats {
            scheduler: self.scheduler.stats(),
            pool: self.pool.stats(),
        }
    }
}
