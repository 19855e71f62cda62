//! Batch scheduler: admission, execution, retry, completion.
//!
//! The scheduler enforces each batch's concurrency cap, drives session
//! execution through the [`SessionRunner`] contract, applies the retry
//! policy on failure, and detects batch completion. All state transitions
//! happen behind short-critical-section mutexes that are never held across
//! an `.await`; session executions are independently progressing tokio
//! tasks.
//!
//! Stopping a batch never hard-cancels in-flight work: state is flipped
//! first and every callback re-checks the session's status before mutating
//! anything, so callbacks for stopped sessions become no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::DEFAULT_POLL_INTERVAL_SECS;
use crate::error_handling::{ErrorType, EventStats, InfoType, SchedulerError};
use crate::proxy::ProxyPool;
use crate::runner::SessionRunner;

use super::model::{
    AttemptStatus, Batch, BatchStatus, BatchStatusView, SessionStatus,
};
use super::retry::mutate_for_retry;

/// Process-wide scheduler totals.
///
/// An explicit struct owned by the scheduler instance (shared by
/// reference), not ambient static state.
pub struct SchedulerStats {
    batches_created: AtomicUsize,
    batches_completed: AtomicUsize,
    sessions_completed: AtomicUsize,
    sessions_failed: AtomicUsize,
}

impl SchedulerStats {
    fn new() -> Self {
        SchedulerStats {
            batches_created: AtomicUsize::new(0),
            batches_completed: AtomicUsize::new(0),
            sessions_completed: AtomicUsize::new(0),
            sessions_failed: AtomicUsize::new(0),
        }
    }
}

/// Point-in-time scheduler totals for reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulerStatsSnapshot {
    /// Batches created over the process lifetime
    pub batches_created: usize,
    /// Batches that ran to completion
    pub batches_completed: usize,
    /// Sessions that finished successfully
    pub sessions_completed: usize,
    /// Sessions that failed or were stopped
    pub sessions_failed: usize,
    /// Sessions currently running across all batches
    pub active_sessions: usize,
}

struct Inner {
    pool: Arc<ProxyPool>,
    runner: Arc<dyn SessionRunner>,
    batches: Mutex<HashMap<String, Arc<Mutex<Batch>>>>,
    /// session id -> batch id, only while that session is running. A
    /// lookup index for async callbacks, never an ownership relation.
    active_index: Mutex<HashMap<String, String>>,
    stats: SchedulerStats,
    events: Arc<EventStats>,
    poll_interval: Duration,
    rng: Mutex<StdRng>,
}

/// Admission control and completion tracking over batches of sessions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

impl BatchScheduler {
    /// Creates a scheduler with the default poll interval and an
    /// OS-seeded RNG.
    pub fn new(
        pool: Arc<ProxyPool>,
        runner: Arc<dyn SessionRunner>,
        events: Arc<EventStats>,
    ) -> Self {
        Self::with_settings(
            pool,
            runner,
            events,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            StdRng::from_os_rng(),
        )
    }

    /// Creates a scheduler with an explicit poll interval and RNG, so
    /// tests can use a fast synthetic cadence and a pinned sequence.
    pub fn with_settings(
        pool: Arc<ProxyPool>,
        runner: Arc<dyn SessionRunner>,
        events: Arc<EventStats>,
        poll_interval: Duration,
        rng: StdRng,
    ) -> Self {
        BatchScheduler {
            inner: Arc::new(Inner {
                pool,
                runner,
                batches: Mutex::new(HashMap::new()),
                active_index: Mutex::new(HashMap::new()),
                stats: SchedulerStats::new(),
                events,
                poll_interval,
                rng: Mutex::new(rng),
            }),
        }
    }

    /// Registers a new batch.
    pub fn insert_batch(&self, batch: Batch) {
        let id = batch.id.clone();
        self.inner
            .batches
            .lock()
            .expect("batch map poisoned")
            .insert(id.clone(), Arc::new(Mutex::new(batch)));
        self.inner.stats.batches_created.fetch_add(1, Ordering::SeqCst);
        debug!("Batch {} registered", id);
    }

    fn batch_handle(&self, batch_id: &str) -> Result<Arc<Mutex<Batch>>, SchedulerError> {
        self.inner
            .batches
            .lock()
            .expect("batch map poisoned")
            .get(batch_id)
            .cloned()
            .ok_or_else(|| SchedulerError::BatchNotFound(batch_id.to_string()))
    }

    /// Resolves a running session back to its batch through the active
    /// index.
    fn batch_for_session(&self, session_id: &str) -> Option<(String, Arc<Mutex<Batch>>)> {
        let batch_id = self
            .inner
            .active_index
            .lock()
            .expect("active index poisoned")
            .get(session_id)
            .cloned()?;
        let handle = self.batch_handle(&batch_id).ok()?;
        Some((batch_id, handle))
    }

    /// Starts a pending batch and immediately admits sessions up to the
    /// concurrency cap. Starting a batch that is already past `Pending`
    /// is a logged no-op.
    ///
    /// # Errors
    ///
    /// `SchedulerError::BatchNotFound` for an unknown id.
    pub fn start_batch(&self, batch_id: &str) -> Result<(), SchedulerError> {
        let handle = self.batch_handle(batch_id)?;
        {
            let mut batch = handle.lock().expect("batch poisoned");
            if batch.status != BatchStatus::Pending {
                warn!(
                    "Batch {} is {}, not starting again",
                    batch_id,
                    batch.status.as_str()
                );
                return Ok(());
            }
            batch.status = BatchStatus::Running;
            batch.started_at = Some(Utc::now());
            info!(
                "Batch {} started: {} sessions, cap {}",
                batch_id, batch.config.total_sessions, batch.config.concurrent_sessions
            );
        }
        self.admit_next(batch_id);
        Ok(())
    }

    /// Stops a running batch: every running session is marked `Stopped`
    /// (counted as failed), pending sessions stay pending, and the batch
    /// ends immediately. In-flight callbacks observe the new status and
    /// become no-ops.
    ///
    /// Returns `false` for unknown ids and batches that are not running.
    pub fn stop_batch(&self, batch_id: &str) -> bool {
        let Ok(handle) = self.batch_handle(batch_id) else {
            return false;
        };

        let mut stopped_ids = Vec::new();
        {
            let mut batch = handle.lock().expect("batch poisoned");
            if batch.status != BatchStatus::Running {
                return false;
            }
            batch.status = BatchStatus::Stopped;
            batch.completed_at = Some(Utc::now());
            for session in batch.sessions.iter_mut() {
                if session.status == SessionStatus::Running {
                    session.status = SessionStatus::Stopped;
                    session.completed_at = Some(Utc::now());
                    stopped_ids.push(session.id.clone());
                }
            }
            info!(
                "Batch {} stopped with {} sessions in flight",
                batch_id,
                stopped_ids.len()
            );
        }

        self.inner
            .stats
            .sessions_failed
            .fetch_add(stopped_ids.len(), Ordering::SeqCst);
        let mut index = self
            .inner
            .active_index
            .lock()
            .expect("active index poisoned");
        for id in &stopped_ids {
            index.remove(id);
        }
        true
    }

    /// Admits pending sessions up to the batch's free concurrency slots.
    ///
    /// Sessions are taken in list order among those past their retry-delay
    /// gate; this is re-invoked after every terminal or requeue
    /// transition, which is the sole mechanism keeping the cap saturated.
    pub fn admit_next(&self, batch_id: &str) {
        let Ok(handle) = self.batch_handle(batch_id) else {
            return;
        };

        let mut admitted: Vec<String> = Vec::new();
        {
            let mut batch = handle.lock().expect("batch poisoned");
            if batch.status != BatchStatus::Running {
                return;
            }
            let available = batch
                .config
                .concurrent_sessions
                .saturating_sub(batch.count_running());
            if available == 0 {
                return;
            }

            let now = Instant::now();
            for session in batch.sessions.iter_mut() {
                if admitted.len() >= available {
                    break;
                }
                if !session.is_admissible(now) {
                    continue;
                }
                session.status = SessionStatus::Running;
                if session.started_at.is_none() {
                    session.started_at = Some(Utc::now());
                }
                session.eligible_at = None;
                admitted.push(session.id.clone());
            }
        }

        if admitted.is_empty() {
            return;
        }
        {
            let mut index = self
                .inner
                .active_index
                .lock()
                .expect("active index poisoned");
            for session_id in &admitted {
                index.insert(session_id.clone(), batch_id.to_string());
            }
        }
        for session_id in admitted {
            debug!("Admitted session {}", session_id);
            let sched = self.clone();
            tokio::spawn(async move {
                sched.run_session(session_id).await;
            });
        }
    }

    /// One session execution: append the attempt, acquire a proxy, run,
    /// then either watch for completion or enter the retry policy.
    async fn run_session(&self, session_id: String) {
        let Some((batch_id, handle)) = self.batch_for_session(&session_id) else {
            return;
        };

        let (attempt, config) = {
            let mut batch = handle.lock().expect("batch poisoned");
            let Some(session) = batch.session_mut(&session_id) else {
                return;
            };
            if session.status != SessionStatus::Running {
                return;
            }
            let attempt = session.begin_attempt();
            (attempt, session.config.clone())
        };

        let proxy = self
            .inner
            .pool
            .acquire(&session_id, config.kind_preference)
            .await;
        debug!(
            "Session {} attempt {} via {}",
            session_id,
            attempt,
            proxy.describe()
        );

        match self.inner.runner.run(&session_id, &config, &proxy).await {
            Ok(payload) => {
                {
                    let mut batch = handle.lock().expect("batch poisoned");
                    let Some(session) = batch.session_mut(&session_id) else {
                        return;
                    };
                    if session.status != SessionStatus::Running {
                        return;
                    }
                    session.settle_attempt(AttemptStatus::Success, Some(payload));
                }
                self.watch_completion(&handle, &batch_id, &session_id).await;
            }
            Err(e) => {
                self.inner.events.increment_error(ErrorType::SessionRunError);
                self.handle_failure(&handle, &batch_id, &session_id, format!("{:#}", e));
            }
        }
    }

    /// Poll-based completion watch.
    ///
    /// The runner exposes only a point-in-time status query, so the
    /// scheduler polls `list_active` at the configured interval until the
    /// session disappears from it, then finalizes the session.
    async fn watch_completion(
        &self,
        handle: &Arc<Mutex<Batch>>,
        batch_id: &str,
        session_id: &str,
    ) {
        loop {
            {
                let mut batch = handle.lock().expect("batch poisoned");
                let Some(session) = batch.session_mut(session_id) else {
                    return;
                };
                if session.status != SessionStatus::Running {
                    // Batch stopped while we were watching; nothing to do.
                    return;
                }
            }
            let still_active = self
                .inner
                .runner
                .list_active()
                .await
                .iter()
                .any(|a| a.id == session_id);
            if !still_active {
                break;
            }
            tokio::time::sleep(self.inner.poll_interval).await;
        }

        {
            let mut batch = handle.lock().expect("batch poisoned");
            let Some(session) = batch.session_mut(session_id) else {
                return;
            };
            if session.status != SessionStatus::Running {
                return;
            }
            session.status = SessionStatus::Completed;
            session.completed_at = Some(Utc::now());
            info!("Session {} completed", session_id);
            self.inner
                .stats
                .sessions_completed
                .fetch_add(1, Ordering::SeqCst);
            self.check_completion(&mut batch);
        }
        self.inner
            .active_index
            .lock()
            .expect("active index poisoned")
            .remove(session_id);
        self.admit_next(batch_id);
    }

    /// Retry policy: a failed session is requeued with a mutated config
    /// while it has retries left, and terminally failed once the budget is
    /// spent.
    ///
    /// A requeued session goes back to `Pending` immediately, freeing its
    /// concurrency slot, but stays out of admission until its retry delay
    /// expires, enforced by the `eligible_at` gate. A timer re-runs
    /// admission when the gate opens.
    fn handle_failure(
        &self,
        handle: &Arc<Mutex<Batch>>,
        batch_id: &str,
        session_id: &str,
        error: String,
    ) {
        let mut retry_delay: Option<Duration> = None;
        {
            let mut batch = handle.lock().expect("batch poisoned");
            let Some(session) = batch.session_mut(session_id) else {
                return;
            };
            if session.status != SessionStatus::Running {
                return;
            }
            session.settle_attempt(AttemptStatus::Failed, Some(error.clone()));
            let failed = session.failed_attempts();

            // Drop the index entry before the lock is released: with a
            // zero retry delay the session is admissible the moment its
            // status flips, and a late removal could clobber the index
            // entry of that new admission.
            self.inner
                .active_index
                .lock()
                .expect("active index poisoned")
                .remove(session_id);

            if failed <= session.config.max_retries {
                let mut rng = self.inner.rng.lock().expect("rng poisoned");
                mutate_for_retry(&mut session.config, &mut *rng);
                drop(rng);

                let delay = Duration::from_millis(session.config.retry_delay_ms);
                session.status = SessionStatus::Pending;
                session.eligible_at = Some(Instant::now() + delay);
                retry_delay = Some(delay);
                self.inner.events.increment_info(InfoType::SessionRetry);
                warn!(
                    "Session {} failed ({}), retry {}/{} in {}ms",
                    session_id,
                    error,
                    failed,
                    session.config.max_retries,
                    session.config.retry_delay_ms
                );
            } else {
                session.status = SessionStatus::Failed;
                session.completed_at = Some(Utc::now());
                self.inner
                    .stats
                    .sessions_failed
                    .fetch_add(1, Ordering::SeqCst);
                self.inner.events.increment_info(InfoType::RetriesExhausted);
                warn!(
                    "Session {} terminally failed after {} failed attempts",
                    session_id, failed
                );
                self.check_completion(&mut batch);
            }
        }

        self.admit_next(batch_id);

        if let Some(delay) = retry_delay {
            let sched = self.clone();
            let batch_id = batch_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sched.admit_next(&batch_id);
            });
        }
    }

    /// Marks the batch completed once no session remains pending or
    /// running. Called after every terminal or requeue transition, because
    /// completion can occur from any in-flight session's callback.
    fn check_completion(&self, batch: &mut Batch) {
        if batch.status == BatchStatus::Running && batch.is_drained() {
            batch.status = BatchStatus::Completed;
            batch.completed_at = Some(Utc::now());
            self.inner
                .stats
                .batches_completed
                .fetch_add(1, Ordering::SeqCst);
            let stats = batch.stats();
            info!(
                "Batch {} completed: {} succeeded, {} failed",
                batch.id, stats.completed, stats.failed
            );
        }
    }

    /// External projection of one batch.
    ///
    /// # Errors
    ///
    /// `SchedulerError::BatchNotFound` for an unknown id.
    pub fn batch_view(&self, batch_id: &str) -> Result<BatchStatusView, SchedulerError> {
        let handle = self.batch_handle(batch_id)?;
        let batch = handle.lock().expect("batch poisoned");
        Ok(batch.view())
    }

    /// Projections of every known batch, oldest first.
    pub fn all_views(&self) -> Vec<BatchStatusView> {
        let handles: Vec<Arc<Mutex<Batch>>> = self
            .inner
            .batches
            .lock()
            .expect("batch map poisoned")
            .values()
            .cloned()
            .collect();
        let mut views: Vec<BatchStatusView> = handles
            .iter()
            .map(|h| h.lock().expect("batch poisoned").view())
            .collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    /// Process-wide totals.
    pub fn stats(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            batches_created: self.inner.stats.batches_created.load(Ordering::SeqCst),
            batches_completed: self.inner.stats.batches_completed.load(Ordering::SeqCst),
            sessions_completed: self.inner.stats.sessions_completed.load(Ordering::SeqCst),
            sessions_failed: self.inner.stats.sessions_failed.load(Ordering::SeqCst),
            active_sessions: self
                .inner
                .active_index
                .lock()
                .expect("active index poisoned")
                .len(),
        }
    }
}
