// Shared test helpers for scheduler and pool integration tests.
//
// This module provides common utilities used across multiple test files to
// reduce duplication: a scripted session runner, offline pool/scheduler
// constructors, and polling helpers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use session_dispatch::batch::{Batch, BatchConfig, BatchScheduler, Session, SessionConfig};
use session_dispatch::error_handling::EventStats;
use session_dispatch::proxy::{PoolConfig, ProxyKind, ProxyPool, ProxyRecord, ValidationSettings};
use session_dispatch::runner::{ActiveSession, SessionRunner};

/// A session runner driven by per-session scripts.
///
/// By default every run succeeds after a short delay. Tests can script the
/// first N runs of a session to fail, or hold a session "active" after its
/// run returns to exercise the completion watch.
pub struct ScriptedRunner {
    outcomes: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    current: Mutex<HashSet<String>>,
    lingering: Mutex<HashSet<String>>,
    max_observed: AtomicUsize,
    run_delay: Duration,
}

#[allow(dead_code)] // Used by other test files
impl ScriptedRunner {
    /// Creates a runner whose runs take `run_delay` before settling.
    pub fn new(run_delay: Duration) -> Arc<Self> {
        Arc::new(ScriptedRunner {
            outcomes: Mutex::new(HashMap::new()),
            current: Mutex::new(HashSet::new()),
            lingering: Mutex::new(HashSet::new()),
            max_observed: AtomicUsize::new(0),
            run_delay,
        })
    }

    /// Scripts the next `failures` runs of `session_id` to fail.
    pub fn script_failures(&self, session_id: &str, failures: usize) {
        let mut outcomes = self.outcomes.lock().unwrap();
        let queue = outcomes.entry(session_id.to_string()).or_default();
        for i in 0..failures {
            queue.push_back(Err(format!("scripted failure {}", i + 1)));
        }
    }

    /// Keeps `session_id` in the active list after its run returns, until
    /// released.
    pub fn hold_open(&self, session_id: &str) {
        self.lingering.lock().unwrap().insert(session_id.to_string());
    }

    /// Releases a held session so the completion watch can finalize it.
    pub fn release(&self, session_id: &str) {
        self.lingering.lock().unwrap().remove(session_id);
    }

    /// Highest number of sessions ever running at once in this runner.
    pub fn max_concurrent(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRunner for ScriptedRunner {
    async fn run(
        &self,
        session_id: &str,
        _config: &SessionConfig,
        _proxy: &ProxyRecord,
    ) -> Result<String> {
        {
            let mut current = self.current.lock().unwrap();
            current.insert(session_id.to_string());
            self.max_observed.fetch_max(current.len(), Ordering::SeqCst);
        }

        tokio::time::sleep(self.run_delay).await;

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(session_id)
            .and_then(|queue| queue.pop_front());
        self.current.lock().unwrap().remove(session_id);

        match outcome {
            Some(Err(message)) => Err(anyhow!(message)),
            Some(Ok(payload)) => Ok(payload),
            None => Ok("done".into()),
        }
    }

    async fn list_active(&self) -> Vec<ActiveSession> {
        let current = self.current.lock().unwrap();
        let lingering = self.lingering.lock().unwrap();
        current
            .iter()
            .chain(lingering.iter())
            .map(|id| ActiveSession {
                id: id.clone(),
                status: "running".into(),
            })
            .collect()
    }
}

/// A pool with no sources and no cache: `acquire` always serves the direct
/// pseudo-proxy, and nothing touches the network.
#[allow(dead_code)] // Used by other test files
pub fn offline_pool() -> Arc<ProxyPool> {
    let config = PoolConfig {
        sources: Vec::new(),
        cache_path: None,
        ..Default::default()
    };
    Arc::new(ProxyPool::new(config, Arc::new(EventStats::new())).unwrap())
}

/// Validation settings that fail fast against a closed local port, so
/// tests never wait on real network timeouts.
#[allow(dead_code)] // Used by other test files
pub fn fast_validation(endpoint: String) -> ValidationSettings {
    ValidationSettings {
        test_timeout: Duration::from_millis(500),
        speed_ceiling: Duration::from_millis(450),
        retest_backoff: Duration::from_secs(300),
        wave_width: 4,
        wave_pause: Duration::from_millis(1),
        endpoints: vec![endpoint],
    }
}

/// A scheduler with a fast completion-watch poll and a pinned RNG.
#[allow(dead_code)] // Used by other test files
pub fn fast_scheduler(pool: Arc<ProxyPool>, runner: Arc<dyn SessionRunner>) -> BatchScheduler {
    BatchScheduler::with_settings(
        pool,
        runner,
        Arc::new(EventStats::new()),
        Duration::from_millis(20),
        StdRng::seed_from_u64(42),
    )
}

/// Builds a pending batch of `total` sessions with the given cap and retry
/// budget. Session ids are `<batch_id>_s1..sN`; retry delay is kept tiny.
#[allow(dead_code)] // Used by other test files
pub fn make_batch(batch_id: &str, total: usize, cap: usize, max_retries: u32) -> Batch {
    let sessions = (1..=total)
        .map(|i| {
            Session::new(
                format!("{}_s{}", batch_id, i),
                SessionConfig {
                    target_url: "https://example.com/".into(),
                    user_agent: session_dispatch::user_agent::default_user_agent().into(),
                    kind_preference: ProxyKind::Http,
                    max_retries,
                    retry_delay_ms: 10,
                },
            )
        })
        .collect();
    Batch::new(batch_id, BatchConfig::clamped(total, cap), sessions)
}

/// Polls `predicate` until it returns true or `timeout` elapses.
#[allow(dead_code)] // Used by other test files
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
