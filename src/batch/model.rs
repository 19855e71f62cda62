//! Batch, session, and attempt entities.
//!
//! Pure data: a batch groups N sessions under a concurrency cap; a session
//! tracks its own attempt history. All state transitions are performed by
//! the scheduler; this module only defines the shapes and the projections
//! exposed to external viewers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{MAX_CONCURRENT_SESSIONS, MAX_SESSIONS_PER_BATCH};
use crate::proxy::ProxyKind;

/// Batch lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Created, not yet started
    Pending,
    /// Admission in progress
    Running,
    /// Every session reached a terminal state
    Completed,
    /// Explicitly stopped before completion
    Stopped,
}

impl BatchStatus {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Stopped => "stopped",
        }
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Waiting for admission
    Pending,
    /// Admitted, executing (or in its completion watch)
    Running,
    /// Finished successfully
    Completed,
    /// Retry budget exhausted
    Failed,
    /// Batch was stopped while this session ran
    Stopped,
}

impl SessionStatus {
    /// Terminal sessions are never re-admitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Stopped
        )
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Attempt launched, outcome unknown
    Started,
    /// Runner returned a payload
    Success,
    /// Runner raised an error
    Failed,
}

/// Per-session execution parameters. Mutated between attempts by the
/// retry policy; each attempt snapshots the config it ran with.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    /// Target the session visits
    pub target_url: String,
    /// User-Agent presented by the session
    pub user_agent: String,
    /// Preferred proxy kind
    pub kind_preference: ProxyKind,
    /// Retry budget: failed attempts beyond this terminate the session
    pub max_retries: u32,
    /// Delay before a failed session becomes admissible again, in milliseconds
    pub retry_delay_ms: u64,
}

/// One immutable execution record of a session.
///
/// Appended when the attempt launches; its terminal status and payload are
/// set exactly once when the outcome is known.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// 1-based attempt index
    pub number: u32,
    /// When the attempt launched
    pub started_at: DateTime<Utc>,
    /// Snapshot of the config used for this attempt
    pub config: SessionConfig,
    /// Outcome
    pub status: AttemptStatus,
    /// Result payload on success
    pub result: Option<String>,
    /// Error message on failure
    pub error: Option<String>,
}

/// One unit of scheduled work with its own retry history.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id, unique within the process
    pub id: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Current execution parameters
    pub config: SessionConfig,
    /// Append-only attempt history
    pub attempts: Vec<Attempt>,
    /// When the session was first admitted
    pub started_at: Option<DateTime<Utc>>,
    /// When the session reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// A requeued session is not admissible before this instant; keeps a
    /// retry-delayed session out of admission without holding a slot
    pub eligible_at: Option<Instant>,
}

impl Session {
    /// Creates a pending session.
    pub fn new(id: impl Into<String>, config: SessionConfig) -> Self {
        Session {
            id: id.into(),
            status: SessionStatus::Pending,
            config,
            attempts: Vec::new(),
            started_at: None,
            completed_at: None,
            eligible_at: None,
        }
    }

    /// Number of attempts that ended in failure.
    pub fn failed_attempts(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Failed)
            .count() as u32
    }

    /// Appends a `Started` attempt snapshotting the current config, and
    /// returns its 1-based index.
    pub fn begin_attempt(&mut self) -> u32 {
        let number = self.attempts.len() as u32 + 1;
        self.attempts.push(Attempt {
            number,
            started_at: Utc::now(),
            config: self.config.clone(),
            status: AttemptStatus::Started,
            result: None,
            error: None,
        });
        number
    }

    /// Sets the terminal status of the newest attempt. A second terminal
    /// write to the same attempt is ignored (append-only history).
    pub fn settle_attempt(&mut self, status: AttemptStatus, payload: Option<String>) {
        if let Some(attempt) = self.attempts.last_mut() {
            if attempt.status != AttemptStatus::Started {
                return;
            }
            attempt.status = status;
            match status {
                AttemptStatus::Success => attempt.result = payload,
                AttemptStatus::Failed => attempt.error = payload,
                AttemptStatus::Started => {}
            }
        }
    }

    /// True once the session is past its retry-delay gate.
    pub fn is_admissible(&self, now: Instant) -> bool {
        self.status == SessionStatus::Pending
            && self.eligible_at.map(|at| now >= at).unwrap_or(true)
    }
}

/// Batch configuration snapshot. Built through [`BatchConfig::clamped`]
/// so requested values never exceed the system maxima.
#[derive(Debug, Clone, Serialize)]
pub struct BatchConfig {
    /// Number of sessions in the batch
    pub total_sessions: usize,
    /// Concurrency cap
    pub concurrent_sessions: usize,
}

impl BatchConfig {
    /// Clamps the requested sizes to the system maxima (and to at least 1).
    pub fn clamped(total_sessions: usize, concurrent_sessions: usize) -> Self {
        BatchConfig {
            total_sessions: total_sessions.clamp(1, MAX_SESSIONS_PER_BATCH),
            concurrent_sessions: concurrent_sessions.clamp(1, MAX_CONCURRENT_SESSIONS),
        }
    }
}

/// Session counts by state. Always sums to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Sessions waiting for admission
    pub pending: usize,
    /// Sessions currently running
    pub running: usize,
    /// Sessions that finished successfully
    pub completed: usize,
    /// Sessions that failed or were stopped
    pub failed: usize,
    /// Total sessions in the batch
    pub total: usize,
}

/// A bounded group of sessions sharing a concurrency cap.
#[derive(Debug)]
pub struct Batch {
    /// Batch id, unique within the process
    pub id: String,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Configuration snapshot
    pub config: BatchConfig,
    /// Exclusively owned sessions, in admission order
    pub sessions: Vec<Session>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the batch was started
    pub started_at: Option<DateTime<Utc>>,
    /// When the batch completed or was stopped
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Creates a pending batch owning `sessions`.
    pub fn new(id: impl Into<String>, config: BatchConfig, sessions: Vec<Session>) -> Self {
        Batch {
            id: id.into(),
            status: BatchStatus::Pending,
            config,
            sessions,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Counts sessions by state.
    ///
    /// Computed from the session list, so
    /// `pending + running + completed + failed == total` holds by
    /// construction; stopped sessions count as failed.
    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            total: self.sessions.len(),
        };
        for session in &self.sessions {
            match session.status {
                SessionStatus::Pending => stats.pending += 1,
                SessionStatus::Running => stats.running += 1,
                SessionStatus::Completed => stats.completed += 1,
                SessionStatus::Failed | SessionStatus::Stopped => stats.failed += 1,
            }
        }
        stats
    }

    /// Number of sessions currently running.
    pub fn count_running(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Running)
            .count()
    }

    /// Mutable access to a session by id.
    pub fn session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    /// True when no session remains pending or running.
    pub fn is_drained(&self) -> bool {
        let stats = self.stats();
        stats.pending == 0 && stats.running == 0
    }

    /// External projection of the batch and its sessions.
    pub fn view(&self) -> BatchStatusView {
        BatchStatusView {
            id: self.id.clone(),
            status: self.status,
            config: self.config.clone(),
            stats: self.stats(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            sessions: self.sessions.iter().map(SessionView::from).collect(),
        }
    }
}

/// External projection of one session: attempts are exposed as a count,
/// not full detail.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Session id
    pub id: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Current config
    pub config: SessionConfig,
    /// Number of attempts so far
    pub attempt_count: usize,
    /// First admission time
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal time
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        SessionView {
            id: session.id.clone(),
            status: session.status,
            config: session.config.clone(),
            attempt_count: session.attempts.len(),
            started_at: session.started_at,
            completed_at: session.completed_at,
        }
    }
}

/// External projection of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatusView {
    /// Batch id
    pub id: String,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Configuration snapshot
    pub config: BatchConfig,
    /// Session counts by state
    pub stats: BatchStats,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// Completion/stop time
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-session projections
    pub sessions: Vec<SessionView>,
}
