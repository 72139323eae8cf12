//! # Job identity, kind and status.
//!
//! ```text
//! PENDING ──► RUNNING ──► DONE
//!    │           ├──────► FAILED
//!    └───────────┴──────► CANCELLED
//! ```
//!
//! A job is PENDING while it waits for a concurrency slot. DONE, FAILED and
//! CANCELLED are terminal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use serde::Serialize;

/// Global job id counter.
static JOB_SEQ: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a scheduled job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        Self(JOB_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the scheduler runs a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Run once.
    OneShot,
    /// Run, sleep `interval`, repeat until cancelled or fatally failed.
    Periodic {
        /// Sleep between the end of one iteration and the start of the next.
        #[serde(with = "crate::core::config::millis")]
        interval: Duration,
    },
    /// Ordered initializer of the startup sequence.
    Startup {
        /// Order key (ascending).
        order: i64,
    },
}

impl JobKind {
    /// Short label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobKind::OneShot => "one_shot",
            JobKind::Periodic { .. } => "periodic",
            JobKind::Startup { .. } => "startup",
        }
    }
}

/// Lifecycle status of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a concurrency slot.
    Pending,
    /// Executing (periodic jobs stay RUNNING between iterations).
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error (one-shot) or a fatal error (periodic).
    Failed,
    /// Honored a cancellation request.
    Cancelled,
}

impl JobStatus {
    /// Returns `true` for DONE, FAILED and CANCELLED.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Short label for logs and topics.
    pub fn as_label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Mutable runtime state of a job, published by its actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobState {
    /// Current status.
    pub status: JobStatus,
    /// Number of executions started so far.
    pub iterations: u64,
    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Pending,
            iterations: 0,
            last_error: None,
        }
    }
}

/// Snapshot of one tracked job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    /// Job identity.
    pub id: JobId,
    /// Job name.
    pub name: String,
    /// How it is scheduled.
    pub kind: JobKind,
    /// Its state at snapshot time.
    #[serde(flatten)]
    pub state: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = JobId::next();
        let b = JobId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_kind_serializes_interval_in_millis() {
        let kind = JobKind::Periodic {
            interval: Duration::from_millis(1500),
        };
        let v = serde_json::to_value(kind).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "periodic", "interval": 1500}));
    }
}
