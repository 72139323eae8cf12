//! Error types used by the brewvisor runtime, its jobs and process steps.
//!
//! This module defines the error taxonomy of the crate:
//!
//! - [`BusError`]: invalid topics or subscription patterns.
//! - [`HandlerError`]: a bus handler failed (logged, never propagated to publishers).
//! - [`JobError`]: errors raised by individual job executions.
//! - [`SchedulerError`]: the scheduler refused a submission.
//! - [`StartupError`]: an ordered startup initializer failed.
//! - [`StepError`]: a process step hook or run loop failed.
//! - [`ProcessError`]: an invalid process definition or control request.
//! - [`RuntimeError`]: errors raised while wiring or running the runtime itself.
//!
//! Enums provide helper methods (`as_label`, `as_message`) for logging.

use thiserror::Error;

/// # Errors produced by the event bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A subscription pattern is malformed.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The pattern as given by the caller.
        pattern: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A concrete topic is malformed (empty segment or wildcard token).
    #[error("invalid topic {topic:?}: {reason}")]
    InvalidTopic {
        /// The topic as given by the caller.
        topic: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use brewvisor::BusError;
    ///
    /// let err = BusError::InvalidPattern { pattern: "a/#/b".into(), reason: "x" };
    /// assert_eq!(err.as_label(), "bus_invalid_pattern");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::InvalidPattern { .. } => "bus_invalid_pattern",
            BusError::InvalidTopic { .. } => "bus_invalid_topic",
        }
    }
}

/// # Error returned by an event handler.
///
/// Handler failures are isolated: the bus logs them and keeps dispatching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// # Errors produced by job execution.
///
/// A periodic job keeps running after [`JobError::Fail`]; [`JobError::Fatal`]
/// removes it from scheduling. [`JobError::Canceled`] is a graceful exit.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Non-recoverable error; a periodic job stops being scheduled.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// This execution failed; a periodic job keeps its schedule.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Job observed cancellation and exited.
    #[error("context cancelled")]
    Canceled,
}

impl JobError {
    /// Shorthand for [`JobError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        JobError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`JobError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        JobError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use brewvisor::JobError;
    ///
    /// assert_eq!(JobError::fail("boom").as_label(), "job_failed");
    /// assert_eq!(JobError::Canceled.as_label(), "job_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fatal { .. } => "job_fatal",
            JobError::Fail { .. } => "job_failed",
            JobError::Canceled => "job_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            JobError::Fatal { error } => format!("fatal: {error}"),
            JobError::Fail { error } => format!("error: {error}"),
            JobError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Returns `true` if the job must not be scheduled again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Fatal { .. })
    }
}

/// # Errors produced by the scheduler on submission.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler has been shut down and accepts no more jobs.
    #[error("scheduler is closed; job {job:?} rejected")]
    Closed {
        /// Name of the rejected job.
        job: String,
    },
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::Closed { .. } => "scheduler_closed",
        }
    }
}

/// # Errors produced by the ordered startup sequence.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    /// An initializer failed; the remaining initializers were not run.
    #[error("startup initializer {name:?} (order {order}) failed: {error}")]
    Failed {
        /// Initializer name.
        name: String,
        /// Its order key.
        order: i64,
        /// Final status and error message.
        error: String,
    },

    /// The scheduler refused to run an initializer.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl StartupError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StartupError::Failed { .. } => "startup_failed",
            StartupError::Scheduler(e) => e.as_label(),
        }
    }
}

/// # Error raised by a process step.
///
/// The message is kept as the step summary when the step ends in ERROR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StepError {
    message: String,
}

impl StepError {
    /// Creates a step error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// # Errors produced by process definition and control.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// A step references a type with no registered implementation.
    #[error("step {step:?} has unknown type {kind:?}")]
    UnknownStepType {
        /// Step identifier.
        step: String,
        /// Step type name.
        kind: String,
    },

    /// A step identifier cannot be used as a topic segment.
    #[error("step id {step:?} is not a valid topic segment")]
    InvalidStepId {
        /// Step identifier.
        step: String,
    },

    /// `start` or `reset` was called while the process runs.
    #[error("process is already running")]
    AlreadyRunning,

    /// `start` was called but every step is DONE.
    #[error("process has no remaining steps")]
    Complete,

    /// The scheduler refused the supervisory job.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::UnknownStepType { .. } => "process_unknown_step_type",
            ProcessError::InvalidStepId { .. } => "process_invalid_step_id",
            ProcessError::AlreadyRunning => "process_already_running",
            ProcessError::Complete => "process_complete",
            ProcessError::Scheduler(e) => e.as_label(),
        }
    }
}

/// # Errors produced while assembling or running the runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A registration table contained an invalid pattern.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The startup sequence aborted.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// The scheduler refused a job.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Bus(e) => e.as_label(),
            RuntimeError::Startup(e) => e.as_label(),
            RuntimeError::Scheduler(e) => e.as_label(),
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}
