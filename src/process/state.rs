//! # Step and process states.
//!
//! Step states serialize to the single-letter codes carried on
//! `step/<id>/update` events.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one process step.
///
/// ```text
/// INITIAL ──► ACTIVE ──► DONE
///                  ├───► ERROR
///                  └───► STOP
/// ```
///
/// Serialized with the single-letter codes used by persisted step lists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepState {
    /// Not started yet.
    #[default]
    #[serde(rename = "I")]
    Initial,
    /// Currently running (at most one per process).
    #[serde(rename = "A")]
    Active,
    /// Finished; the process moved on.
    #[serde(rename = "D")]
    Done,
    /// Failed; the process halted.
    #[serde(rename = "E")]
    Error,
    /// Stopped by the step itself or by the operator; the process halted.
    #[serde(rename = "S")]
    Stop,
}

impl StepState {
    /// Short label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            StepState::Initial => "initial",
            StepState::Active => "active",
            StepState::Done => "done",
            StepState::Error => "error",
            StepState::Stop => "stop",
        }
    }
}

/// Outcome a step's run loop reports to the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepResult {
    /// Step finished; advance.
    Done,
    /// Step hands over to the next one; advance.
    Next,
    /// Halt the process, marking the step STOP.
    Stop,
    /// Halt the process, marking the step ERROR.
    Error,
}

/// Overall status of a process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Never started, or reset.
    #[default]
    Idle,
    /// A supervisory job drives the steps.
    Running,
    /// Every step is DONE.
    Completed,
    /// Halted by STOP (step result or operator).
    Stopped,
    /// Halted by a step error.
    Failed,
}

impl ProcessStatus {
    /// Short label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            ProcessStatus::Idle => "idle",
            ProcessStatus::Running => "running",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes() {
        assert_eq!(serde_json::to_string(&StepState::Active).unwrap(), "\"A\"");
        let s: StepState = serde_json::from_str("\"S\"").unwrap();
        assert_eq!(s, StepState::Stop);
        assert_eq!(StepState::default(), StepState::Initial);
    }
}
