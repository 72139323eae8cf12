//! # Process steps.
//!
//! A [`StepDefinition`] is the persisted record of a step; the process creates
//! a fresh [`Step`] instance from it (through [`StepTypes`](crate::StepTypes))
//! every time the step is activated.
//!
//! ## Hook order
//! ```text
//! on_start ──► ACTIVE ──► run (scheduled job) ──► DONE / STOP / ERROR ──► on_stop
//!    └─ Err ──► ERROR ─────────────────────────────────────────────────► on_stop
//! ```
//! `on_stop` runs on every path, so it must be idempotent.
//! A panic in any hook, or in the factory, ends the step as ERROR with a
//! `panic: ...` summary.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::machine::Shared;
use super::state::{StepResult, StepState};
use super::timer::StepTimer;
use crate::core::Scheduler;
use crate::error::StepError;
use crate::events::{EventBus, Payload};

/// Persisted description of one step.
///
/// ## Example
/// ```rust
/// use brewvisor::{StepDefinition, StepState};
///
/// let raw = r#"{"id": "mash", "name": "Mash in", "type": "mash", "props": {"temp": 67}, "status": "D"}"#;
/// let def: StepDefinition = serde_json::from_str(raw).unwrap();
/// assert_eq!(def.kind, "mash");
/// assert_eq!(def.state, StepState::Done);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Identifier; used as a topic segment.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Registered step type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific configuration.
    #[serde(default)]
    pub props: Payload,
    /// Current state.
    #[serde(default, rename = "status")]
    pub state: StepState,
    /// Human-readable progress or error text.
    #[serde(default)]
    pub summary: String,
}

impl StepDefinition {
    /// Creates an INITIAL step without properties.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            props: Payload::new(),
            state: StepState::Initial,
            summary: String::new(),
        }
    }

    /// Sets one property.
    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

/// Behavior of a step type.
///
/// `run` executes as a scheduled job. When the process is stopped or the
/// operator skips the step, the `run` future is cancelled: it is dropped at its
/// next await point and `ctx.token()` fires. Clean up in `on_stop`.
#[async_trait]
pub trait Step: Send + Sync + 'static {
    /// Called before the step becomes ACTIVE. An error marks it ERROR.
    async fn on_start(&self, _ctx: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    /// The step's run loop.
    async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError>;

    /// Called right after the step is deactivated, on every path.
    async fn on_stop(&self, _ctx: &StepContext) {}
}

/// Everything a step can reach while it is active.
#[derive(Clone)]
pub struct StepContext {
    shared: Arc<Shared>,
    index: usize,
    def: Arc<StepDefinition>,
    timer: StepTimer,
    scheduler: Arc<Scheduler>,
    token: CancellationToken,
}

impl StepContext {
    pub(crate) fn new(
        shared: Arc<Shared>,
        index: usize,
        def: StepDefinition,
        scheduler: Arc<Scheduler>,
        token: CancellationToken,
    ) -> Self {
        Self {
            shared,
            index,
            def: Arc::new(def),
            timer: StepTimer::new(),
            scheduler,
            token,
        }
    }

    /// Same context observing another cancellation token.
    pub(crate) fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }

    /// Identifier of the owning process.
    pub fn process_id(&self) -> &str {
        self.shared.id()
    }

    /// Step identifier.
    pub fn id(&self) -> &str {
        &self.def.id
    }

    /// Step display name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Step properties as loaded.
    pub fn props(&self) -> &Payload {
        &self.def.props
    }

    /// Deserializes one property; `None` if absent or of the wrong shape.
    pub fn prop<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.def
            .props
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Replaces the step summary and publishes a step update.
    pub fn set_summary(&self, summary: impl Into<String>) {
        let summary = summary.into();
        self.shared.update_step(self.index, |s| s.summary = summary);
    }

    /// Current step summary.
    pub fn summary(&self) -> String {
        self.shared.step(self.index).map(|s| s.summary).unwrap_or_default()
    }

    /// The step's countdown timer.
    pub fn timer(&self) -> &StepTimer {
        &self.timer
    }

    /// The bus the process publishes on.
    pub fn bus(&self) -> &EventBus {
        self.scheduler.bus()
    }

    /// Scheduler, for steps that start or stop control jobs.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Fires when the step is being stopped or skipped.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Shorthand for `token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
