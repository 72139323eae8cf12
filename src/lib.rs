//! # brewvisor
//!
//! **Brewvisor** is the runtime core of a brewing automation controller.
//!
//! It provides three cooperating pieces: a topic-based event bus, a job
//! scheduler hosting background work, and a process state machine running a
//! brew's steps (mash rests, boil, hop additions, fermentation) one at a time.
//! Device drivers, persistence and HTTP surfaces are built on top of it.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   HandlerTable   HandlerTable      StartupSequence     periodic / one-shot jobs
//!   (component A)  (component B)     (ordered inits)     (devices, sensor polls)
//!        │              │                  │                       │
//!        ▼              ▼                  ▼                       ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │  RuntimeBuilder::start()                                                  │
//! └──────┬─────────────────────────────────┬──────────────────────────────────┘
//!        ▼                                 ▼
//! ┌──────────────┐  job/<id>/…      ┌──────────────┐        ┌──────────────┐
//! │   EventBus   │◄─────────────────│  Scheduler   │───────►│ FailureQueue │
//! │ (wildcards)  │◄──────┐          │ (JobActors)  │        │  (bounded)   │
//! └──────┬───────┘       │          └──────▲───────┘        └──────────────┘
//!        │               │ step/…          │ step jobs
//!        ▼               │ process/…       │
//!   handlers        ┌────┴─────────────────┴────┐
//!   (spawned)       │  Process (state machine)  │
//!                   └───────────────────────────┘
//! ```
//!
//! ### Step lifecycle
//! ```text
//! INITIAL ──start──► ACTIVE ──┬─ Done / Next ─► DONE  ─► next step
//!                             ├─ Stop / stop() ───────► STOP   (process halts)
//!                             └─ Error / Err ─────────► ERROR  (process halts)
//! on_start() before ACTIVE, on_stop() on every exit path
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                                   |
//! |-------------------|---------------------------------------------------------------|------------------------------------------------------|
//! | **Event bus**     | MQTT-style topics, fire-and-continue and fire-and-wait.       | [`EventBus`], [`Handler`], [`HandlerTable`]          |
//! | **Scheduling**    | One-shot, periodic and startup jobs with cooperative cancel.  | [`Scheduler`], [`Job`], [`JobFn`], [`StartupSequence`] |
//! | **Failures**      | Bounded queue of job failures, oldest dropped when full.      | [`FailureQueue`], [`JobFailure`]                     |
//! | **Processes**     | Ordered steps with explicit states and idempotent cleanup.    | [`Process`], [`Step`], [`StepContext`], [`StepTypes`] |
//! | **Devices**       | Driver lifecycle hosted as a job.                             | [`Device`], [`DeviceJob`]                            |
//! | **Errors**        | Typed errors per subsystem.                                   | [`BusError`], [`JobError`], [`ProcessError`]         |
//! | **Configuration** | Concurrency cap, failure capacity, request timeout.           | [`Config`]                                           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use brewvisor::{
//!     Config, RuntimeBuilder, Step, StepContext, StepDefinition, StepError, StepResult,
//!     StepState, StepTypes,
//! };
//!
//! struct Rest;
//!
//! #[async_trait]
//! impl Step for Rest {
//!     async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
//!         ctx.set_summary("rest complete");
//!         Ok(StepResult::Next)
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let types = StepTypes::new().with("rest", |_def: &StepDefinition| Ok(Arc::new(Rest)));
//!     let runtime = RuntimeBuilder::new(Config::default())
//!         .with_step_types(types)
//!         .start()
//!         .await?;
//!
//!     let mash = runtime.process(
//!         "mash",
//!         "Single infusion",
//!         vec![StepDefinition::new("protein", "Protein rest", "rest")],
//!     )?;
//!     mash.start()?;
//!     mash.wait().await;
//!     assert_eq!(mash.snapshot().steps[0].state, StepState::Done);
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod device;
mod error;
mod events;
mod jobs;
mod observers;
mod panic;
mod process;

// ---- Public re-exports ----

pub use self::core::{Config, Runtime, RuntimeBuilder, Scheduler, ShutdownSignal, wait_for_shutdown_signal};
pub use device::{Device, DeviceJob, publish_update};
pub use error::{
    BusError, HandlerError, JobError, ProcessError, RuntimeError, SchedulerError, StartupError,
    StepError,
};
pub use events::{
    DEFAULT_REQUEST_TIMEOUT, Event, EventBus, Handler, HandlerFn, HandlerRef, HandlerTable, Owner,
    PatternSegment, Payload, Response, Responses, SubscriptionId, SubscriptionInfo, TableEntry,
    Topic, TopicPattern, WILDCARD_MULTI, WILDCARD_SINGLE, into_payload,
};
pub use jobs::{
    FailureQueue, Initializer, Job, JobFailure, JobFn, JobId, JobInfo, JobKind, JobRef, JobState,
    JobStatus, StartupSequence,
};
pub use observers::{EventLog, FailureLog};
pub use process::{
    Process, ProcessSnapshot, ProcessStatus, Step, StepContext, StepDefinition, StepFactory,
    StepResult, StepState, StepTimer, StepTypes,
};
