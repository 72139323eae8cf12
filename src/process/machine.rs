//! # Process: sequential step state machine.
//!
//! A [`Process`] drives an ordered list of steps, one at a time. Starting it
//! submits a supervisory job to the [`Scheduler`]; that job activates the
//! first step that is not DONE and runs each step's `run` loop as its own job.
//!
//! ## Per-step run loop
//! ```text
//! create instance ──► on_start ──Err──► ERROR ──► on_stop ──► halt (FAILED)
//!                        │
//!                        ▼
//!                     ACTIVE ──► submit StepJob
//!                        │
//!        ┌───────────────┼────────────────────┬───────────────────┐
//!        ▼               ▼                    ▼                   ▼
//!   stop()          next() (skip)      DONE / NEXT        STOP / ERROR / Err
//!   cancel job      cancel job             │                   │
//!   STOP            DONE                  DONE              STOP / ERROR
//!        └───────────────┴──────► on_stop ◄┴───────────────────┘
//!                                    │
//!                        advance, or halt the process
//! ```
//!
//! ## Rules
//! - At most one step is ACTIVE; steps before it are DONE, steps after it INITIAL.
//! - Steps never retry automatically. `start` after STOP/ERROR re-runs the
//!   first non-DONE step from scratch (fresh instance, fresh timer).
//! - A step loaded as ACTIVE is treated as STOP (the run that owned it is gone).
//!
//! ## Topics
//! - `step/<id>/update` one step changed (full record + `process`)
//! - `step/update` bulk list of the process's steps
//! - `process/<id>/update` process snapshot after every status change

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::select;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

use super::registry::StepTypes;
use super::state::{ProcessStatus, StepResult, StepState};
use super::step::{Step, StepContext, StepDefinition};
use crate::core::Scheduler;
use crate::error::{JobError, ProcessError, StepError};
use crate::events::{EventBus, Topic};
use crate::jobs::{Job, JobId, JobState, JobStatus};
use crate::panic::panic_message;

/// Serializable view of a process.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    /// Process identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Overall status.
    pub status: ProcessStatus,
    /// All steps in order.
    pub steps: Vec<StepDefinition>,
}

struct ProcessData {
    status: ProcessStatus,
    steps: Vec<StepDefinition>,
    supervisor: Option<JobId>,
}

/// State shared between the process handle, its supervisory job and step contexts.
pub(crate) struct Shared {
    id: String,
    name: String,
    data: Mutex<ProcessData>,
    bus: EventBus,
    skip: Notify,
}

impl Shared {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn step(&self, index: usize) -> Option<StepDefinition> {
        self.data.lock().steps.get(index).cloned()
    }

    fn snapshot(&self) -> ProcessSnapshot {
        let data = self.data.lock();
        ProcessSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: data.status,
            steps: data.steps.clone(),
        }
    }

    fn first_pending(&self) -> Option<usize> {
        self.data
            .lock()
            .steps
            .iter()
            .position(|s| s.state != StepState::Done)
    }

    fn active(&self) -> Option<usize> {
        self.data
            .lock()
            .steps
            .iter()
            .position(|s| s.state == StepState::Active)
    }

    /// Applies `f` to one step and publishes the change.
    pub(crate) fn update_step(&self, index: usize, f: impl FnOnce(&mut StepDefinition)) {
        let (step, all) = {
            let mut data = self.data.lock();
            let Some(step) = data.steps.get_mut(index) else {
                return;
            };
            f(step);
            (step.clone(), data.steps.clone())
        };

        let mut payload = json!(step);
        payload["process"] = json!(self.id);
        self.emit(&format!("step/{}/update", step.id), payload);
        self.emit("step/update", json!({ "process": self.id, "steps": all }));
    }

    fn set_status(&self, status: ProcessStatus) {
        self.data.lock().status = status;
        tracing::info!(process = %self.id, status = status.as_label(), "process status changed");
        self.publish_process();
    }

    fn publish_process(&self) {
        let snapshot = self.snapshot();
        self.emit(&format!("process/{}/update", self.id), json!(snapshot));
    }

    fn emit(&self, topic: &str, payload: Value) {
        if let Err(e) = self.bus.publish(topic, payload) {
            tracing::debug!(topic = %topic, error = %e, "process event not published");
        }
    }
}

/// Handle to a sequential process.
///
/// Cheap to clone; all clones control the same process.
#[derive(Clone)]
pub struct Process {
    shared: Arc<Shared>,
    types: Arc<StepTypes>,
    scheduler: Arc<Scheduler>,
}

impl Process {
    /// Defines a process over `steps`.
    ///
    /// Every step type must be registered in `types` and every step id must be
    /// a valid topic segment. Steps loaded as ACTIVE become STOP.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mut steps: Vec<StepDefinition>,
        types: Arc<StepTypes>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self, ProcessError> {
        for step in &mut steps {
            if !types.contains(&step.kind) {
                return Err(ProcessError::UnknownStepType {
                    step: step.id.clone(),
                    kind: step.kind.clone(),
                });
            }
            if step.id.contains('/') || Topic::parse(step.id.as_str()).is_err() {
                return Err(ProcessError::InvalidStepId {
                    step: step.id.clone(),
                });
            }
            if step.state == StepState::Active {
                step.state = StepState::Stop;
            }
        }

        let shared = Arc::new(Shared {
            id: id.into(),
            name: name.into(),
            data: Mutex::new(ProcessData {
                status: ProcessStatus::Idle,
                steps,
                supervisor: None,
            }),
            bus: scheduler.bus().clone(),
            skip: Notify::new(),
        });
        Ok(Self {
            shared,
            types,
            scheduler,
        })
    }

    /// Process identifier.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Current status.
    pub fn status(&self) -> ProcessStatus {
        self.shared.data.lock().status
    }

    /// Serializable view of the process and all steps.
    pub fn snapshot(&self) -> ProcessSnapshot {
        self.shared.snapshot()
    }

    /// Starts (or resumes) the process at the first step that is not DONE.
    ///
    /// Returns the id of the supervisory job.
    pub fn start(&self) -> Result<JobId, ProcessError> {
        let previous = {
            let mut data = self.shared.data.lock();
            if data.status == ProcessStatus::Running {
                return Err(ProcessError::AlreadyRunning);
            }
            if data.steps.iter().all(|s| s.state == StepState::Done) {
                return Err(ProcessError::Complete);
            }
            std::mem::replace(&mut data.status, ProcessStatus::Running)
        };

        let job = Arc::new(ProcessJob {
            shared: Arc::clone(&self.shared),
            types: Arc::clone(&self.types),
            scheduler: Arc::clone(&self.scheduler),
        });
        let id = match self.scheduler.submit_supervisor(job) {
            Ok(id) => id,
            Err(e) => {
                self.shared.data.lock().status = previous;
                return Err(e.into());
            }
        };
        let finished = self.shared.data.lock().supervisor.replace(id);
        if let Some(old) = finished {
            self.scheduler.acknowledge(old);
        }

        tracing::info!(process = %self.shared.id, job = %id, "process started");
        self.shared.publish_process();
        Ok(id)
    }

    /// Stops the process: the active step is cancelled and marked STOP.
    ///
    /// Waits until the supervisory job has exited (after the step's `on_stop`).
    /// Returns `false` if the process was not running.
    pub async fn stop(&self) -> bool {
        let Some(id) = self.supervisor() else {
            return false;
        };
        self.scheduler.cancel(id).await
    }

    /// Operator skip: marks the active step DONE and continues with the next one.
    ///
    /// Returns `false` if no step is active.
    pub fn next(&self) -> bool {
        if self.status() != ProcessStatus::Running || self.shared.active().is_none() {
            return false;
        }
        self.shared.skip.notify_waiters();
        true
    }

    /// Waits for the current run to end and returns the resulting status.
    pub async fn wait(&self) -> ProcessStatus {
        if let Some(id) = self.supervisor() {
            self.scheduler.wait(id).await;
        }
        self.status()
    }

    /// Returns every step to INITIAL and clears summaries.
    pub fn reset(&self) -> Result<(), ProcessError> {
        {
            let mut data = self.shared.data.lock();
            if data.status == ProcessStatus::Running {
                return Err(ProcessError::AlreadyRunning);
            }
            for step in &mut data.steps {
                step.state = StepState::Initial;
                step.summary.clear();
            }
            data.status = ProcessStatus::Idle;
        }
        let steps = self.shared.data.lock().steps.clone();
        self.shared
            .emit("step/update", json!({ "process": self.shared.id, "steps": steps }));
        self.shared.publish_process();
        Ok(())
    }

    fn supervisor(&self) -> Option<JobId> {
        self.shared.data.lock().supervisor
    }
}

/// How a step activation ended for the process.
enum StepEnd {
    Advance,
    Halt(ProcessStatus),
}

fn panicked(err: &(dyn Any + Send)) -> StepError {
    StepError::new(format!("panic: {}", panic_message(err)))
}

/// Awaits a step hook; a panic becomes a [`StepError`].
async fn guarded<T>(fut: impl Future<Output = T>) -> Result<T, StepError> {
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|p| panicked(&*p))
}

/// What the step job reports back to the supervisor.
enum StepOutcome {
    Finished(Result<StepResult, StepError>),
    Cancelled,
}

/// Scheduler job running one step's `run` loop.
struct StepJob {
    name: String,
    step: Arc<dyn Step>,
    ctx: StepContext,
    outcome: Mutex<Option<oneshot::Sender<StepOutcome>>>,
}

impl StepJob {
    fn send(&self, outcome: StepOutcome) {
        if let Some(tx) = self.outcome.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

#[async_trait]
impl Job for StepJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, token: CancellationToken) -> Result<(), JobError> {
        let ctx = self.ctx.with_token(token.clone());
        let finished = select! {
            biased;
            _ = token.cancelled() => None,
            res = guarded(self.step.run(&ctx)) => Some(res.and_then(|r| r)),
        };

        match finished {
            None => {
                self.send(StepOutcome::Cancelled);
                Err(JobError::Canceled)
            }
            Some(res) => {
                let job_result = match &res {
                    Ok(StepResult::Error) => Err(JobError::fail("step reported ERROR")),
                    Err(e) => Err(JobError::fail(e.message())),
                    Ok(_) => Ok(()),
                };
                self.send(StepOutcome::Finished(res));
                job_result
            }
        }
    }
}

/// Supervisory job driving the steps of one process run.
struct ProcessJob {
    shared: Arc<Shared>,
    types: Arc<StepTypes>,
    scheduler: Arc<Scheduler>,
}

impl ProcessJob {
    async fn drive(&self, token: &CancellationToken) -> ProcessStatus {
        loop {
            if token.is_cancelled() {
                return ProcessStatus::Stopped;
            }
            let Some(index) = self.shared.first_pending() else {
                return ProcessStatus::Completed;
            };
            match self.run_step(index, token).await {
                StepEnd::Advance => {}
                StepEnd::Halt(status) => return status,
            }
        }
    }

    async fn run_step(&self, index: usize, token: &CancellationToken) -> StepEnd {
        let Some(def) = self.shared.step(index) else {
            return StepEnd::Halt(ProcessStatus::Completed);
        };
        let step_name = format!("step:{}", def.id);

        let created = std::panic::catch_unwind(AssertUnwindSafe(|| self.types.create(&def)))
            .unwrap_or_else(|p| Err(panicked(&*p)));
        let step = match created {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(process = %self.shared.id, step = %def.id, error = %e, "step instance not created");
                self.deactivate(index, StepState::Error, Some(e.message().to_string()));
                return StepEnd::Halt(ProcessStatus::Failed);
            }
        };

        let step_token = token.child_token();
        let ctx = StepContext::new(
            Arc::clone(&self.shared),
            index,
            def.clone(),
            Arc::clone(&self.scheduler),
            step_token.clone(),
        );
        self.shared.update_step(index, |s| s.summary.clear());

        if let Err(e) = guarded(step.on_start(&ctx)).await.and_then(|r| r) {
            tracing::warn!(process = %self.shared.id, step = %def.id, error = %e, "step on_start failed");
            self.deactivate(index, StepState::Error, Some(e.message().to_string()));
            self.stop_hook(index, step.as_ref(), &ctx).await;
            return StepEnd::Halt(ProcessStatus::Failed);
        }

        let skip = self.shared.skip.notified();
        self.shared.update_step(index, |s| s.state = StepState::Active);
        tracing::info!(process = %self.shared.id, step = %def.id, name = %def.name, "step active");

        let (tx, rx) = oneshot::channel();
        let job = Arc::new(StepJob {
            name: step_name,
            step: Arc::clone(&step),
            ctx: ctx.clone(),
            outcome: Mutex::new(Some(tx)),
        });
        let job_id = match self.scheduler.submit(job) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(process = %self.shared.id, step = %def.id, error = %e, "step job rejected");
                self.deactivate(index, StepState::Stop, None);
                if !self.stop_hook(index, step.as_ref(), &ctx).await {
                    return StepEnd::Halt(ProcessStatus::Failed);
                }
                return StepEnd::Halt(ProcessStatus::Stopped);
            }
        };

        let (state, summary, end) = select! {
            biased;
            _ = token.cancelled() => {
                self.scheduler.cancel(job_id).await;
                (StepState::Stop, None, StepEnd::Halt(ProcessStatus::Stopped))
            }
            _ = skip => {
                tracing::info!(process = %self.shared.id, step = %def.id, "step skipped");
                self.scheduler.cancel(job_id).await;
                (StepState::Done, None, StepEnd::Advance)
            }
            outcome = rx => match outcome {
                Ok(StepOutcome::Finished(Ok(StepResult::Done | StepResult::Next))) => {
                    (StepState::Done, None, StepEnd::Advance)
                }
                Ok(StepOutcome::Finished(Ok(StepResult::Stop))) => {
                    (StepState::Stop, None, StepEnd::Halt(ProcessStatus::Stopped))
                }
                Ok(StepOutcome::Finished(Ok(StepResult::Error))) => {
                    (StepState::Error, None, StepEnd::Halt(ProcessStatus::Failed))
                }
                Ok(StepOutcome::Finished(Err(e))) => (
                    StepState::Error,
                    Some(e.message().to_string()),
                    StepEnd::Halt(ProcessStatus::Failed),
                ),
                Ok(StepOutcome::Cancelled) => {
                    (StepState::Stop, None, StepEnd::Halt(ProcessStatus::Stopped))
                }
                Err(_) => self.lost_outcome(job_id).await,
            },
        };

        step_token.cancel();
        let _: Option<JobState> = self.scheduler.wait(job_id).await;
        self.scheduler.acknowledge(job_id);
        ctx.timer().stop();

        self.deactivate(index, state, summary);
        if !self.stop_hook(index, step.as_ref(), &ctx).await {
            return StepEnd::Halt(ProcessStatus::Failed);
        }
        end
    }

    /// The step job ended without reporting: cancelled while pending, or it died.
    async fn lost_outcome(&self, job_id: JobId) -> (StepState, Option<String>, StepEnd) {
        match self.scheduler.wait(job_id).await.map(|s| s.status) {
            Some(JobStatus::Cancelled) => {
                (StepState::Stop, None, StepEnd::Halt(ProcessStatus::Stopped))
            }
            _ => (
                StepState::Error,
                Some("step job ended without a result".to_string()),
                StepEnd::Halt(ProcessStatus::Failed),
            ),
        }
    }

    /// Runs `on_stop`. A panic marks the step ERROR; returns `false` in that case.
    async fn stop_hook(&self, index: usize, step: &dyn Step, ctx: &StepContext) -> bool {
        match guarded(step.on_stop(ctx)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(process = %self.shared.id, step = %ctx.id(), error = %e, "step on_stop failed");
                self.deactivate(index, StepState::Error, Some(e.message().to_string()));
                false
            }
        }
    }

    fn deactivate(&self, index: usize, state: StepState, summary: Option<String>) {
        self.shared.update_step(index, |s| {
            s.state = state;
            if let Some(summary) = summary {
                s.summary = summary;
            }
        });
        tracing::info!(process = %self.shared.id, index, state = state.as_label(), "step deactivated");
    }
}

#[async_trait]
impl Job for ProcessJob {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn run(&self, token: CancellationToken) -> Result<(), JobError> {
        let status = match AssertUnwindSafe(self.drive(&token)).catch_unwind().await {
            Ok(status) => status,
            Err(p) => {
                let error = panicked(&*p);
                tracing::error!(process = %self.shared.id, error = %error, "process supervisor panicked");
                if let Some(index) = self.shared.active() {
                    self.deactivate(index, StepState::Error, Some(error.message().to_string()));
                }
                ProcessStatus::Failed
            }
        };
        self.shared.set_status(status);
        match status {
            ProcessStatus::Stopped if token.is_cancelled() => Err(JobError::Canceled),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;

    struct Fixed(StepResult);

    #[async_trait]
    impl Step for Fixed {
        async fn run(&self, _ctx: &StepContext) -> Result<StepResult, StepError> {
            Ok(self.0)
        }
    }

    fn process(steps: Vec<StepDefinition>) -> Process {
        let types = StepTypes::new()
            .with("next", |_def| Ok(Arc::new(Fixed(StepResult::Next))))
            .with("stop", |_def| Ok(Arc::new(Fixed(StepResult::Stop))));
        let sched = Scheduler::new(Config::default(), EventBus::default());
        Process::new("p1", "Test", steps, Arc::new(types), sched).unwrap()
    }

    #[test]
    fn test_unknown_type_rejected() {
        let sched = Scheduler::new(Config::default(), EventBus::default());
        let err = Process::new(
            "p",
            "P",
            vec![StepDefinition::new("a", "A", "missing")],
            Arc::new(StepTypes::new()),
            sched,
        )
        .unwrap_err();
        assert_eq!(err.as_label(), "process_unknown_step_type");
    }

    #[test]
    fn test_active_step_loaded_as_stop() {
        let mut def = StepDefinition::new("a", "A", "next");
        def.state = StepState::Active;
        let p = process(vec![def]);
        assert_eq!(p.snapshot().steps[0].state, StepState::Stop);
    }

    #[test]
    fn test_invalid_step_id_rejected() {
        let sched = Scheduler::new(Config::default(), EventBus::default());
        let types = StepTypes::new().with("next", |_def| Ok(Arc::new(Fixed(StepResult::Next))));
        let err = Process::new(
            "p",
            "P",
            vec![StepDefinition::new("a/b", "A", "next")],
            Arc::new(types),
            sched,
        )
        .unwrap_err();
        assert_eq!(err.as_label(), "process_invalid_step_id");
    }

    #[tokio::test]
    async fn test_complete_process_cannot_start() {
        let p = process(vec![StepDefinition::new("a", "A", "next")]);
        p.start().unwrap();
        assert_eq!(p.wait().await, ProcessStatus::Completed);
        assert_eq!(p.start().unwrap_err(), ProcessError::Complete);

        p.reset().unwrap();
        assert_eq!(p.status(), ProcessStatus::Idle);
        assert_eq!(p.snapshot().steps[0].state, StepState::Initial);
    }
}
