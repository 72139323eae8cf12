//! # JobActor: single-job executor.
//!
//! Drives one scheduled [`Job`] from PENDING to a terminal status:
//! - waits for a concurrency slot (cancellable),
//! - runs it once, or once per interval for periodic jobs,
//! - records failures on the [`FailureQueue`] and the bus,
//! - honors cooperative cancellation via [`CancellationToken`].
//!
//! ## Architecture
//! ```text
//! Scheduler::spawn ──► JobActor::run()
//!
//! loop {
//!   ├─► token cancelled?            ─► CANCELLED
//!   ├─► acquire semaphore (cancellable)
//!   ├─► publish job/<id>/started
//!   ├─► run_once() ─────► job.run(child)
//!   │       ├─ Ok                   ─► one-shot: DONE
//!   │       ├─ Err(Canceled)        ─► CANCELLED
//!   │       ├─ Err(Fatal)           ─► report, FAILED
//!   │       └─ Err(Fail)            ─► report; one-shot: FAILED, periodic: keep going
//!   └─► periodic: sleep(interval) or token cancelled ─► CANCELLED
//! }
//! ```
//!
//! ## Rules
//! - Iterations of one periodic job run **sequentially** (never concurrent)
//! - Once the token fires, **no new iteration starts**
//! - The concurrency slot is released between iterations
//! - Every exit path leaves a **terminal status** in the job's state channel

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::{Value, json};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::{
    core::runner::run_once,
    error::JobError,
    events::EventBus,
    jobs::{FailureQueue, JobFailure, JobId, JobKind, JobRef, JobState, JobStatus},
};

/// Sender half of a job's state channel.
///
/// Dropping it while the status is not terminal forces CANCELLED, so waiters
/// never hang on an actor that went away.
pub(crate) struct StateTx(watch::Sender<JobState>);

impl StateTx {
    pub(crate) fn new(tx: watch::Sender<JobState>) -> Self {
        Self(tx)
    }

    fn update(&self, f: impl FnOnce(&mut JobState)) {
        self.0.send_modify(f);
    }
}

impl Drop for StateTx {
    fn drop(&mut self) {
        self.0.send_if_modified(|s| {
            if s.status.is_terminal() {
                false
            } else {
                s.status = JobStatus::Cancelled;
                true
            }
        });
    }
}

/// Executes one scheduled job.
pub(crate) struct JobActor {
    pub id: JobId,
    pub kind: JobKind,
    pub job: JobRef,
    pub bus: EventBus,
    pub failures: FailureQueue,
    pub semaphore: Option<Arc<Semaphore>>,
    pub state: StateTx,
}

impl JobActor {
    /// Runs the job until completion, fatal failure or cancellation.
    pub async fn run(self, token: CancellationToken) {
        let status = match self.kind {
            JobKind::Periodic { interval } => self.run_periodic(interval, &token).await,
            JobKind::OneShot | JobKind::Startup { .. } => self.run_single(&token).await,
        };
        self.finish(status);
    }

    async fn run_single(&self, token: &CancellationToken) -> JobStatus {
        let Some(_permit) = self.acquire(token).await else {
            return JobStatus::Cancelled;
        };
        self.begin_iteration(1);

        match run_once(self.job.as_ref(), token).await {
            Ok(()) if token.is_cancelled() => JobStatus::Cancelled,
            Ok(()) => JobStatus::Done,
            Err(JobError::Canceled) => JobStatus::Cancelled,
            Err(e) => {
                self.report(1, e);
                JobStatus::Failed
            }
        }
    }

    async fn run_periodic(&self, interval: Duration, token: &CancellationToken) -> JobStatus {
        let mut iteration: u64 = 0;

        loop {
            let Some(permit) = self.acquire(token).await else {
                return JobStatus::Cancelled;
            };

            iteration += 1;
            self.begin_iteration(iteration);
            let res = run_once(self.job.as_ref(), token).await;
            drop(permit);

            match res {
                Ok(()) => {}
                Err(JobError::Canceled) => return JobStatus::Cancelled,
                Err(e) if e.is_fatal() => {
                    self.report(iteration, e);
                    return JobStatus::Failed;
                }
                Err(e) => self.report(iteration, e),
            }

            select! {
                biased;
                _ = token.cancelled() => return JobStatus::Cancelled,
                _ = time::sleep(interval) => {}
            }
        }
    }

    /// Waits for a concurrency slot; `None` if cancelled or the semaphore closed.
    async fn acquire(&self, token: &CancellationToken) -> Option<Option<OwnedSemaphorePermit>> {
        if token.is_cancelled() {
            return None;
        }
        let Some(sem) = &self.semaphore else {
            return Some(None);
        };
        select! {
            biased;
            _ = token.cancelled() => None,
            res = Arc::clone(sem).acquire_owned() => res.ok().map(Some),
        }
    }

    fn begin_iteration(&self, iteration: u64) {
        self.state.update(|s| {
            s.status = JobStatus::Running;
            s.iterations = iteration;
        });
        tracing::debug!(job = %self.id, name = self.job.name(), iteration, "job iteration started");
        self.emit("started", json!({ "iteration": iteration }));
    }

    fn report(&self, iteration: u64, error: JobError) {
        tracing::warn!(
            job = %self.id,
            name = self.job.name(),
            kind = self.kind.as_label(),
            iteration,
            error = %error,
            label = error.as_label(),
            "job failed"
        );
        self.state.update(|s| s.last_error = Some(error.to_string()));
        self.emit(
            "failed",
            json!({ "iteration": iteration, "error": error.to_string(), "fatal": error.is_fatal() }),
        );
        self.failures.push(JobFailure {
            job: self.id,
            name: self.job.name().to_string(),
            kind: self.kind,
            iteration,
            error,
            at: SystemTime::now(),
        });
    }

    fn finish(&self, status: JobStatus) {
        self.state.update(|s| s.status = status);
        tracing::debug!(job = %self.id, name = self.job.name(), status = status.as_label(), "job finished");
        match status {
            JobStatus::Done => self.emit("done", Value::Null),
            JobStatus::Cancelled => self.emit("cancelled", Value::Null),
            _ => {}
        }
    }

    /// Publishes `job/<id>/<action>` with the job's name and kind merged into `extra`.
    fn emit(&self, action: &str, extra: Value) {
        let mut payload = crate::events::into_payload(extra);
        payload.insert("id".into(), json!(self.id));
        payload.insert("name".into(), json!(self.job.name()));
        payload.insert("kind".into(), json!(self.kind.as_label()));
        let topic = format!("job/{}/{}", self.id, action);
        if let Err(e) = self.bus.publish(&topic, Value::Object(payload)) {
            tracing::debug!(topic = %topic, error = %e, "job event not published");
        }
    }
}
