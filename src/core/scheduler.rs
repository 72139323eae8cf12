//! # Scheduler: lifecycle of concurrently running jobs.
//!
//! [`Scheduler`] owns every job the host runs: one-shot jobs, periodic
//! background jobs and the ordered startup initializers. Each job runs in a
//! [`JobActor`] task with its own cancellation token (a child of the scheduler
//! token) and a `watch` channel carrying its [`JobState`].
//!
//! ## Architecture
//! ```text
//! submit / schedule_periodic / run_startup_sequence
//!          │
//!          ▼
//! ┌────────────────────────────────────────────┐
//! │ Scheduler                                  │
//! │  jobs: JobId ─► { token, state rx, join }  │──► JobActor ──► job.run(ctx)
//! │  semaphore (optional, max_concurrent)      │        │
//! │  failures: FailureQueue                    │◄───────┘ failures
//! └────────────────────────────────────────────┘
//!          │ job/<id>/started|done|failed|cancelled
//!          ▼
//!       EventBus
//! ```
//!
//! ## Rules
//! - Records stay until [`acknowledge`](Scheduler::acknowledge) removes a finished job.
//! - [`cancel`](Scheduler::cancel) is cooperative; it returns once the job is terminal.
//! - After [`shutdown`](Scheduler::shutdown) no job is RUNNING and submissions fail.
//! - The registry lock is never held across an await.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::actor::{JobActor, StateTx};
use super::config::Config;
use crate::{
    error::{SchedulerError, StartupError},
    events::EventBus,
    jobs::{
        FailureQueue, JobId, JobInfo, JobKind, JobRef, JobState, JobStatus, StartupSequence,
    },
};

/// Handle to a tracked job.
struct JobEntry {
    name: String,
    kind: JobKind,
    cancel: CancellationToken,
    state: watch::Receiver<JobState>,
    join: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn info(&self, id: JobId) -> JobInfo {
        JobInfo {
            id,
            name: self.name.clone(),
            kind: self.kind,
            state: self.state.borrow().clone(),
        }
    }

    fn is_terminal(&self) -> bool {
        self.state.borrow().status.is_terminal()
    }
}

#[derive(Default)]
struct Registry {
    closed: bool,
    jobs: BTreeMap<JobId, JobEntry>,
}

/// Concurrent job scheduler.
///
/// Created behind an `Arc` so jobs (e.g. the process supervisor) can submit
/// further jobs.
pub struct Scheduler {
    cfg: Config,
    bus: EventBus,
    failures: FailureQueue,
    semaphore: Option<Arc<Semaphore>>,
    registry: Mutex<Registry>,
    runtime_token: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler publishing lifecycle events on `bus`.
    pub fn new(cfg: Config, bus: EventBus) -> Arc<Self> {
        let semaphore = cfg.concurrency_limit().map(|n| Arc::new(Semaphore::new(n)));
        let failures = FailureQueue::new(cfg.failure_capacity_clamped());
        Arc::new(Self {
            cfg,
            bus,
            failures,
            semaphore,
            registry: Mutex::new(Registry::default()),
            runtime_token: CancellationToken::new(),
        })
    }

    /// Submits a one-shot job.
    pub fn submit(&self, job: JobRef) -> Result<JobId, SchedulerError> {
        self.spawn(job, JobKind::OneShot)
    }

    /// Schedules `job` to run, sleep `interval`, and run again until cancelled.
    ///
    /// A failed iteration is reported and the schedule continues; a fatal error
    /// ends the job as FAILED.
    pub fn schedule_periodic(
        &self,
        job: JobRef,
        interval: Duration,
    ) -> Result<JobId, SchedulerError> {
        self.spawn(job, JobKind::Periodic { interval })
    }

    /// Runs the initializers one after another, ascending by order key.
    ///
    /// Each initializer is tracked as a `Startup` job. The first one that does
    /// not finish DONE aborts the sequence.
    pub async fn run_startup_sequence(&self, seq: StartupSequence) -> Result<(), StartupError> {
        for init in seq.ordered() {
            let name = init.job.name().to_string();
            let order = init.order;
            tracing::info!(initializer = %name, order, "running startup initializer");

            let id = self.spawn(init.job, JobKind::Startup { order })?;
            let state = self.wait(id).await.unwrap_or_default();
            if state.status != JobStatus::Done {
                let error = state
                    .last_error
                    .unwrap_or_else(|| state.status.as_label().to_string());
                tracing::error!(initializer = %name, order, error = %error, "startup aborted");
                return Err(StartupError::Failed { name, order, error });
            }
        }
        Ok(())
    }

    /// Submits a one-shot job that does not take a concurrency slot.
    ///
    /// Used for process supervisors and built-in observers.
    pub(crate) fn submit_supervisor(&self, job: JobRef) -> Result<JobId, SchedulerError> {
        self.spawn_with(job, JobKind::OneShot, None)
    }

    fn spawn(&self, job: JobRef, kind: JobKind) -> Result<JobId, SchedulerError> {
        self.spawn_with(job, kind, self.semaphore.clone())
    }

    fn spawn_with(
        &self,
        job: JobRef,
        kind: JobKind,
        semaphore: Option<Arc<Semaphore>>,
    ) -> Result<JobId, SchedulerError> {
        let mut reg = self.registry.lock();
        if reg.closed {
            return Err(SchedulerError::Closed {
                job: job.name().to_string(),
            });
        }

        let id = JobId::next();
        let name = job.name().to_string();
        let cancel = self.runtime_token.child_token();
        let (tx, rx) = watch::channel(JobState::default());
        let actor = JobActor {
            id,
            kind,
            job,
            bus: self.bus.clone(),
            failures: self.failures.clone(),
            semaphore,
            state: StateTx::new(tx),
        };
        let join = tokio::spawn(actor.run(cancel.clone()));

        tracing::debug!(job = %id, name = %name, kind = kind.as_label(), "job scheduled");
        reg.jobs.insert(
            id,
            JobEntry {
                name,
                kind,
                cancel,
                state: rx,
                join: Some(join),
            },
        );
        Ok(id)
    }

    /// Requests cancellation and waits until the job is terminal.
    ///
    /// Returns `false` if the job is unknown or already finished.
    pub async fn cancel(&self, id: JobId) -> bool {
        let Some(mut rx) = self.request_cancel_inner(id) else {
            return false;
        };
        let _ = rx.wait_for(|s| s.status.is_terminal()).await;
        true
    }

    /// Requests cancellation without waiting. Returns `false` if there was nothing to cancel.
    pub fn request_cancel(&self, id: JobId) -> bool {
        self.request_cancel_inner(id).is_some()
    }

    fn request_cancel_inner(&self, id: JobId) -> Option<watch::Receiver<JobState>> {
        let reg = self.registry.lock();
        let entry = reg.jobs.get(&id)?;
        if entry.is_terminal() {
            return None;
        }
        tracing::debug!(job = %id, name = %entry.name, "job cancel requested");
        entry.cancel.cancel();
        Some(entry.state.clone())
    }

    /// Waits until the job is terminal and returns its final state.
    pub async fn wait(&self, id: JobId) -> Option<JobState> {
        let mut rx = self.registry.lock().jobs.get(&id)?.state.clone();
        let terminal = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|s| s.clone());
        Some(terminal.unwrap_or_else(|_| rx.borrow().clone()))
    }

    /// Current status of a job.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.registry
            .lock()
            .jobs
            .get(&id)
            .map(|e| e.state.borrow().status)
    }

    /// Snapshot of one job.
    pub fn info(&self, id: JobId) -> Option<JobInfo> {
        self.registry.lock().jobs.get(&id).map(|e| e.info(id))
    }

    /// Snapshot of all tracked jobs, ordered by id.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.registry
            .lock()
            .jobs
            .iter()
            .map(|(id, e)| e.info(*id))
            .collect()
    }

    /// Returns `true` if a non-terminal job with this name exists.
    pub fn is_running(&self, name: &str) -> bool {
        self.registry
            .lock()
            .jobs
            .values()
            .any(|e| e.name == name && !e.is_terminal())
    }

    /// Removes the record of a finished job. Returns `false` if unknown or still active.
    pub fn acknowledge(&self, id: JobId) -> bool {
        let mut reg = self.registry.lock();
        match reg.jobs.get(&id) {
            Some(e) if e.is_terminal() => {
                reg.jobs.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Closes the scheduler, cancels every job and waits for all of them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<(JobId, JoinHandle<()>)> = {
            let mut reg = self.registry.lock();
            reg.closed = true;
            reg.jobs
                .iter_mut()
                .filter_map(|(id, e)| e.join.take().map(|h| (*id, h)))
                .collect()
        };
        tracing::info!(jobs = handles.len(), "scheduler shutting down");
        self.runtime_token.cancel();

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(job = %id, error = %e, "job task did not exit cleanly");
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has started.
    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// The failure queue shared by all jobs.
    pub fn failures(&self) -> &FailureQueue {
        &self.failures
    }

    /// The bus lifecycle events are published on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The configuration the scheduler was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Token cancelled when the scheduler shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.runtime_token.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

    use tokio::time;

    use super::*;
    use crate::error::JobError;
    use crate::jobs::JobFn;

    fn scheduler() -> Arc<Scheduler> {
        Scheduler::new(Config::default(), EventBus::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_periodic_stops_iterations() {
        let sched = scheduler();
        let runs = Arc::new(AtomicU64::new(0));
        let r = Arc::clone(&runs);
        let id = sched
            .schedule_periodic(
                JobFn::arc("poll", move |_ctx: CancellationToken| {
                    let r = Arc::clone(&r);
                    async move {
                        r.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok::<_, JobError>(())
                    }
                }),
                Duration::from_secs(1),
            )
            .unwrap();

        time::sleep(Duration::from_millis(3500)).await;
        assert!(sched.cancel(id).await);
        let seen = runs.load(AtomicOrdering::SeqCst);
        assert_eq!(seen, 4);
        assert_eq!(sched.status(id), Some(JobStatus::Cancelled));

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(AtomicOrdering::SeqCst), seen);
        assert!(!sched.cancel(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_failure_does_not_stop_schedule() {
        let sched = scheduler();
        let runs = Arc::new(AtomicU64::new(0));
        let r = Arc::clone(&runs);
        let id = sched
            .schedule_periodic(
                JobFn::arc("flaky", move |_ctx: CancellationToken| {
                    let r = Arc::clone(&r);
                    async move {
                        let n = r.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                        if n == 2 {
                            return Err(JobError::fail("sensor timeout"));
                        }
                        Ok(())
                    }
                }),
                Duration::from_millis(100),
            )
            .unwrap();

        time::sleep(Duration::from_millis(450)).await;
        assert!(runs.load(AtomicOrdering::SeqCst) >= 3);
        assert_eq!(sched.status(id), Some(JobStatus::Running));

        let failures = sched.failures().drain();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].iteration, 2);
        assert_eq!(failures[0].job, id);
        assert_eq!(
            sched.info(id).unwrap().state.last_error.as_deref(),
            Some("execution failed: sensor timeout")
        );
        sched.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_fatal_error_ends_job() {
        let sched = scheduler();
        let id = sched
            .schedule_periodic(
                JobFn::arc("broken", |_ctx: CancellationToken| async {
                    Err::<(), _>(JobError::fatal("device removed"))
                }),
                Duration::from_millis(100),
            )
            .unwrap();
        let state = sched.wait(id).await.unwrap();
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.iterations, 1);
        assert_eq!(sched.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_finished_job_is_noop() {
        let sched = scheduler();
        let id = sched
            .submit(JobFn::arc("quick", |_ctx: CancellationToken| async {
                Ok::<_, JobError>(())
            }))
            .unwrap();
        let state = sched.wait(id).await.unwrap();
        assert_eq!(state.status, JobStatus::Done);
        assert!(!sched.cancel(id).await);
        assert!(!sched.request_cancel(id));
        assert!(sched.acknowledge(id));
        assert!(sched.status(id).is_none());
        assert!(!sched.cancel(id).await);
    }

    #[tokio::test]
    async fn test_one_shot_failure_is_reported() {
        let sched = scheduler();
        let id = sched
            .submit(JobFn::arc("bad", |_ctx: CancellationToken| async {
                Err::<(), _>(JobError::fail("no mash tun"))
            }))
            .unwrap();
        assert_eq!(sched.wait(id).await.unwrap().status, JobStatus::Failed);
        let f = sched.failures().try_pop().unwrap();
        assert_eq!(f.name, "bad");
        assert_eq!(f.error, JobError::fail("no mash tun"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let sched = scheduler();
        let cleaned = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let c = Arc::clone(&cleaned);
            sched
                .submit(JobFn::arc(format!("worker-{i}"), move |ctx: CancellationToken| {
                    let c = Arc::clone(&c);
                    async move {
                        ctx.cancelled().await;
                        c.fetch_add(1, AtomicOrdering::SeqCst);
                        Err::<(), _>(JobError::Canceled)
                    }
                }))
                .unwrap();
        }
        sched
            .schedule_periodic(
                JobFn::arc("tick", |_ctx: CancellationToken| async { Ok::<_, JobError>(()) }),
                Duration::from_millis(5),
            )
            .unwrap();
        assert!(sched.is_running("worker-1"));

        sched.shutdown().await;
        assert_eq!(cleaned.load(AtomicOrdering::SeqCst), 3);
        assert!(sched.jobs().iter().all(|j| j.state.status.is_terminal()));
        assert!(!sched.is_running("worker-1"));

        let err = sched
            .submit(JobFn::arc("late", |_ctx: CancellationToken| async {
                Ok::<_, JobError>(())
            }))
            .unwrap_err();
        assert_eq!(err.as_label(), "scheduler_closed");
    }

    #[tokio::test]
    async fn test_startup_sequence_order_and_abort() {
        let sched = scheduler();
        let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let step = |name: &'static str, fail: bool| {
            let log = Arc::clone(&log);
            JobFn::arc(name, move |_ctx: CancellationToken| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(name);
                    if fail {
                        Err(JobError::fail("missing config"))
                    } else {
                        Ok(())
                    }
                }
            })
        };
        let seq = StartupSequence::new()
            .add(20, step("plugins", false))
            .add(0, step("db", false))
            .add(10, step("config", true))
            .add(10, step("never", false));

        let err = sched.run_startup_sequence(seq).await.unwrap_err();
        match err {
            StartupError::Failed { name, order, error } => {
                assert_eq!(name, "config");
                assert_eq!(order, 10);
                assert_eq!(error, "execution failed: missing config");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*log.lock(), vec!["db", "config"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_keeps_jobs_pending() {
        let sched = Scheduler::new(
            Config {
                max_concurrent: 1,
                ..Config::default()
            },
            EventBus::default(),
        );
        let long = sched
            .submit(JobFn::arc("long", |ctx: CancellationToken| async move {
                ctx.cancelled().await;
                Err::<(), _>(JobError::Canceled)
            }))
            .unwrap();
        let queued = sched
            .submit(JobFn::arc("queued", |_ctx: CancellationToken| async {
                Ok::<_, JobError>(())
            }))
            .unwrap();

        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sched.status(long), Some(JobStatus::Running));
        assert_eq!(sched.status(queued), Some(JobStatus::Pending));

        assert!(sched.cancel(long).await);
        assert_eq!(sched.wait(queued).await.unwrap().status, JobStatus::Done);
    }
}
