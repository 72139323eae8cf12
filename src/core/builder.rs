use std::sync::Arc;
use std::time::Duration;

use super::{config::Config, runtime::Runtime, scheduler::Scheduler};
use crate::{
    error::RuntimeError,
    events::{EventBus, HandlerTable},
    jobs::{JobRef, StartupSequence},
    observers::{EventLog, FailureLog},
    process::StepTypes,
};

/// Builder assembling a [`Runtime`] from explicit registration tables.
///
/// Every component contributes what it needs up front: bus handler tables,
/// startup initializers, background jobs and step types. Nothing is discovered
/// by reflection.
pub struct RuntimeBuilder {
    cfg: Config,
    tables: Vec<HandlerTable>,
    startup: StartupSequence,
    periodic: Vec<(JobRef, Duration)>,
    jobs: Vec<JobRef>,
    types: StepTypes,
    failure_log: bool,
    event_log: bool,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            tables: Vec::new(),
            startup: StartupSequence::new(),
            periodic: Vec::new(),
            jobs: Vec::new(),
            types: StepTypes::new(),
            failure_log: false,
            event_log: false,
        }
    }

    /// Adds a component's handler table.
    pub fn with_handlers(mut self, table: HandlerTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Appends startup initializers.
    pub fn with_startup(mut self, seq: StartupSequence) -> Self {
        self.startup = self.startup.extend(seq);
        self
    }

    /// Adds a background job started after the startup sequence.
    pub fn with_periodic(mut self, job: JobRef, interval: Duration) -> Self {
        self.periodic.push((job, interval));
        self
    }

    /// Adds a one-shot job started after the startup sequence.
    pub fn with_job(mut self, job: JobRef) -> Self {
        self.jobs.push(job);
        self
    }

    /// Sets the step types processes may use.
    pub fn with_step_types(mut self, types: StepTypes) -> Self {
        self.types = types;
        self
    }

    /// Runs a [`FailureLog`] job that writes every job failure to the log.
    ///
    /// The observer does not count against [`Config::max_concurrent`].
    pub fn with_failure_log(mut self) -> Self {
        self.failure_log = true;
        self
    }

    /// Registers an [`EventLog`] tracing all bus traffic at DEBUG level.
    pub fn with_event_log(mut self) -> Self {
        self.event_log = true;
        self
    }

    /// Wires the bus and scheduler, runs the startup sequence and launches jobs.
    ///
    /// On a startup failure the scheduler is shut down before the error is returned.
    pub async fn start(self) -> Result<Runtime, RuntimeError> {
        let bus = EventBus::new(self.cfg.request_timeout);
        if self.event_log {
            bus.register_all(&EventLog::table())?;
        }
        for table in &self.tables {
            bus.register_all(table)?;
        }

        let scheduler = Scheduler::new(self.cfg, bus.clone());
        // Observers run outside the concurrency cap.
        if self.failure_log {
            scheduler.submit_supervisor(Arc::new(FailureLog::new(scheduler.failures().clone())))?;
        }

        tracing::info!(initializers = self.startup.len(), "running startup sequence");
        if let Err(e) = scheduler.run_startup_sequence(self.startup).await {
            scheduler.shutdown().await;
            return Err(e.into());
        }

        for (job, interval) in self.periodic {
            scheduler.schedule_periodic(job, interval)?;
        }
        for job in self.jobs {
            scheduler.submit(job)?;
        }
        tracing::info!(subscriptions = bus.len(), jobs = scheduler.jobs().len(), "runtime started");

        Ok(Runtime::new(bus, scheduler, Arc::new(self.types)))
    }
}
