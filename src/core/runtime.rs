//! # Runtime: the assembled orchestration engine.
//!
//! ```text
//! RuntimeBuilder::start()
//!     ├─► EventBus      (handler tables registered)
//!     ├─► Scheduler     (startup sequence done, background jobs running)
//!     └─► StepTypes     (for Runtime::process)
//!
//! run_until_signal()
//!     └─► wait_for_shutdown_signal() ─► Scheduler::shutdown()
//! ```

use std::sync::Arc;

use super::{
    scheduler::Scheduler,
    shutdown::{ShutdownSignal, wait_for_shutdown_signal},
};
use crate::{
    error::{ProcessError, RuntimeError},
    events::EventBus,
    process::{Process, StepDefinition, StepTypes},
};

/// Running engine: one bus, one scheduler, the registered step types.
#[derive(Clone)]
pub struct Runtime {
    bus: EventBus,
    scheduler: Arc<Scheduler>,
    types: Arc<StepTypes>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("bus", &self.bus)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub(crate) fn new(bus: EventBus, scheduler: Arc<Scheduler>, types: Arc<StepTypes>) -> Self {
        Self {
            bus,
            scheduler,
            types,
        }
    }

    /// The event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The job scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Registered step types.
    pub fn step_types(&self) -> &Arc<StepTypes> {
        &self.types
    }

    /// Defines a process over `steps` using the registered step types.
    pub fn process(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> Result<Process, ProcessError> {
        Process::new(
            id,
            name,
            steps,
            Arc::clone(&self.types),
            Arc::clone(&self.scheduler),
        )
    }

    /// Cancels every job and waits for all of them to exit.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Runs until a termination signal arrives, then shuts down.
    pub async fn run_until_signal(&self) -> Result<ShutdownSignal, RuntimeError> {
        let signal = wait_for_shutdown_signal().await?;
        self.shutdown().await;
        Ok(signal)
    }
}
