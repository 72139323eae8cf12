//! Job definitions: the work units hosted by the scheduler.
//!
//! - [`Job`], [`JobFn`], [`JobRef`] what runs
//! - [`JobKind`], [`JobId`], [`JobStatus`], [`JobInfo`] how it runs and where it is
//! - [`FailureQueue`], [`JobFailure`] bounded failure reporting
//! - [`StartupSequence`] ordered initializers

mod failure;
mod job;
mod spec;
mod startup;

pub use failure::{FailureQueue, JobFailure};
pub use job::{Job, JobFn, JobRef};
pub use spec::{JobId, JobInfo, JobKind, JobState, JobStatus};
pub use startup::{Initializer, StartupSequence};
