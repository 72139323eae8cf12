//! # Jobs: named, cancellable units of work.
//!
//! A [`Job`] has a stable [`name`](Job::name) and an async [`run`](Job::run)
//! that receives a [`CancellationToken`]. The scheduler calls `run` once for a
//! one-shot or startup job and once per iteration for a periodic job.
//!
//! [`JobFn`] wraps a closure `F: Fn(CancellationToken) -> Fut`, producing a
//! fresh future per run. Shared state between iterations goes in an explicit
//! `Arc<...>` inside the closure.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use brewvisor::{JobError, JobFn, JobRef};
//!
//! let j: JobRef = JobFn::arc("read-sensors", |ctx: CancellationToken| async move {
//!     if ctx.is_cancelled() {
//!         return Err(JobError::Canceled);
//!     }
//!     // poll hardware...
//!     Ok::<_, JobError>(())
//! });
//! assert_eq!(j.name(), "read-sensors");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// # Asynchronous, cancellable unit of work.
///
/// Implementors should check `ctx` at their await points and return
/// [`JobError::Canceled`] (or `Ok`) promptly once it fires.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Returns a stable, human-readable job name.
    fn name(&self) -> &str;

    /// Executes the job (or one iteration of a periodic job).
    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError>;
}

/// Shared handle to a job.
pub type JobRef = Arc<dyn Job>;

/// Function-backed job.
#[derive(Debug)]
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a new function-backed job.
    ///
    /// Prefer [`JobFn::arc`] when you immediately need a [`JobRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
