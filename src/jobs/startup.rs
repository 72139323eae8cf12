//! # Ordered startup initializers.
//!
//! A [`StartupSequence`] is the explicit list of initializers the host runs
//! before anything else. The scheduler executes them strictly ascending by
//! order key; initializers with equal keys keep insertion order.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::job::{JobFn, JobRef};
use crate::error::JobError;

/// One initializer with its order key.
#[derive(Clone)]
pub struct Initializer {
    /// Order key (ascending).
    pub order: i64,
    /// The work to run.
    pub job: JobRef,
}

/// Builder for the startup sequence.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use brewvisor::{JobError, StartupSequence};
///
/// let seq = StartupSequence::new()
///     .add_fn(10, "load-config", |_ctx: CancellationToken| async { Ok::<_, JobError>(()) })
///     .add_fn(0, "open-db", |_ctx: CancellationToken| async { Ok::<_, JobError>(()) });
///
/// let names: Vec<_> = seq.ordered().iter().map(|i| i.job.name().to_string()).collect();
/// assert_eq!(names, ["open-db", "load-config"]);
/// ```
#[derive(Clone, Default)]
pub struct StartupSequence {
    items: Vec<Initializer>,
}

impl StartupSequence {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an initializer.
    #[must_use]
    pub fn add(mut self, order: i64, job: JobRef) -> Self {
        self.items.push(Initializer { order, job });
        self
    }

    /// Adds a closure-backed initializer.
    #[must_use]
    pub fn add_fn<F, Fut>(self, order: i64, name: &'static str, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.add(order, JobFn::arc(name, f))
    }

    /// Appends all initializers of `other`.
    #[must_use]
    pub fn extend(mut self, other: StartupSequence) -> Self {
        self.items.extend(other.items);
        self
    }

    /// Returns the initializers in execution order (stable sort by order key).
    pub fn ordered(&self) -> Vec<Initializer> {
        let mut items = self.items.clone();
        items.sort_by_key(|i| i.order);
        items
    }

    /// Number of initializers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no initializers.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
