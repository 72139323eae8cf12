//! # FailureLog: drains the failure queue into the log.
//!
//! Runs as a one-shot job for the lifetime of the runtime. Each queued
//! [`JobFailure`](crate::JobFailure) is written with `tracing::error!`; the
//! number of records evicted from a full queue is reported when it grows.

use async_trait::async_trait;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::jobs::{FailureQueue, Job};

/// Job that logs job failures until cancelled.
pub struct FailureLog {
    queue: FailureQueue,
}

impl FailureLog {
    /// Creates a logger draining `queue`.
    #[must_use]
    pub fn new(queue: FailureQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Job for FailureLog {
    fn name(&self) -> &str {
        "failure-log"
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        let mut dropped = self.queue.dropped();
        loop {
            let failure = select! {
                biased;
                _ = ctx.cancelled() => return Err(JobError::Canceled),
                f = self.queue.recv() => f,
            };
            tracing::error!(
                job = %failure.job,
                name = %failure.name,
                kind = failure.kind.as_label(),
                iteration = failure.iteration,
                error = %failure.error,
                "job failure"
            );

            let now = self.queue.dropped();
            if now > dropped {
                tracing::warn!(evicted = now - dropped, "failure queue overflowed");
                dropped = now;
            }
        }
    }
}
