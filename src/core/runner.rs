//! # Run a single execution of a job.
//!
//! Executes one call of [`Job::run`] with a child cancellation token and
//! converts a panic into a [`JobError::Fail`].
//!
//! ## Rules
//! - Derives a **child token** per execution (isolated cancellation)
//! - Child cancellation does **not** affect the parent
//! - A panic never escapes: it becomes `Fail { error: "panic: …" }`

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{error::JobError, jobs::Job, panic::panic_message};

/// Executes `job` once under a child of `parent`.
pub async fn run_once<J: Job + ?Sized>(job: &J, parent: &CancellationToken) -> Result<(), JobError> {
    let child = parent.child_token();

    match AssertUnwindSafe(job.run(child)).catch_unwind().await {
        Ok(res) => res,
        Err(panic_err) => Err(JobError::Fail {
            error: format!("panic: {}", panic_message(&*panic_err)),
        }),
    }
}
