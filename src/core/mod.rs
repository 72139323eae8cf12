//! Runtime core: scheduling, wiring and lifecycle.
//!
//! Public entry points are [`Scheduler`], [`Runtime`] / [`RuntimeBuilder`] and
//! [`Config`].
//!
//! Internal modules:
//! - [`runner`]: executes one job call with a child token and panic capture;
//! - [`actor`]: drives one job through PENDING → RUNNING → terminal;
//! - [`scheduler`]: tracks jobs, cancellation, startup sequence and shutdown;
//! - [`builder`]: assembles a [`Runtime`] from explicit registration tables;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod actor;
mod builder;
pub(crate) mod config;
mod runner;
mod runtime;
mod scheduler;
mod shutdown;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use runtime::Runtime;
pub use scheduler::Scheduler;
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
