//! Built-in observers: tracing of bus traffic and of job failures.

mod failures;
mod log;

pub use failures::FailureLog;
pub use log::EventLog;
