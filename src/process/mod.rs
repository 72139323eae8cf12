//! Process state machine: ordered steps driven one at a time.
//!
//! - [`Process`] control handle (`start`, `stop`, `next`, `reset`, `wait`, `snapshot`)
//! - [`Step`], [`StepContext`], [`StepDefinition`] what a step is and what it can reach
//! - [`StepTypes`] step type registry
//! - [`StepState`], [`StepResult`], [`ProcessStatus`] state vocabulary
//! - [`StepTimer`] countdown shared by a step's hooks and run loop

mod machine;
mod registry;
mod state;
mod step;
mod timer;

pub use machine::{Process, ProcessSnapshot};
pub use registry::{StepFactory, StepTypes};
pub use state::{ProcessStatus, StepResult, StepState};
pub use step::{Step, StepContext, StepDefinition};
pub use timer::StepTimer;
