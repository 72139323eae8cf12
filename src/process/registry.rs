//! # Step type registry.
//!
//! Maps step type names to factories. The process creates a fresh instance
//! for every activation, so steps never carry state across runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::step::{Step, StepDefinition};
use crate::error::StepError;

/// Builds a step instance from its definition.
pub type StepFactory =
    Arc<dyn Fn(&StepDefinition) -> Result<Arc<dyn Step>, StepError> + Send + Sync>;

/// Registered step implementations, keyed by type name.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use brewvisor::{Step, StepContext, StepError, StepResult, StepTypes};
///
/// struct Notify;
///
/// #[async_trait]
/// impl Step for Notify {
///     async fn run(&self, _ctx: &StepContext) -> Result<StepResult, StepError> {
///         Ok(StepResult::Next)
///     }
/// }
///
/// let types = StepTypes::new().with("notify", |_def| Ok(Arc::new(Notify)));
/// assert!(types.contains("notify"));
/// ```
#[derive(Clone, Default)]
pub struct StepTypes {
    factories: BTreeMap<String, StepFactory>,
}

impl StepTypes {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory (builder style).
    #[must_use]
    pub fn with<F, S>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&StepDefinition) -> Result<Arc<S>, StepError> + Send + Sync + 'static,
        S: Step,
    {
        self.register(kind, factory);
        self
    }

    /// Registers a factory, replacing any previous one for `kind`.
    pub fn register<F, S>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StepDefinition) -> Result<Arc<S>, StepError> + Send + Sync + 'static,
        S: Step,
    {
        let factory: StepFactory = Arc::new(move |def: &StepDefinition| {
            factory(def).map(|s| s as Arc<dyn Step>)
        });
        self.factories.insert(kind.into(), factory);
    }

    /// Returns `true` if `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Creates a step instance for `def`.
    pub fn create(&self, def: &StepDefinition) -> Result<Arc<dyn Step>, StepError> {
        match self.factories.get(&def.kind) {
            Some(factory) => factory(def),
            None => Err(StepError::new(format!("unknown step type {:?}", def.kind))),
        }
    }
}

impl fmt::Debug for StepTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
