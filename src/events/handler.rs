//! # Bus handlers.
//!
//! [`Handler`] is the callable side of a subscription. The bus holds handlers
//! as shared references ([`HandlerRef`]); it never owns the component that
//! created them.
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Event) -> Fut`, producing a fresh
//! future per dispatch.
//!
//! ## Example
//! ```rust
//! use brewvisor::{Event, HandlerError, HandlerFn, HandlerRef};
//!
//! let h: HandlerRef = HandlerFn::arc("kettle-watch", |ev: Event| async move {
//!     let _temp: Option<f64> = ev.field("temp");
//!     Ok::<_, HandlerError>(())
//! });
//! assert_eq!(h.name(), "kettle-watch");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::event::Event;
use crate::error::HandlerError;

/// Async callable invoked for every event whose topic matches its subscription.
///
/// Implementations may fill the result slot of a correlated event with
/// [`Event::respond`]. Errors and panics are caught and logged by the bus.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Returns a stable, human-readable handler name.
    fn name(&self) -> &str;

    /// Handles one event.
    async fn handle(&self, event: Event) -> Result<(), HandlerError>;
}

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;

/// Function-backed handler.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        (self.f)(event).await
    }
}
