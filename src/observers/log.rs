//! # EventLog: structured bus tracer.
//!
//! A handler that writes every event it receives to `tracing` at DEBUG level.
//! Register it on `#` to trace all non-system traffic, or on a narrower
//! pattern.
//!
//! ## Example output
//! ```text
//! DEBUG brewvisor::observers::log: event topic=job/3/started seq=41 payload={"id":3,"iteration":1,...}
//! DEBUG brewvisor::observers::log: event topic=step/mash/update seq=42 payload={"id":"mash",...}
//! ```

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::{Event, Handler, HandlerTable};

/// Event tracing handler.
#[derive(Default)]
pub struct EventLog;

impl EventLog {
    /// Construct a new [`EventLog`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Registration table tracing every non-system topic.
    pub fn table() -> HandlerTable {
        HandlerTable::new("event-log").on("#", std::sync::Arc::new(EventLog))
    }
}

#[async_trait]
impl Handler for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        tracing::debug!(
            topic = %event.topic,
            seq = event.seq,
            payload = %serde_json::Value::Object((*event.payload).clone()),
            "event"
        );
        Ok(())
    }
}
