//! # Events delivered to bus handlers.
//!
//! An [`Event`] is an immutable `(topic, payload)` pair stamped with a global
//! sequence number and a wall-clock timestamp. The payload is a keyword mapping
//! ([`Payload`], a JSON object).
//!
//! Events published with [`EventBus::request`](crate::EventBus::request) are
//! *correlated*: each dispatched copy carries a single-assignment result slot
//! which the handler fills with [`Event::respond`].
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Handlers run concurrently; use `seq` to restore publish order if needed.
//!
//! ## Example
//! ```rust
//! use brewvisor::{Event, Topic};
//! use serde_json::json;
//!
//! let ev = Event::new(Topic::parse("kettle/1/update").unwrap(), json!({"temp": 64.5}));
//! assert_eq!(ev.topic.as_str(), "kettle/1/update");
//! assert_eq!(ev.field::<f64>("temp"), Some(64.5));
//! assert!(!ev.is_correlated());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use super::topic::Topic;

/// Keyword payload carried by every event.
pub type Payload = Map<String, Value>;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Converts an arbitrary JSON value into a keyword payload.
///
/// - `null` becomes an empty mapping,
/// - an object is used as-is,
/// - any other value is wrapped as `{"value": v}`.
pub fn into_payload(value: Value) -> Payload {
    match value {
        Value::Null => Payload::new(),
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Single-assignment result slot of a correlated event.
#[derive(Clone, Debug)]
pub(crate) struct Responder {
    slot: Arc<Mutex<Option<oneshot::Sender<Value>>>>,
}

impl Responder {
    pub(crate) fn new(tx: oneshot::Sender<Value>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        }
    }

    fn respond(&self, value: Value) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

/// A published event as seen by a handler.
#[derive(Clone, Debug)]
pub struct Event {
    /// Concrete topic the event was published on.
    pub topic: Topic,
    /// Keyword payload (shared between all handlers of one publish).
    pub payload: Arc<Payload>,
    /// Global monotonic sequence number.
    pub seq: u64,
    /// Wall-clock publish time.
    pub at: SystemTime,
    responder: Option<Responder>,
}

impl Event {
    /// Creates an uncorrelated event with a fresh sequence number.
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self::from_shared(topic, Arc::new(into_payload(payload)))
    }

    pub(crate) fn from_shared(topic: Topic, payload: Arc<Payload>) -> Self {
        Self {
            topic,
            payload,
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            responder: None,
        }
    }

    pub(crate) fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Returns a payload value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Deserializes a payload value by key; `None` if absent or of the wrong shape.
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.payload
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns `true` if the publisher waits for a response.
    pub fn is_correlated(&self) -> bool {
        self.responder.is_some()
    }

    /// Fills the result slot of a correlated event.
    ///
    /// Returns `false` if the event is not correlated, a value was already
    /// given, or the publisher stopped waiting.
    pub fn respond(&self, value: impl Into<Value>) -> bool {
        match &self.responder {
            Some(r) => r.respond(value.into()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topic() -> Topic {
        Topic::parse("sensor/1/update").unwrap()
    }

    #[test]
    fn test_payload_conversion() {
        assert!(into_payload(Value::Null).is_empty());
        assert_eq!(into_payload(json!(3))["value"], json!(3));
        assert_eq!(into_payload(json!({"a": 1}))["a"], json!(1));
    }

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(topic(), Value::Null);
        let b = Event::new(topic(), Value::Null);
        assert!(b.seq > a.seq);
    }

    #[tokio::test]
    async fn test_respond_is_single_assignment() {
        let (tx, rx) = oneshot::channel();
        let ev = Event::new(topic(), Value::Null).with_responder(Responder::new(tx));
        let copy = ev.clone();

        assert!(ev.respond(json!("first")));
        assert!(!copy.respond(json!("second")));
        assert_eq!(rx.await.unwrap(), json!("first"));
    }

    #[test]
    fn test_respond_without_slot() {
        let ev = Event::new(topic(), json!({"x": true}));
        assert!(!ev.respond(1));
        assert_eq!(ev.field::<bool>("x"), Some(true));
        assert_eq!(ev.field::<String>("x"), None);
    }
}
