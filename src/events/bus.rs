//! # Topic-addressed event bus.
//!
//! [`EventBus`] dispatches events to every subscription whose [`TopicPattern`]
//! matches the published [`Topic`]. It supports two publishing modes:
//!
//! - [`publish`](EventBus::publish) (*fire-and-continue*): spawns one task per
//!   matching handler and returns immediately;
//! - [`request`](EventBus::request) (*fire-and-wait*): same dispatch, but every
//!   handler gets a result slot and the caller collects the values handlers put
//!   there, waiting at most a timeout.
//!
//! ## Architecture
//! ```text
//! publish("kettle/1/update", payload)
//!     │
//!     ├─ match against every pattern (segment-wise)
//!     ├─ remove matched `once` subscriptions (write lock)
//!     │
//!     ├──► spawn ──► handler A.handle(ev)  ─► Err / panic ─► warn!, isolated
//!     ├──► spawn ──► handler B.handle(ev)
//!     └──► spawn ──► handler N.handle(ev)
//! ```
//!
//! ## Rules
//! - **No ordering** between handlers of one publish.
//! - **Isolation**: a failing or panicking handler never affects the publisher
//!   or other handlers.
//! - **Short critical sections**: the registry lock is never held across an await.
//! - Dispatch requires a running tokio runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use futures::{FutureExt, StreamExt, stream::FuturesUnordered};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::{sync::oneshot, time};

use super::event::{Event, Responder, into_payload};
use super::handler::HandlerRef;
use super::table::{HandlerTable, Owner};
use super::topic::{Topic, TopicPattern};
use crate::error::BusError;
use crate::panic::panic_message;

/// Default wait of [`EventBus::request_default`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Identity of a registered subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    handler: HandlerRef,
    owner: Option<Owner>,
    once: bool,
}

/// Diagnostic view of one subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Subscription identity.
    pub id: SubscriptionId,
    /// Pattern as registered.
    pub pattern: String,
    /// Handler name.
    pub handler: String,
    /// Registering component, if registered through a table.
    pub owner: Option<Owner>,
    /// Removed after first delivery.
    pub once: bool,
}

/// Value returned by one handler of a correlated publish.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Name of the handler that responded.
    pub handler: String,
    /// The value it put in its result slot.
    pub value: Value,
}

/// Collected results of [`EventBus::request`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Responses {
    /// Responses keyed by subscription.
    pub results: BTreeMap<SubscriptionId, Response>,
    /// `true` if the wait ended because the timeout elapsed.
    pub timed_out: bool,
}

impl Responses {
    /// Number of handlers that responded.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if no handler responded.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the first response given by a handler with this name.
    pub fn by_handler(&self, name: &str) -> Option<&Value> {
        self.results
            .values()
            .find(|r| r.handler == name)
            .map(|r| &r.value)
    }
}

struct Inner {
    subs: RwLock<BTreeMap<SubscriptionId, Arc<Subscription>>>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

/// Topic-based publish/subscribe dispatcher.
///
/// Cheap to clone; all clones share one subscription registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.len())
            .field("request_timeout", &self.inner.request_timeout)
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus; `request_timeout` is used by [`request_default`](Self::request_default).
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                subs: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                request_timeout,
            }),
        }
    }

    /// Subscribes `handler` to `pattern`.
    pub fn register(
        &self,
        pattern: &str,
        handler: HandlerRef,
    ) -> Result<SubscriptionId, BusError> {
        let pattern = TopicPattern::parse(pattern)?;
        Ok(self.insert(pattern, handler, None, false))
    }

    /// Subscribes `handler` to `pattern` for a single delivery.
    pub fn register_once(
        &self,
        pattern: &str,
        handler: HandlerRef,
    ) -> Result<SubscriptionId, BusError> {
        let pattern = TopicPattern::parse(pattern)?;
        Ok(self.insert(pattern, handler, None, true))
    }

    /// Registers every entry of a component's handler table.
    ///
    /// All patterns are validated first; on error nothing is registered.
    /// Returned ids follow the table order.
    pub fn register_all(&self, table: &HandlerTable) -> Result<Vec<SubscriptionId>, BusError> {
        let parsed = table
            .entries()
            .iter()
            .map(|e| TopicPattern::parse(e.pattern.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let ids = parsed
            .into_iter()
            .zip(table.entries())
            .map(|(pattern, entry)| {
                self.insert(
                    pattern,
                    Arc::clone(&entry.handler),
                    Some(table.owner().clone()),
                    entry.once,
                )
            })
            .collect::<Vec<_>>();

        tracing::debug!(owner = %table.owner(), count = ids.len(), "handler table registered");
        Ok(ids)
    }

    fn insert(
        &self,
        pattern: TopicPattern,
        handler: HandlerRef,
        owner: Option<Owner>,
        once: bool,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, AtomicOrdering::Relaxed));
        let sub = Subscription {
            id,
            pattern,
            handler,
            owner,
            once,
        };
        self.inner.subs.write().insert(id, Arc::new(sub));
        id
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.inner.subs.write().remove(&id).is_some()
    }

    /// Removes every subscription registered by `owner`; returns how many were removed.
    pub fn unregister_owner(&self, owner: &Owner) -> usize {
        let mut subs = self.inner.subs.write();
        let before = subs.len();
        subs.retain(|_, s| s.owner.as_ref() != Some(owner));
        before - subs.len()
    }

    /// Snapshot of all current subscriptions, ordered by registration.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner
            .subs
            .read()
            .values()
            .map(|s| SubscriptionInfo {
                id: s.id,
                pattern: s.pattern.as_str().to_string(),
                handler: s.handler.name().to_string(),
                owner: s.owner.clone(),
                once: s.once,
            })
            .collect()
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.inner.subs.read().len()
    }

    /// Returns `true` if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait used by [`request_default`](Self::request_default).
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Fire-and-continue publish.
    ///
    /// Returns the number of handlers scheduled. Handler results are not observed
    /// by the caller; failures are logged.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<usize, BusError> {
        let topic = Topic::parse(topic)?;
        let matched = self.take_matching(&topic);
        let event = Event::from_shared(topic, Arc::new(into_payload(payload)));

        let count = matched.len();
        for sub in matched {
            Self::dispatch(sub, event.clone());
        }
        Ok(count)
    }

    /// Fire-and-wait publish.
    ///
    /// Every matching handler receives a correlated event. Values given through
    /// [`Event::respond`] are collected until all handlers finished or `timeout`
    /// elapsed, whichever comes first. Handlers that finish without responding
    /// contribute nothing. With no matching handler the call returns immediately.
    pub async fn request(
        &self,
        topic: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Responses, BusError> {
        let topic = Topic::parse(topic)?;
        let matched = self.take_matching(&topic);
        let event = Event::from_shared(topic, Arc::new(into_payload(payload)));

        let mut responses = Responses::default();
        if matched.is_empty() {
            return Ok(responses);
        }

        let mut pending = FuturesUnordered::new();
        for sub in matched {
            let (tx, rx) = oneshot::channel();
            let id = sub.id;
            let handler = sub.handler.name().to_string();
            Self::dispatch(sub, event.clone().with_responder(Responder::new(tx)));
            pending.push(async move { (id, handler, rx.await.ok()) });
        }

        let collect = async {
            while let Some((id, handler, value)) = pending.next().await {
                if let Some(value) = value {
                    responses.results.insert(id, Response { handler, value });
                }
            }
        };
        let finished = time::timeout(timeout, collect).await.is_ok();
        responses.timed_out = !finished;
        Ok(responses)
    }

    /// [`request`](Self::request) with the bus default timeout.
    pub async fn request_default(&self, topic: &str, payload: Value) -> Result<Responses, BusError> {
        self.request(topic, payload, self.inner.request_timeout).await
    }

    /// Collects matching subscriptions and removes matched `once` entries.
    ///
    /// A `once` subscription is dispatched only by the caller that removed it.
    fn take_matching(&self, topic: &Topic) -> Vec<Arc<Subscription>> {
        let mut matched: Vec<Arc<Subscription>> = self
            .inner
            .subs
            .read()
            .values()
            .filter(|s| s.pattern.matches(topic))
            .cloned()
            .collect();

        if matched.iter().any(|s| s.once) {
            let mut subs = self.inner.subs.write();
            matched.retain(|s| !s.once || subs.remove(&s.id).is_some());
        }
        matched
    }

    fn dispatch(sub: Arc<Subscription>, event: Event) {
        tokio::spawn(async move {
            let topic = event.topic.clone();
            let fut = sub.handler.handle(event);

            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        handler = sub.handler.name(),
                        subscription = %sub.id,
                        topic = %topic,
                        error = %e,
                        "handler failed"
                    );
                }
                Err(panic_err) => {
                    tracing::warn!(
                        handler = sub.handler.name(),
                        subscription = %sub.id,
                        topic = %topic,
                        panic = %panic_message(&*panic_err),
                        "handler panicked"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::HandlerError;
    use crate::events::handler::HandlerFn;

    fn recorder(name: &'static str, tx: mpsc::UnboundedSender<String>) -> HandlerRef {
        HandlerFn::arc(name, move |_ev: Event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(name.to_string());
                Ok::<_, HandlerError>(())
            }
        })
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<String>, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(rx.recv().await.unwrap());
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_publish_matches_wildcards() {
        let bus = EventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for (pattern, name) in [
            ("a/b/c", "exact"),
            ("a/+/c", "single_mid"),
            ("a/b/+", "single_end"),
            ("a/#", "multi"),
            ("#", "all"),
            ("a/b", "short"),
            ("x/b/c", "other"),
        ] {
            bus.register(pattern, recorder(name, tx.clone())).unwrap();
        }

        let n = bus.publish("a/b/c", Value::Null).unwrap();
        assert_eq!(n, 5);
        let got = drain(&mut rx, 5).await;
        assert_eq!(got, vec!["all", "exact", "multi", "single_end", "single_mid"]);

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected() {
        let bus = EventBus::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = bus.register("a/#/b", recorder("h", tx)).unwrap_err();
        assert!(matches!(err, BusError::InvalidPattern { .. }));
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_register_all_is_all_or_nothing() {
        let bus = EventBus::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let table = HandlerTable::new("ui")
            .on("a/+", recorder("ok", tx.clone()))
            .on("a/#/b", recorder("bad", tx));
        assert!(bus.register_all(&table).is_err());
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_owner() {
        let bus = EventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let table = HandlerTable::new("ui")
            .on("a/+", recorder("one", tx.clone()))
            .on("a/#", recorder("two", tx.clone()));
        let ids = bus.register_all(&table).unwrap();
        assert_eq!(ids.len(), 2);
        bus.register("a/b", recorder("keep", tx)).unwrap();

        assert_eq!(bus.unregister_owner(&Owner::new("ui")), 2);
        assert!(!bus.unregister(ids[0]));

        assert_eq!(bus.publish("a/b", Value::Null).unwrap(), 1);
        assert_eq!(drain(&mut rx, 1).await, vec!["keep"]);
    }

    #[tokio::test]
    async fn test_once_delivers_once() {
        let bus = EventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.register_once("ready", recorder("once", tx)).unwrap();

        assert_eq!(bus.publish("ready", Value::Null).unwrap(), 1);
        assert_eq!(bus.publish("ready", Value::Null).unwrap(), 0);
        assert_eq!(drain(&mut rx, 1).await, vec!["once"]);
        assert!(bus.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_request_without_handlers_returns_empty() {
        let bus = EventBus::default();
        let res = bus
            .request("nobody/listens", Value::Null, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(res.is_empty());
        assert!(!res.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_collects_and_times_out() {
        let bus = EventBus::default();
        bus.register(
            "kettle/+/target",
            HandlerFn::arc("fast", |ev: Event| async move {
                ev.respond(json!({"ok": true}));
                Ok::<_, HandlerError>(())
            }),
        )
        .unwrap();
        bus.register(
            "kettle/#",
            HandlerFn::arc("slow", |ev: Event| async move {
                time::sleep(Duration::from_secs(10)).await;
                ev.respond("late");
                Ok::<_, HandlerError>(())
            }),
        )
        .unwrap();
        bus.register(
            "kettle/1/target",
            HandlerFn::arc("silent", |_ev: Event| async move { Ok::<_, HandlerError>(()) }),
        )
        .unwrap();

        let res = bus
            .request("kettle/1/target", json!({"temp": 66}), Duration::from_millis(500))
            .await
            .unwrap();
        assert!(res.timed_out);
        assert_eq!(res.len(), 1);
        assert_eq!(res.by_handler("fast"), Some(&json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_request_finishes_early_when_all_done() {
        let bus = EventBus::default();
        bus.register(
            "q",
            HandlerFn::arc("a", |ev: Event| async move {
                ev.respond(1);
                Ok::<_, HandlerError>(())
            }),
        )
        .unwrap();
        let res = bus.request_default("q", Value::Null).await.unwrap();
        assert!(!res.timed_out);
        assert_eq!(res.by_handler("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_handler_failures_are_isolated() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.register(
            "t",
            HandlerFn::arc("err", |_ev: Event| async move { Err::<(), _>(HandlerError::from("nope")) }),
        )
        .unwrap();
        bus.register(
            "t",
            HandlerFn::arc("panic", |_ev: Event| async move {
                if true {
                    panic!("boom");
                }
                Ok::<_, HandlerError>(())
            }),
        )
        .unwrap();
        let h = Arc::clone(&hits);
        bus.register(
            "t",
            HandlerFn::arc("ok", move |ev: Event| {
                let h = Arc::clone(&h);
                async move {
                    h.fetch_add(1, AtomicOrdering::SeqCst);
                    ev.respond("fine");
                    Ok::<_, HandlerError>(())
                }
            }),
        )
        .unwrap();

        let res = bus
            .request("t", Value::Null, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!res.timed_out);
        assert_eq!(res.len(), 1);
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);

        assert_eq!(bus.publish("t", Value::Null).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_subscriptions_dump() {
        let bus = EventBus::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let table = HandlerTable::new("sensors").once("sensor/#", recorder("s", tx));
        bus.register_all(&table).unwrap();

        let dump = bus.subscriptions();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].pattern, "sensor/#");
        assert_eq!(dump[0].handler, "s");
        assert_eq!(dump[0].owner, Some(Owner::new("sensors")));
        assert!(dump[0].once);
    }
}
