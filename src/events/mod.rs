//! Event bus: topics, events, handlers and registration tables.
//!
//! ## Contents
//! - [`Topic`], [`TopicPattern`] concrete topics and wildcard subscription patterns
//! - [`Event`], [`Payload`] what handlers receive
//! - [`Handler`], [`HandlerFn`] the callable side of a subscription
//! - [`HandlerTable`], [`Owner`] explicit per-component registration lists
//! - [`EventBus`] the dispatcher (fire-and-continue and fire-and-wait)
//!
//! ## Quick reference
//! - **Publishers**: the scheduler (`job/<id>/…`), process machine
//!   (`step/…`, `process/<id>/update`), device jobs (`<kind>/<id>/update`),
//!   and any application code.
//! - **Consumers**: persistence, UI push and notification layers registering tables.

mod bus;
mod event;
mod handler;
mod table;
mod topic;

pub use bus::{
    DEFAULT_REQUEST_TIMEOUT, EventBus, Response, Responses, SubscriptionId, SubscriptionInfo,
};
pub use event::{Event, Payload, into_payload};
pub use handler::{Handler, HandlerFn, HandlerRef};
pub use table::{HandlerTable, Owner, TableEntry};
pub use topic::{PatternSegment, Topic, TopicPattern, WILDCARD_MULTI, WILDCARD_SINGLE};
