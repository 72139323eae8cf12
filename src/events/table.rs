//! # Explicit handler registration tables.
//!
//! Components declare the handlers they contribute in a [`HandlerTable`] and
//! pass it to [`EventBus::register_all`](crate::EventBus::register_all). Every
//! entry is tagged with the table's [`Owner`], so the component's
//! subscriptions can later be dropped together with
//! [`EventBus::unregister_owner`](crate::EventBus::unregister_owner).
//!
//! ## Example
//! ```rust
//! use brewvisor::{Event, HandlerError, HandlerFn, HandlerTable};
//!
//! let table = HandlerTable::new("fermenter-ui")
//!     .on("fermenter/+/update", HandlerFn::arc("push", |_ev: Event| async {
//!         Ok::<_, HandlerError>(())
//!     }))
//!     .once("system/ready", HandlerFn::arc("greet", |_ev: Event| async {
//!         Ok::<_, HandlerError>(())
//!     }));
//!
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.owner().as_str(), "fermenter-ui");
//! ```

use std::fmt;
use std::sync::Arc;

use super::handler::HandlerRef;

/// Label identifying the component that registered a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner(Arc<str>);

impl Owner {
    /// Creates an owner label.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Owner {
    fn from(value: &str) -> Self {
        Owner::new(value)
    }
}

/// One `(pattern, handler)` row of a table.
#[derive(Clone)]
pub struct TableEntry {
    /// Unparsed subscription pattern.
    pub pattern: String,
    /// Handler to invoke.
    pub handler: HandlerRef,
    /// Deliver at most once.
    pub once: bool,
}

/// Ordered list of subscriptions contributed by one component.
#[derive(Clone)]
pub struct HandlerTable {
    owner: Owner,
    entries: Vec<TableEntry>,
}

impl HandlerTable {
    /// Creates an empty table for `owner`.
    pub fn new(owner: impl Into<Owner>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    /// Adds a regular subscription.
    #[must_use]
    pub fn on(mut self, pattern: impl Into<String>, handler: HandlerRef) -> Self {
        self.entries.push(TableEntry {
            pattern: pattern.into(),
            handler,
            once: false,
        });
        self
    }

    /// Adds a subscription that is removed after its first delivery.
    #[must_use]
    pub fn once(mut self, pattern: impl Into<String>, handler: HandlerRef) -> Self {
        self.entries.push(TableEntry {
            pattern: pattern.into(),
            handler,
            once: true,
        });
        self
    }

    /// Returns the owner label.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Returns the entries in insertion order.
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
