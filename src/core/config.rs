//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the scheduler and the bus.
//!
//! Config is deserializable so the host's configuration loader can supply it;
//! missing keys fall back to [`Config::default`]. Durations are expressed in
//! milliseconds.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore created)
//! - `failure_capacity = 0` → clamped to 1
//!
//! ## Example
//! ```rust
//! use brewvisor::Config;
//!
//! let cfg: Config = serde_json::from_str(r#"{ "max_concurrent": 4 }"#).unwrap();
//! assert_eq!(cfg.concurrency_limit(), Some(4));
//! assert_eq!(cfg.failure_capacity_clamped(), 1024);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `max_concurrent`: job concurrency limit (`0` = unlimited)
/// - `failure_capacity`: failure queue size (min 1)
/// - `request_timeout`: default wait of fire-and-wait publishing
///
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks across the codebase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of jobs executing at once.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` jobs run; the rest wait as PENDING
    pub max_concurrent: usize,

    /// Capacity of the failure queue; the oldest record is dropped when full.
    pub failure_capacity: usize,

    /// Default timeout of [`EventBus::request_default`](crate::EventBus::request_default).
    #[serde(with = "millis", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
}

impl Config {
    /// Returns the global concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent jobs
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns a failure queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn failure_capacity_clamped(&self) -> usize {
        self.failure_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `max_concurrent = 0` (unlimited)
    /// - `failure_capacity = 1024`
    /// - `request_timeout = 500ms`
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            failure_capacity: 1024,
            request_timeout: Duration::from_millis(500),
        }
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
