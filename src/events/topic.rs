//! # Topics and subscription patterns.
//!
//! A [`Topic`] is a concrete slash-delimited address such as `actor/123/on`.
//! A [`TopicPattern`] is what subscriptions register against; besides literal
//! segments it may contain two wildcard tokens:
//!
//! - `+` matches exactly one segment,
//! - `#` matches zero or more remaining segments and must be the last segment.
//!
//! ```text
//! pattern      topic        match
//! a/+/c        a/b/c        yes
//! a/#          a            yes   (zero remaining segments)
//! a/#          a/b/c        yes
//! a/+          a/b/c        no
//! #            $sys/uptime  no    (wildcards never lead into `$` topics)
//! $sys/#       $sys/uptime  yes
//! ```
//!
//! ## Rules
//! - No segment may be empty, in topics or in patterns.
//! - Only a whole segment equal to `+` or `#` is a wildcard; `c++` is a literal.
//! - Topics never contain wildcard segments.
//! - Topics whose first segment starts with `$` are *system* topics: a pattern
//!   whose first segment is a wildcard does not match them.

use std::fmt;

use crate::error::BusError;

/// Topic separator.
pub const SEPARATOR: char = '/';
/// Single-level wildcard token.
pub const WILDCARD_SINGLE: &str = "+";
/// Multi-level wildcard token.
pub const WILDCARD_MULTI: &str = "#";

/// A validated, concrete topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Parses and validates a concrete topic.
    pub fn parse(raw: impl Into<String>) -> Result<Self, BusError> {
        let raw = raw.into();
        let invalid = |reason| BusError::InvalidTopic {
            topic: raw.clone(),
            reason,
        };
        if raw.is_empty() {
            return Err(invalid("topic is empty"));
        }
        for segment in raw.split(SEPARATOR) {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if segment == WILDCARD_SINGLE || segment == WILDCARD_MULTI {
                return Err(invalid("wildcards are not allowed in topics"));
            }
        }
        Ok(Self(raw))
    }

    /// Returns the topic as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the topic segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Returns `true` for `$`-prefixed system topics.
    pub fn is_system(&self) -> bool {
        self.0.starts_with('$')
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Topic {
    type Error = BusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Topic::parse(value)
    }
}

impl TryFrom<String> for Topic {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::parse(value)
    }
}

/// One parsed pattern segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternSegment {
    /// Matches this exact token.
    Literal(String),
    /// `+`
    Single,
    /// `#`
    Multi,
}

impl PatternSegment {
    fn is_wildcard(&self) -> bool {
        !matches!(self, PatternSegment::Literal(_))
    }
}

/// A validated subscription pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl TopicPattern {
    /// Parses and validates a subscription pattern.
    ///
    /// Fails with [`BusError::InvalidPattern`] when a segment is empty, a
    /// wildcard shares a segment with other characters, or `#` is not last.
    pub fn parse(raw: impl Into<String>) -> Result<Self, BusError> {
        let raw = raw.into();
        let invalid = |reason| BusError::InvalidPattern {
            pattern: raw.clone(),
            reason,
        };
        if raw.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.into_iter().enumerate() {
            let segment = match part {
                "" => return Err(invalid("empty segment")),
                WILDCARD_SINGLE => PatternSegment::Single,
                WILDCARD_MULTI if i == last => PatternSegment::Multi,
                WILDCARD_MULTI => return Err(invalid("'#' must be the last segment")),
                p => PatternSegment::Literal(p.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { raw, segments })
    }

    /// Returns the pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// Returns `true` if the pattern contains no wildcard.
    pub fn is_literal(&self) -> bool {
        !self.segments.iter().any(PatternSegment::is_wildcard)
    }

    /// Segment-wise match of a concrete topic against this pattern.
    pub fn matches(&self, topic: &Topic) -> bool {
        if topic.is_system() && self.segments.first().is_some_and(PatternSegment::is_wildcard) {
            return false;
        }

        let mut parts = topic.segments();
        for segment in &self.segments {
            match segment {
                PatternSegment::Multi => return true,
                PatternSegment::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                PatternSegment::Literal(lit) => match parts.next() {
                    Some(part) if part == lit => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<&str> for TopicPattern {
    type Error = BusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        TopicPattern::parse(value)
    }
}
