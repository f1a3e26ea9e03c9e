//! Aggregate identity: type tags and instance identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Names an aggregate type (e.g. "counter").
///
/// Tags are opaque non-empty strings, unique per aggregate type. They key
/// the per-aggregate event streams and route operation-log entries to
/// projection handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Wrap a tag name. The name must be non-empty.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive a tag from a Rust type name.
    ///
    /// Takes the last path segment of `std::any::type_name`, drops any
    /// generic arguments, and strips every character outside
    /// `[A-Za-z0-9_.-]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use eventflow::Tag;
    ///
    /// struct ShoppingCart;
    /// assert_eq!(Tag::for_type::<ShoppingCart>().as_str(), "ShoppingCart");
    /// ```
    pub fn for_type<T>() -> Self {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        let last = base.rsplit("::").next().unwrap_or(base);
        Self(sanitize(last))
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifies one aggregate instance within its type.
///
/// Opaque and caller-supplied; the store never interprets it beyond
/// equality. Must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Wrap an instance identifier. The identifier must be non-empty.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AggregateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Strip every character outside `[A-Za-z0-9_.-]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}
