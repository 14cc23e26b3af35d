//! The `Entity` contract and the hashable field values used as index keys.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of one immutable identity field.
///
/// Restricted to hashable, totally ordered kinds so every declared field can
/// key an index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// A record type that can live in an [`EntityStore`](crate::EntityStore).
///
/// Immutable fields are set once at construction and have no setters; the
/// store reads them through [`Entity::immutable_fields`] to index and name
/// records. Mutable state (if any) must use interior mutability, since the
/// store hands out shared `Arc<T>` handles.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Names of the immutable fields, in a fixed order.
    const FIELDS: &'static [&'static str];

    /// Current values of the immutable fields, in [`Entity::FIELDS`] order.
    fn immutable_fields(&self) -> Vec<(&'static str, FieldValue)>;

    /// Value of one declared field.
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.immutable_fields()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }
}
