//! Host-owned tracked state.
//!
//! The host game owns the real board, score and shape catalog. On every
//! call into Warden it hands over a [`TrackedState`]: a field-name keyed
//! map of JSON values. The key set is expected to stay stable for the
//! whole session; the snapshot store treats appearing or disappearing
//! keys as drift.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field map describing the host's monitored state.
///
/// Fields are kept in a `BTreeMap` so iteration order is always sorted by
/// field name, independent of insertion order.
///
/// # Example
///
/// ```rust
/// use warden_types::TrackedState;
/// use serde_json::json;
///
/// let state = TrackedState::new()
///     .with_field("score", 100)
///     .with_field("board", json!([[0, 0], [0, 1]]));
///
/// assert_eq!(state.len(), 2);
/// assert_eq!(state.get("score"), Some(&json!(100)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedState {
    fields: BTreeMap<String, Value>,
}

impl TrackedState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state from any value that serializes to a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::NotAnObject`] if `value` serializes to anything
    /// other than an object, or [`TypesError::Serialization`] if
    /// serialization itself fails.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(TypesError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Adds or replaces a field, builder style.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds or replaces a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Returns a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a mutable reference to a field.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Returns true if the field exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates field names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterates `(name, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the state into a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
