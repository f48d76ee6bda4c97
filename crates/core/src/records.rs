//! Record and identity types consumed by every reconciliation component.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a logical entity, stable across fetches.
///
/// Servers hand out both string ids (`"64f1c..."`) and numeric ids (`42`); integral numbers
/// keep their numeric form, any other number is compared by its textual rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentityKey {
    Integer(i64),
    Text(String),
}

impl IdentityKey {
    /// Extracts an identity from a JSON value. Null, booleans and containers have none.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(Self::Text(v.clone())),
            Value::Number(v) => match v.as_i64() {
                Some(int) => Some(Self::Integer(int)),
                None => Some(Self::Text(v.to_string())),
            },
            _ => None,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for IdentityKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for IdentityKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for IdentityKey {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// A transient view over one server-owned entity: a flat map of field names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON object. Any other JSON shape is not a record.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Identity stored under `field`, if the field holds a string or a number.
    pub fn identity(&self, field: &str) -> Option<IdentityKey> {
        self.0.get(field).and_then(IdentityKey::from_value)
    }

    /// Copies the value found at a nested `path` into the top-level `field`.
    ///
    /// Sources that nest the identity under a relation (`{"member": {"_id": 7}}`) must be
    /// flattened this way before they are merged with sources that carry it flat. Returns
    /// false and leaves the record untouched when the path does not resolve.
    pub fn hoist(&mut self, path: &[&str], field: &str) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return false;
        };
        let mut current = match self.0.get(*first) {
            Some(value) => value,
            None => return false,
        };
        for segment in rest {
            current = match current.get(*segment) {
                Some(value) => value,
                None => return false,
            };
        }
        if current.is_null() {
            return false;
        }
        let hoisted = current.clone();
        self.0.insert(field.to_string(), hoisted);
        true
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Builds the key selector that reads an identity field from a [`Record`].
pub fn by_field(field: &str) -> impl Fn(&Record) -> Option<IdentityKey> + '_ {
    move |record: &Record| record.identity(field)
}

/// Per-field overwrite: every field carried by `newer` replaces the one in `self`,
/// fields only `self` carries are kept.
pub trait Overlay {
    fn overlay(&mut self, newer: Self);
}

impl Overlay for Record {
    fn overlay(&mut self, newer: Self) {
        for (field, value) in newer.0 {
            self.0.insert(field, value);
        }
    }
}
