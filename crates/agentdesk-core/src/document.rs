// Raw document model
//
// Stores deal in loosely shaped JSON documents. Typed records are parsed
// out of these (see agent.rs), never the other way around.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A document as returned by a store: a store-assigned id plus free-form fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Value of a single field in a write
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Literal JSON value
    Value(Value),
    /// Placeholder the store replaces with its own clock at commit time
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Value(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Value(Value::String(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Value(Value::from(value))
    }
}

/// Field writes keyed by field name
pub type DocumentWrite = BTreeMap<String, FieldValue>;

/// Sort direction for a collection query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// An ordered query over a whole collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub collection: String,
    pub order_by: String,
    pub direction: SortDirection,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: order_by.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(mut self) -> Self {
        self.direction = SortDirection::Descending;
        self
    }
}

/// Format a timestamp the way stores persist it
///
/// Fixed-width UTC so lexical order matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp; anything that is not an RFC 3339 string is `None`
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolve a write against the store clock
pub fn resolve_write(write: &DocumentWrite, now: DateTime<Utc>) -> Map<String, Value> {
    write
        .iter()
        .map(|(field, value)| {
            let resolved = match value {
                FieldValue::Value(v) => v.clone(),
                FieldValue::ServerTimestamp => Value::String(format_timestamp(now)),
            };
            (field.clone(), resolved)
        })
        .collect()
}

/// Compare two field values for ordering
///
/// Only strings are ordered, by byte value. Any other value, including a
/// missing field, counts as absent and sorts before every string; two
/// absent values compare equal so the caller's tie-breaker decides.
pub fn compare_field_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    a.and_then(Value::as_str).cmp(&b.and_then(Value::as_str))
}
