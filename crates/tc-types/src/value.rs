use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dynamically typed cell for hypertable-shaped rows. Column identity and
/// type are only known at run time, so rows travel as `Vec<Value>` alongside
/// a [`crate::schema::TableSchema`] describing their layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bigint(i64),
    Double(f64),
    Text(String),
    /// UTC nanoseconds since the Unix epoch.
    Timestamp(i64),
    Boolean(bool),
}

impl Value {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Value::Timestamp(dt.timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Nanosecond view for time-typed cells; None for anything else.
    pub fn as_ns(&self) -> Option<i64> {
        match self {
            Value::Timestamp(ns) | Value::Bigint(ns) => Some(*ns),
            _ => None,
        }
    }

    /// Canonical text rendering used for key hashing and distinct-index
    /// storage. This is part of the storage contract; changing it would
    /// strand every partition range and distinct entry computed with it.
    pub fn canonical_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bigint(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ns) => ns.to_string(),
            Value::Boolean(b) => (if *b { "true" } else { "false" }).to_string(),
        }
    }
}
