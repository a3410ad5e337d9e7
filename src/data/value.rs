use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One tabular sample: field name -> value
pub type Record = HashMap<String, Value>;

/// Cell value stored in tabular streams
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    /// Offset on the session timeline in microseconds
    Timestamp(i64),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) | Value::Timestamp(v) => Some(*v),
            Value::Float64(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) | Value::Timestamp(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Convert a scalar JSON value. Numbers under `time_field` become timestamps
    /// (interpreted as seconds); arrays and objects map to `Null`.
    pub fn from_json(json: &serde_json::Value, field: &str, time_field: Option<&str>) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if time_field == Some(field) {
                    n.as_f64()
                        .and_then(Timestamp::checked_from_secs_f64)
                        .map(|t| Value::Timestamp(t.as_micros()))
                        .unwrap_or(Value::Null)
                } else if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float64(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v.as_micros())
    }
}

/// Flatten a nested JSON object into a record with dot-notation keys.
///
/// `{"imu": {"ax": 0.1}, "tags": ["a"]}` becomes `imu.ax -> 0.1`, `tags.0 -> "a"`.
pub fn flatten_json(
    json: &serde_json::Map<String, serde_json::Value>,
    time_field: Option<&str>,
) -> Record {
    let mut record = Record::new();
    flatten_object(json, "", time_field, &mut record);
    record
}

fn flatten_object(
    obj: &serde_json::Map<String, serde_json::Value>,
    prefix: &str,
    time_field: Option<&str>,
    record: &mut Record,
) {
    for (key, value) in obj {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        flatten_value(value, full_key, time_field, record);
    }
}

fn flatten_value(
    value: &serde_json::Value,
    key: String,
    time_field: Option<&str>,
    record: &mut Record,
) {
    match value {
        serde_json::Value::Object(nested) => flatten_object(nested, &key, time_field, record),
        serde_json::Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                flatten_value(item, format!("{}.{}", key, idx), time_field, record);
            }
        }
        _ => {
            let converted = Value::from_json(value, &key, time_field);
            record.insert(key, converted);
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            // Timestamps come back from JSON as plain integers
            (Value::Int64(a), Value::Timestamp(b)) | (Value::Timestamp(a), Value::Int64(b)) => {
                a == b
            }
            (Value::Int64(a), Value::Float64(b)) | (Value::Float64(b), Value::Int64(a)) => {
                (*a as f64).to_bits() == b.to_bits()
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", Timestamp::from_micros(*t)),
        }
    }
}

/// Column data type for stream schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    String,
    Timestamp,
}

impl DataType {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    /// Widest type able to hold values of both types
    pub fn merge(&self, other: &DataType) -> DataType {
        if self == other {
            return *self;
        }
        match (self, other) {
            (DataType::Null, t) | (t, DataType::Null) => *t,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            (DataType::Int64, DataType::Timestamp) | (DataType::Timestamp, DataType::Int64) => {
                DataType::Int64
            }
            _ => DataType::String,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "NULL"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::Int64 => write!(f, "INT64"),
            DataType::Float64 => write!(f, "FLOAT64"),
            DataType::String => write!(f, "STRING"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}
