use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub const REQUEST_ID: &str = "request_id";
pub const USER_ID: &str = "user_id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

#[derive(Debug, Error)]
pub enum TimeParseError {
    #[error("field '{field}' is missing or is not a string")]
    Missing { field: String },

    #[error("failed to parse '{field}' value '{value}' as a wire timestamp: {source}")]
    Invalid {
        field: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// A single dynamically typed field of an upstream event.
///
/// Nested arrays and objects are carried as compact JSON text so every field
/// maps onto exactly one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Json(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else if n.is_u64() {
                    // Beyond i64 range; keep the exact digits rather than lose precision
                    FieldValue::Text(n.to_string())
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::Text(s),
            nested @ (Value::Array(_) | Value::Object(_)) => FieldValue::Json(nested.to_string()),
        }
    }
}

/// One page-view record as decoded from an API page.
///
/// Field order is irrelevant to the engine; a sorted map keeps the column
/// list built from it stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: BTreeMap<String, FieldValue>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The event identifier, or the empty string when the payload has none.
    pub fn request_id(&self) -> &str {
        self.get(REQUEST_ID).and_then(FieldValue::as_str).unwrap_or("")
    }

    /// Epoch seconds of a wire-format timestamp field.
    pub fn epoch(&self, field: &str) -> Result<i64, TimeParseError> {
        let raw = self
            .get(field)
            .and_then(FieldValue::as_str)
            .ok_or_else(|| TimeParseError::Missing {
                field: field.to_string(),
            })?;
        parse_wire_timestamp(field, raw).map(|dt| dt.timestamp())
    }

    pub fn created_at_unix(&self) -> Result<i64, TimeParseError> {
        self.epoch(CREATED_AT)
    }
}

impl From<serde_json::Map<String, Value>> for Event {
    fn from(object: serde_json::Map<String, Value>) -> Self {
        Self {
            fields: object
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from(v)))
                .collect(),
        }
    }
}

/// Parses the API's ISO8601 timestamps (`2006-01-02T15:04:05-07:00`, `Z` suffix
/// and fractional seconds accepted).
pub fn parse_wire_timestamp(field: &str, value: &str) -> Result<DateTime<FixedOffset>, TimeParseError> {
    DateTime::parse_from_rfc3339(value).map_err(|source| TimeParseError::Invalid {
        field: field.to_string(),
        value: value.to_string(),
        source,
    })
}
