use crate::event::Event;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON array of events, received {found}")]
    NotAnArray { found: &'static str },
}

/// Decodes one API page into its events, preserving the order they were sent in.
///
/// Array elements that are not objects carry no fields to sync and are skipped.
pub fn decode_page(body: &[u8]) -> Result<Vec<Event>, DecodeError> {
    let items = match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => items,
        other => {
            return Err(DecodeError::NotAnArray {
                found: json_kind(&other),
            })
        }
    };

    let mut events = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => events.push(Event::from(map)),
            other => warn!(index, kind = json_kind(&other), "Skipping non-object array element"),
        }
    }

    Ok(events)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
