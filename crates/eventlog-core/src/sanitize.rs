//! Redaction of sensitive keys and size-capping of events.

use serde_json::{Map, Value, json};

use crate::event::{Event, EventContext};

/// Replacement value for redacted keys.
pub const REDACTED: &str = "***REDACTED***";

/// Nesting depth beyond which subtrees are replaced with a marker.
pub const MAX_DEPTH: usize = 10;

/// Serialized size ceiling for a single event, in bytes.
pub const MAX_EVENT_BYTES: usize = 100 * 1024;

/// Key fragments that mark a value as sensitive.
///
/// Matched against the key lowercased with `_` and `-` removed.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "authorization",
    "secret",
    "apikey",
    "accesstoken",
    "refreshtoken",
];

/// Returns whether values under `key` must be redacted.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| normalized.contains(sensitive))
}

/// Deep-copies `value`, redacting sensitive keys and cutting off deep nesting.
pub fn sanitize_value(value: &Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return json!({ "_maxDepthExceeded": true });
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_at(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(sanitize_map(map, depth)),
        scalar => scalar.clone(),
    }
}

fn sanitize_map(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                sanitize_at(value, depth + 1)
            };
            (key.clone(), value)
        })
        .collect()
}

/// Produces a sanitized copy of `event`.
///
/// Payload and context are redacted first; if the redacted event still
/// serializes to more than [`MAX_EVENT_BYTES`], its payload is replaced by a
/// truncation marker carrying the serialized size. Identity, category and
/// context survive truncation.
pub fn sanitize_event(event: &Event) -> Result<Event, serde_json::Error> {
    let context = EventContext::from(sanitize_map(event.context.as_map(), 0));
    let sanitized = Event {
        payload: sanitize_value(&event.payload),
        context,
        ..event.clone()
    };

    let size = serde_json::to_vec(&sanitized)?.len();
    if size > MAX_EVENT_BYTES {
        tracing::debug!(
            event_id = %event.event_id,
            size,
            "event payload exceeds size ceiling, truncating"
        );
        return Ok(sanitized.with_payload(json!({
            "_truncated": true,
            "_originalSize": size,
        })));
    }
    Ok(sanitized)
}
