//! Logged events and their category-specific payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::{Clock, format_iso_millis};
use crate::session::Session;
use crate::types::{EventId, SessionId, ValidationError};

/// The kind of occurrence an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Screen,
    Action,
    Network,
    Error,
    Log,
}

impl EventCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Screen,
        Self::Action,
        Self::Network,
        Self::Error,
        Self::Log,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Action => "action",
            Self::Network => "network",
            Self::Error => "error",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen" => Ok(Self::Screen),
            "action" => Ok(Self::Action),
            "network" => Ok(Self::Network),
            "error" => Ok(Self::Error),
            "log" => Ok(Self::Log),
            _ => Err(ValidationError::UnknownCategory {
                value: s.to_string(),
            }),
        }
    }
}

/// Severity of a `log` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ValidationError::UnknownLogLevel {
                value: s.to_string(),
            }),
        }
    }
}

/// Ambient attributes attached to every event at creation time.
///
/// `user` and `deviceInfo` are conventional keys; any other key is allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventContext(Map<String, Value>);

impl EventContext {
    pub const USER_KEY: &'static str = "user";
    pub const DEVICE_INFO_KEY: &'static str = "deviceInfo";

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with_entry(&self, key: impl Into<String>, value: Value) -> Self {
        let mut map = self.0.clone();
        map.insert(key.into(), value);
        Self(map)
    }

    /// Returns a copy with the `user` attribute replaced.
    #[must_use]
    pub fn with_user(&self, user: Map<String, Value>) -> Self {
        self.with_entry(Self::USER_KEY, Value::Object(user))
    }

    /// Returns a copy with the `deviceInfo` attribute replaced.
    #[must_use]
    pub fn with_device_info(&self, info: Map<String, Value>) -> Self {
        self.with_entry(Self::DEVICE_INFO_KEY, Value::Object(info))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn user(&self) -> Option<&Value> {
        self.get(Self::USER_KEY)
    }

    pub fn device_info(&self) -> Option<&Value> {
        self.get(Self::DEVICE_INFO_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for EventContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One immutable logged occurrence.
///
/// Field names serialize in camelCase (`eventId`, `timestampISO`, ...), which
/// is also the persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: EventId,
    pub session_id: SessionId,
    /// The session sequence number in effect when the event was created.
    pub seq: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "timestampISO")]
    pub timestamp_iso: String,
    /// IANA timezone identifier.
    pub timezone: String,
    pub category: EventCategory,
    pub payload: Value,
    pub context: EventContext,
}

impl Event {
    /// Creates an event stamped with a fresh id and the clock's current time.
    ///
    /// The event records `session.seq` as-is; advancing the session is the
    /// caller's job.
    pub fn create(
        session: &Session,
        context: &EventContext,
        category: EventCategory,
        payload: Value,
        clock: &dyn Clock,
    ) -> Self {
        let timestamp = clock.now_millis();
        Self {
            event_id: EventId::generate(),
            session_id: session.session_id.clone(),
            seq: session.seq,
            timestamp,
            timestamp_iso: format_iso_millis(timestamp),
            timezone: clock.timezone(),
            category,
            payload,
            context: context.clone(),
        }
    }

    /// Returns a copy with a different payload.
    #[must_use]
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }
}

/// Serializes a payload struct into the opaque JSON payload of an event.
pub fn to_payload<T: Serialize>(payload: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(payload)
}

/// Payload of a `screen` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl ScreenPayload {
    pub fn new(name: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Payload of an `action` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionPayload {
    pub fn new(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Payload of a `log` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogPayload {
    pub fn new(level: LogLevel, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            level,
            message: message.into(),
            data,
        }
    }
}

/// Something reported as an error, normalized to a message and optional stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInput {
    message: String,
    stack: Option<String>,
}

impl ErrorInput {
    /// Uses the error's display text as message and its `source()` chain as stack.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }

    /// A bare message with no stack.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Coerces an arbitrary JSON value.
    ///
    /// Objects carrying a string `message` keep it (and a string `stack` if
    /// present). Strings are used verbatim; anything else becomes its JSON text.
    pub fn from_value(value: &Value) -> Self {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return Self {
                message: message.to_string(),
                stack: value
                    .get("stack")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
        }
        match value {
            Value::String(s) => Self::message(s.clone()),
            other => Self::message(other.to_string()),
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn message_text(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }
}

impl From<&str> for ErrorInput {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for ErrorInput {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<Value> for ErrorInput {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fatal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ErrorPayload {
    pub fn new(error: impl Into<ErrorInput>, context: Option<Value>) -> Self {
        let ErrorInput { message, stack } = error.into();
        Self {
            message,
            stack,
            is_fatal: None,
            context,
        }
    }

    #[must_use]
    pub const fn fatal(mut self, is_fatal: bool) -> Self {
        self.is_fatal = Some(is_fatal);
        self
    }
}

/// Payload of a `network` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEventPayload {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Round-trip time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
}

impl NetworkEventPayload {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into().to_uppercase(),
            ..Self::default()
        }
    }
}
