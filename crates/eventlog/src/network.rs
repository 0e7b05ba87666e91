//! HTTP exchange recording.
//!
//! Rust has no global request layer to patch, so the host's HTTP glue (a
//! client middleware, a tower layer, a wrapper function) builds an
//! [`HttpExchange`] per request and hands it to [`NetworkRecorder::record`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventlog_core::sanitize::REDACTED;
use eventlog_core::{ErrorPayload, NetworkEventPayload};
use serde_json::{Value, json};

use crate::config::{FeatureConfig, NetworkConfig};
use crate::error::EventLogError;
use crate::features::{ErrorObserver, FeatureError, FeatureModule, Ingest, NetworkObserver};
use crate::scheduler::lock;

/// Everything an observer needs to record.
pub trait NetworkSink: ErrorObserver + NetworkObserver {}

impl<T: ErrorObserver + NetworkObserver> NetworkSink for T {}

/// One completed (or failed) HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpExchange {
    pub method: String,
    pub url: String,
    pub duration: Duration,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<String>,
    pub status: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: Option<String>,
    /// Transport failure; the exchange never produced a response.
    pub error: Option<String>,
}

impl HttpExchange {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    #[must_use]
    pub fn response(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

struct Installed {
    sink: Arc<dyn NetworkSink>,
    config: NetworkConfig,
}

/// Built-in network capture module.
///
/// Clones share the installation, so the host can keep a handle obtained
/// before init and start recording once the engine wires it.
#[derive(Clone, Default)]
pub struct NetworkRecorder {
    installed: Arc<Mutex<Option<Installed>>>,
}

impl std::fmt::Debug for NetworkRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRecorder")
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl NetworkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        lock(&self.installed).is_some()
    }

    /// Wires the recorder to an arbitrary sink.
    pub fn attach(&self, sink: Arc<dyn NetworkSink>, config: NetworkConfig) {
        *lock(&self.installed) = Some(Installed { sink, config });
    }

    /// Records an exchange. Does nothing until the recorder is installed.
    ///
    /// Successful exchanges become `network` events. Transport failures
    /// become `error` events with the request described in the context.
    pub fn record(&self, exchange: HttpExchange) -> Result<(), EventLogError> {
        let (sink, config) = {
            let installed = lock(&self.installed);
            let Some(installed) = installed.as_ref() else {
                tracing::trace!(url = %exchange.url, "network recorder not installed, skipping");
                return Ok(());
            };
            (Arc::clone(&installed.sink), installed.config.clone())
        };

        if let Some(error) = &exchange.error {
            let context = json!({
                "url": exchange.url,
                "method": exchange.method,
                "duration": exchange.duration_ms(),
                "category": "network",
            });
            return sink.observe_error(ErrorPayload::new(error.as_str(), Some(context)));
        }

        sink.observe_network(build_payload(exchange, &config))
    }
}

fn build_payload(exchange: HttpExchange, config: &NetworkConfig) -> NetworkEventPayload {
    let duration = exchange.duration_ms();
    let mut payload = NetworkEventPayload::new(exchange.method, exchange.url);
    payload.status = exchange.status;
    payload.duration = Some(duration);

    if !exchange.request_headers.is_empty() {
        payload.request_headers = Some(redact_headers(
            exchange.request_headers,
            &config.redact_headers,
        ));
    }
    if !exchange.response_headers.is_empty() {
        payload.response_headers = Some(redact_headers(
            exchange.response_headers,
            &config.redact_headers,
        ));
    }
    if config.log_request_body {
        payload.request_body = exchange
            .request_body
            .map(|b| body_value(b, config.max_body_size));
    }
    if config.log_response_body {
        payload.response_body = exchange
            .response_body
            .map(|b| body_value(b, config.max_body_size));
    }
    payload
}

/// Replaces values of headers named in `redact` (case-insensitive).
fn redact_headers(
    headers: BTreeMap<String, String>,
    redact: &[String],
) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .map(|(name, value)| {
            if redact.iter().any(|r| r.eq_ignore_ascii_case(&name)) {
                (name, REDACTED.to_string())
            } else {
                (name, value)
            }
        })
        .collect()
}

/// Parses JSON bodies, keeps other text verbatim, and notes oversized ones.
fn body_value(body: String, max_body_size: Option<usize>) -> Value {
    if let Some(max) = max_body_size
        && body.len() > max
    {
        return Value::String(format!("[Body too large: {} bytes]", body.len()));
    }
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

impl FeatureModule for NetworkRecorder {
    fn name(&self) -> &'static str {
        "network"
    }

    fn is_enabled(&self, features: &FeatureConfig) -> bool {
        features.network.enabled
    }

    fn install(&self, ingest: Ingest, features: &FeatureConfig) -> Result<(), FeatureError> {
        if self.is_installed() {
            return Err(FeatureError::AlreadyInstalled { name: self.name() });
        }
        self.attach(Arc::new(ingest), features.network.clone());
        Ok(())
    }
}
