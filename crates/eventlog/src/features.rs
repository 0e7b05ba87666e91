//! Capture modules and the ingestion handle they record through.
//!
//! A [`FeatureModule`] is wired once at init if its config enables it. It
//! receives an [`Ingest`] handle instead of the engine itself: the handle holds
//! a weak reference, so an installed module (a process-wide panic hook, say)
//! never keeps a dropped engine alive.

use std::fmt;
use std::sync::{Arc, Weak};

use eventlog_core::{ErrorInput, ErrorPayload, LogLevel, NetworkEventPayload};
use serde_json::Value;
use thiserror::Error;

use crate::config::FeatureConfig;
use crate::engine::{EventLog, Inner};
use crate::error::EventLogError;

/// Receives error events from a capture module.
pub trait ErrorObserver: Send + Sync {
    fn observe_error(&self, payload: ErrorPayload) -> Result<(), EventLogError>;
}

/// Receives completed HTTP exchanges from a capture module.
pub trait NetworkObserver: Send + Sync {
    fn observe_network(&self, payload: NetworkEventPayload) -> Result<(), EventLogError>;
}

/// Errors from wiring a feature module.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature module {name} is already installed")]
    AlreadyInstalled { name: &'static str },

    #[error("feature module {name} is unavailable: {reason}")]
    Unavailable { name: &'static str, reason: String },
}

/// An optional capture capability wired into the engine at init.
pub trait FeatureModule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn is_enabled(&self, features: &FeatureConfig) -> bool;

    fn install(&self, ingest: Ingest, features: &FeatureConfig) -> Result<(), FeatureError>;
}

/// Recording handle given to feature modules.
///
/// Calls go through the same pipeline as the public API. Once the engine is
/// dropped every call returns [`EventLogError::Detached`].
#[derive(Clone)]
pub struct Ingest {
    inner: Weak<Inner>,
}

impl fmt::Debug for Ingest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingest")
            .field("attached", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Ingest {
    pub(crate) fn new(inner: &Arc<Inner>) -> Self {
        Self {
            inner: Arc::downgrade(inner),
        }
    }

    fn engine(&self) -> Result<EventLog, EventLogError> {
        self.inner
            .upgrade()
            .map(EventLog::from_inner)
            .ok_or(EventLogError::Detached)
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), EventLogError> {
        self.engine()?.log(level, message, data)
    }

    pub fn error(
        &self,
        error: impl Into<ErrorInput>,
        context: Option<Value>,
    ) -> Result<(), EventLogError> {
        self.engine()?.error(error, context)
    }

    pub fn network(&self, payload: NetworkEventPayload) -> Result<(), EventLogError> {
        self.engine()?.network(payload)
    }
}

impl ErrorObserver for Ingest {
    fn observe_error(&self, payload: ErrorPayload) -> Result<(), EventLogError> {
        self.engine()?.record_error(payload)
    }
}

impl NetworkObserver for Ingest {
    fn observe_network(&self, payload: NetworkEventPayload) -> Result<(), EventLogError> {
        self.network(payload)
    }
}
