//! Engine error type.

use thiserror::Error;

/// Errors returned by the event log's public operations.
///
/// Values are `Clone` so that one initialization outcome can be handed to
/// every caller that awaited it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventLogError {
    /// The operation requires a completed `init`.
    #[error("event log is not initialized")]
    NotInitialized,

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration could not be loaded or merged.
    #[error("failed to load configuration: {0}")]
    Config(String),

    /// A storage operation that the caller depends on failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An event or record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The custom sanitizer hook panicked.
    #[error("custom sanitizer failed: {0}")]
    Sanitizer(String),

    /// The engine behind an ingestion handle has been dropped.
    #[error("event log has been dropped")]
    Detached,
}

impl From<serde_json::Error> for EventLogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<eventlog_store::StoreError> for EventLogError {
    fn from(e: eventlog_store::StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<figment::Error> for EventLogError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}
