//! Reading and writing the two persisted records.

use std::sync::Arc;

use eventlog_core::{Event, Session};
use eventlog_store::StorageAdapter;
use serde_json::Value;

use crate::error::EventLogError;

/// Storage key of the current session record.
pub const SESSION_KEY: &str = "eventlog/session";
/// Storage key of the retained events, a JSON array ordered oldest-first.
pub const EVENTS_KEY: &str = "eventlog/events";

/// Typed access to the engine's records in a [`StorageAdapter`].
///
/// Loads are lenient: a missing, unreadable or corrupt record reads as absent.
#[derive(Clone)]
pub(crate) struct Persistence {
    storage: Arc<dyn StorageAdapter>,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    pub(crate) fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key).await {
            Ok(data) => data.filter(|d| !d.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, key, "failed to read record, treating as absent");
                None
            }
        }
    }

    pub(crate) async fn load_session(&self) -> Option<Session> {
        let data = self.read(SESSION_KEY).await?;
        match serde_json::from_str(&data) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "persisted session is corrupt, starting fresh");
                None
            }
        }
    }

    /// Loads persisted events, skipping entries that no longer parse.
    pub(crate) async fn load_events(&self) -> Vec<Event> {
        let Some(data) = self.read(EVENTS_KEY).await else {
            return Vec::new();
        };
        let entries: Vec<Value> = match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "persisted events are corrupt, starting empty");
                return Vec::new();
            }
        };

        let total = entries.len();
        let events: Vec<Event> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if events.len() < total {
            tracing::warn!(
                skipped = total - events.len(),
                "dropped malformed persisted events"
            );
        }
        events
    }

    pub(crate) async fn save_session(&self, session: &Session) -> Result<(), EventLogError> {
        let data = serde_json::to_string(session)?;
        self.storage.set_item(SESSION_KEY, &data).await?;
        Ok(())
    }

    pub(crate) async fn save_events(&self, events: &[Arc<Event>]) -> Result<(), EventLogError> {
        let records: Vec<&Event> = events.iter().map(AsRef::as_ref).collect();
        let data = serde_json::to_string(&records)?;
        self.storage.set_item(EVENTS_KEY, &data).await?;
        tracing::debug!(count = events.len(), bytes = data.len(), "saved events");
        Ok(())
    }

    pub(crate) async fn remove_events(&self) -> Result<(), EventLogError> {
        self.storage.remove_item(EVENTS_KEY).await?;
        Ok(())
    }
}
