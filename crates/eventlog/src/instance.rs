//! Process-wide default instance.

use std::path::PathBuf;
use std::sync::OnceLock;

use eventlog_store::{FileStore, MemoryStore};

use crate::engine::EventLog;

static GLOBAL: OnceLock<EventLog> = OnceLock::new();

/// Directory used by [`global`] for persisted records.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("eventlog"))
}

/// Returns the process-wide event log, building it on first use.
///
/// The instance persists to a file store under [`default_data_dir`], or keeps
/// events in memory when the platform has no data directory. It still needs
/// an [`EventLog::init`] call before reads work.
pub fn global() -> &'static EventLog {
    GLOBAL.get_or_init(|| {
        let builder = EventLog::builder();
        let builder = if let Some(dir) = default_data_dir() {
            tracing::debug!(dir = %dir.display(), "default event log uses file storage");
            builder.storage(FileStore::new(dir))
        } else {
            tracing::warn!("no data directory available, default event log is in-memory");
            builder.storage(MemoryStore::new())
        };
        builder.build()
    })
}
