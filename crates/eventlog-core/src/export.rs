//! JSONL export of retained events.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventCategory};
use crate::types::{SessionId, ValidationError};

/// Number of most recent errors always included in a repro export.
pub const REPRO_ERROR_LIMIT: usize = 10;

/// Which events an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// The current and previous session plus recent errors.
    #[default]
    Repro,
    /// Every retained event.
    Full,
}

impl ExportMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Repro => "repro",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repro" => Ok(Self::Repro),
            "full" => Ok(Self::Full),
            _ => Err(ValidationError::UnknownExportMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Serializes events as JSON Lines, one event per line, no trailing newline.
///
/// `events` must be in chronological (buffer) order.
pub fn export_jsonl(events: &[Arc<Event>], mode: ExportMode) -> Result<String, serde_json::Error> {
    let selected = match mode {
        ExportMode::Full => events.to_vec(),
        ExportMode::Repro => repro_events(events),
    };
    let lines = selected
        .iter()
        .map(|event| serde_json::to_string(event.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Narrows events to a "what just happened" trace.
///
/// Keeps every event from the session of the newest event and from the
/// session seen immediately before it, adds the last
/// [`REPRO_ERROR_LIMIT`] error events from anywhere, and sorts the result by
/// timestamp.
pub fn repro_events(events: &[Arc<Event>]) -> Vec<Arc<Event>> {
    let Some(last) = events.last() else {
        return Vec::new();
    };
    let current = &last.session_id;

    let mut seen = HashSet::new();
    let session_order: Vec<&SessionId> = events
        .iter()
        .map(|e| &e.session_id)
        .filter(|id| seen.insert(*id))
        .collect();
    let previous = session_order
        .iter()
        .position(|id| *id == current)
        .and_then(|index| index.checked_sub(1))
        .map(|index| session_order[index]);

    let mut combined: Vec<Arc<Event>> = events
        .iter()
        .filter(|e| &e.session_id == current || Some(&e.session_id) == previous)
        .cloned()
        .collect();

    let included: HashSet<_> = combined.iter().map(|e| e.event_id.clone()).collect();
    let errors: Vec<&Arc<Event>> = events
        .iter()
        .filter(|e| e.category == EventCategory::Error)
        .collect();
    let recent_errors = &errors[errors.len().saturating_sub(REPRO_ERROR_LIMIT)..];
    combined.extend(
        recent_errors
            .iter()
            .filter(|e| !included.contains(&e.event_id))
            .map(|e| Arc::clone(e)),
    );

    combined.sort_by_key(|e| e.timestamp);
    combined
}
