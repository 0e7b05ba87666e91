//! Filtering and searching over an in-memory event collection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventCategory};
use crate::types::SessionId;

/// An inclusive timestamp range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub const fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Conjunctive event filter. Unset fields do not narrow the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    /// Keep events whose category is in this set. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<EventCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Case-insensitive substring matched against the serialized payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Keep only the most recent N matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn categories(mut self, categories: impl IntoIterator<Item = EventCategory>) -> Self {
        self.category = categories.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn time_range(mut self, start: i64, end: i64) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    #[must_use]
    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Applies `query` to `events`, preserving their relative order.
///
/// Filters run in order: category, time range, session, search, then the
/// limit, which keeps the tail (most recent) of what survived.
pub fn query_events(events: &[Arc<Event>], query: &EventQuery) -> Vec<Arc<Event>> {
    let needle = query
        .search
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut matched: Vec<Arc<Event>> = events
        .iter()
        .filter(|e| query.category.is_empty() || query.category.contains(&e.category))
        .filter(|e| query.time_range.is_none_or(|range| range.contains(e.timestamp)))
        .filter(|e| query.session_id.as_ref().is_none_or(|id| &e.session_id == id))
        .filter(|e| needle.as_deref().is_none_or(|n| payload_contains(e, n)))
        .cloned()
        .collect();

    if let Some(limit) = query.limit.filter(|l| *l > 0)
        && matched.len() > limit
    {
        matched.drain(..matched.len() - limit);
    }
    matched
}

fn payload_contains(event: &Event, needle_lower: &str) -> bool {
    serde_json::to_string(&event.payload)
        .map(|s| s.to_lowercase().contains(needle_lower))
        .unwrap_or(false)
}
