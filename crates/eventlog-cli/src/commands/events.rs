//! Events command for querying retained events.
//!
//! Matching events are printed as JSONL, oldest first.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::DateTime;
use eventlog::{EventCategory, EventLog, EventQuery, SessionId};

/// Filters accepted by the events command.
#[derive(Debug, Default)]
pub struct Filters<'a> {
    pub categories: &'a [EventCategory],
    pub session: Option<&'a str>,
    pub search: Option<&'a str>,
    pub since: Option<&'a str>,
    pub until: Option<&'a str>,
    pub limit: Option<usize>,
}

impl Filters<'_> {
    /// Builds the engine query, validating ids and timestamps.
    pub fn to_query(&self) -> Result<EventQuery> {
        let mut query = EventQuery::new().categories(self.categories.iter().copied());

        if let Some(session) = self.session {
            let id = SessionId::new(session).context("invalid --session")?;
            query = query.session(id);
        }
        if let Some(search) = self.search {
            query = query.search(search);
        }

        let since = parse_timestamp(self.since, "since")?;
        let until = parse_timestamp(self.until, "until")?;
        if since.is_some() || until.is_some() {
            query = query.time_range(since.unwrap_or(i64::MIN), until.unwrap_or(i64::MAX));
        }

        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// Runs the events command, writing one JSON object per line.
pub fn run<W: Write>(writer: &mut W, log: &EventLog, filters: &Filters<'_>) -> Result<()> {
    let query = filters.to_query()?;
    let events = log.query(&query)?;
    tracing::debug!(matched = events.len(), "queried events");

    for event in events {
        let json = serde_json::to_string(event.as_ref())?;
        writeln!(writer, "{json}")?;
    }

    Ok(())
}

fn parse_timestamp(s: Option<&str>, name: &str) -> Result<Option<i64>> {
    match s {
        None => Ok(None),
        Some(s) => {
            let dt = DateTime::parse_from_rfc3339(s).with_context(|| {
                format!(
                    "invalid --{name} timestamp, expected RFC 3339 (e.g., 2025-01-29T12:00:00Z)"
                )
            })?;
            Ok(Some(dt.timestamp_millis()))
        }
    }
}
