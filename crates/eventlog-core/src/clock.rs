//! Time sources and timestamp formatting.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

/// Fallback timezone when the platform timezone cannot be resolved.
pub const FALLBACK_TIMEZONE: &str = "UTC";

/// A source of wall-clock time for event stamping and session bookkeeping.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// IANA timezone identifier of the host.
    fn timezone(&self) -> String {
        local_timezone()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A manually driven clock.
///
/// Clones share the same underlying time, so a test can hold one handle and
/// advance time seen by an engine holding another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
    timezone: String,
}

impl ManualClock {
    /// Creates a clock fixed at `now_millis` in the `UTC` timezone.
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_millis)),
            timezone: FALLBACK_TIMEZONE.to_string(),
        }
    }

    /// Uses the given IANA timezone instead of `UTC`.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Sets the current time.
    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn timezone(&self) -> String {
        self.timezone.clone()
    }
}

/// Returns the host's IANA timezone, or `UTC` if it cannot be determined.
pub fn local_timezone() -> String {
    match iana_time_zone::get_timezone() {
        Ok(tz) => tz,
        Err(e) => {
            tracing::debug!(error = %e, "could not resolve local timezone");
            FALLBACK_TIMEZONE.to_string()
        }
    }
}

/// Formats epoch milliseconds as RFC 3339 with millisecond precision and a `Z` suffix.
///
/// Out-of-range values fall back to the epoch.
pub fn format_iso_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
