//! Usage sessions and the warm/cold resume rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Whether a session was freshly started or resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartType {
    /// No resumable session was found.
    Cold,
    /// A persisted session was resumed within the timeout window.
    Warm,
}

impl StartType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
        }
    }
}

impl fmt::Display for StartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cold" => Ok(Self::Cold),
            "warm" => Ok(Self::Warm),
            _ => Err(format!("invalid start type: {s}")),
        }
    }
}

/// A bounded period of app usage.
///
/// Sessions are values: every mutation returns a new `Session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    /// Epoch milliseconds.
    pub session_start: i64,
    pub start_type: StartType,
    /// Next sequence number to assign.
    pub seq: u64,
    /// Epoch milliseconds of the last logged event.
    pub last_activity_time: i64,
}

impl Session {
    /// Starts a new session with `seq = 0` at `now`.
    pub fn create(start_type: StartType, now: i64) -> Self {
        Self {
            session_id: SessionId::generate(),
            session_start: now,
            start_type,
            seq: 0,
            last_activity_time: now,
        }
    }

    /// Picks up a persisted session if it is still live, else starts a cold one.
    ///
    /// A session is live when `now - last_activity_time < timeout_ms`; a gap
    /// equal to the timeout counts as expired. Resumed sessions are marked warm.
    pub fn resume_or_create(persisted: Option<Self>, now: i64, timeout_ms: i64) -> Self {
        match persisted {
            Some(session) if !session.is_expired(now, timeout_ms) => Self {
                start_type: StartType::Warm,
                ..session
            },
            _ => Self::create(StartType::Cold, now),
        }
    }

    pub const fn is_expired(&self, now: i64, timeout_ms: i64) -> bool {
        now.saturating_sub(self.last_activity_time) >= timeout_ms
    }

    /// Returns a copy with `seq` advanced by one.
    #[must_use]
    pub fn incremented(&self) -> Self {
        Self {
            seq: self.seq.saturating_add(1),
            ..self.clone()
        }
    }

    /// Returns a copy with `last_activity_time` set to `now`.
    #[must_use]
    pub fn with_activity(&self, now: i64) -> Self {
        Self {
            last_activity_time: now,
            ..self.clone()
        }
    }
}
