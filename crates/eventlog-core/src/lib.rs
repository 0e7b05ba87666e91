//! Core domain logic for the event log.
//!
//! This crate contains the pure building blocks the engine composes:
//! - Events and sessions: construction, sequencing, the warm/cold resume rule
//! - Ring buffer: bounded, copy-on-write retention of recent events
//! - Sanitization: key redaction, depth limiting and size capping
//! - Query and export: filtering and JSONL output for diagnostics

pub mod buffer;
pub mod clock;
pub mod event;
pub mod export;
pub mod query;
pub mod sanitize;
pub mod session;
pub mod types;

pub use buffer::RingBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{
    ActionPayload, ErrorInput, ErrorPayload, Event, EventCategory, EventContext, LogLevel,
    LogPayload, NetworkEventPayload, ScreenPayload, to_payload,
};
pub use export::{ExportMode, export_jsonl, repro_events};
pub use query::{EventQuery, TimeRange, query_events};
pub use sanitize::sanitize_event;
pub use session::{Session, StartType};
pub use types::{EventId, SessionId, ValidationError};
