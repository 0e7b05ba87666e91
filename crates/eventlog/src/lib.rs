//! Client-side event log.
//!
//! Captures structured events (screen views, actions, log lines, errors,
//! network calls), retains a bounded recent history in memory, persists it
//! through a [`StorageAdapter`], and exports it as JSONL for bug reports.
//!
//! ```no_run
//! # async fn run() -> Result<(), eventlog::EventLogError> {
//! use eventlog::{EventLog, ExportMode};
//! use eventlog_store::MemoryStore;
//!
//! let log = EventLog::builder().storage(MemoryStore::new()).build();
//! log.init(None).await?;
//! log.screen("Home", None)?;
//! let jsonl = log.export(ExportMode::Repro).await?;
//! # let _ = jsonl;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
mod engine;
pub mod error;
pub mod features;
mod instance;
pub mod network;
pub mod panic_capture;
mod persist;
pub mod scheduler;

pub use config::{ConfigOverrides, EventLogConfig, FeatureConfig, GlobalErrorsConfig, NetworkConfig};
pub use device::{DeviceInfoProvider, PlatformInfo, StaticDeviceInfo};
pub use engine::{EventLog, EventLogBuilder, Sanitizer};
pub use error::EventLogError;
pub use eventlog_core::{
    ErrorInput, Event, EventCategory, EventQuery, ExportMode, LogLevel, NetworkEventPayload,
    Session, SessionId, StartType,
};
pub use eventlog_store::StorageAdapter;
pub use features::{ErrorObserver, FeatureError, FeatureModule, Ingest, NetworkObserver};
pub use instance::{default_data_dir, global};
pub use network::{HttpExchange, NetworkRecorder};
pub use panic_capture::PanicCapture;
pub use persist::{EVENTS_KEY, SESSION_KEY};
pub use scheduler::{Debouncer, JobHandle, ManualScheduler, Scheduler, TokioScheduler};
