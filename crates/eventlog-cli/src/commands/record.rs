//! Recording commands.
//!
//! Each invocation is short-lived, so the log is flushed before returning
//! instead of waiting for the debounced background write.

use anyhow::{Context, Result};
use eventlog::{EventLog, LogLevel};
use serde_json::Value;

/// One event to record.
#[derive(Debug)]
pub enum Entry<'a> {
    Screen {
        name: &'a str,
        params: Option<Value>,
    },
    Action {
        name: &'a str,
        data: Option<Value>,
    },
    Log {
        level: LogLevel,
        message: &'a str,
        data: Option<Value>,
    },
    Error {
        message: &'a str,
        context: Option<Value>,
    },
}

pub async fn run(log: &EventLog, entry: Entry<'_>) -> Result<()> {
    let recorded = match entry {
        Entry::Screen { name, params } => log.screen(name, params),
        Entry::Action { name, data } => log.action(name, data),
        Entry::Log {
            level,
            message,
            data,
        } => log.log(level, message, data),
        Entry::Error { message, context } => log.error(message, context),
    };
    recorded.context("failed to record event")?;

    log.flush().await.context("failed to persist event log")?;
    tracing::debug!("event recorded");
    Ok(())
}
