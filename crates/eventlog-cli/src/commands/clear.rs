//! Clear command.

use std::io::Write;

use anyhow::{Context, Result};
use eventlog::EventLog;

pub async fn run<W: Write>(writer: &mut W, log: &EventLog) -> Result<()> {
    let count = log.get_events()?.len();
    log.clear().await.context("failed to clear event log")?;
    writeln!(writer, "Cleared {count} events.")?;
    Ok(())
}
