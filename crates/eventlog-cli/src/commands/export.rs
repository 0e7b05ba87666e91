//! Export command for writing retained events as JSONL.

use std::io::Write;

use anyhow::{Context, Result};
use eventlog::{EventLog, ExportMode};

pub async fn run<W: Write>(writer: &mut W, log: &EventLog, mode: ExportMode) -> Result<()> {
    let jsonl = log.export(mode).await.context("failed to export events")?;
    if !jsonl.is_empty() {
        writeln!(writer, "{jsonl}")?;
    }
    Ok(())
}
