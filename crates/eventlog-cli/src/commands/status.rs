//! Status command for showing the session and retained events.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use eventlog::{EventCategory, EventLog};

pub fn run<W: Write>(writer: &mut W, log: &EventLog, database_path: &Path) -> Result<()> {
    let session = log.session()?;
    let events = log.get_events()?;

    writeln!(writer, "Event log status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(
        writer,
        "Session: {} ({}, next seq {})",
        session.session_id, session.start_type, session.seq
    )?;

    if events.is_empty() {
        writeln!(writer, "No events recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Events: {}", events.len())?;
    for category in EventCategory::ALL {
        let count = events.iter().filter(|e| e.category == category).count();
        if count > 0 {
            writeln!(writer, "- {category}: {count}")?;
        }
    }

    Ok(())
}
