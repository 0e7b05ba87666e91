//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eventlog::{EventCategory, ExportMode, LogLevel};
use serde_json::Value;

/// Client-side event log.
///
/// Records screen views, actions, log lines and errors into a local database
/// and exports them as JSONL for bug reports.
#[derive(Debug, Parser)]
#[command(name = "eventlog", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the current session and retained event counts.
    Status,

    /// Query retained events, printed as JSONL.
    Events {
        /// Only include these categories (repeatable).
        #[arg(long = "category")]
        categories: Vec<EventCategory>,

        /// Only include events from this session id.
        #[arg(long)]
        session: Option<String>,

        /// Case-insensitive substring matched against the payload.
        #[arg(long)]
        search: Option<String>,

        /// Earliest timestamp (RFC 3339, e.g. 2025-01-29T12:00:00Z).
        #[arg(long)]
        since: Option<String>,

        /// Latest timestamp (RFC 3339).
        #[arg(long)]
        until: Option<String>,

        /// Keep only the most recent N matches.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Export retained events as JSONL.
    Export {
        /// `repro` keeps the current and previous session plus recent errors.
        #[arg(long, default_value_t = ExportMode::Repro)]
        mode: ExportMode,
    },

    /// Record a screen view.
    Screen {
        name: String,

        /// Screen parameters as a JSON value.
        #[arg(long, value_parser = parse_json)]
        params: Option<Value>,
    },

    /// Record a user action.
    Action {
        name: String,

        /// Action data as a JSON value.
        #[arg(long, value_parser = parse_json)]
        data: Option<Value>,
    },

    /// Record a log line.
    Log {
        /// One of debug, info, warn, error.
        level: LogLevel,

        message: String,

        /// Structured data as a JSON value.
        #[arg(long, value_parser = parse_json)]
        data: Option<Value>,
    },

    /// Record an error.
    Error {
        message: String,

        /// Error context as a JSON value.
        #[arg(long, value_parser = parse_json)]
        context: Option<Value>,
    },

    /// Delete all retained events. The session is kept.
    Clear,
}

fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}
