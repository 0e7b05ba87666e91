//! Event log CLI library.
//!
//! Drives an [`eventlog::EventLog`] backed by a `SQLite` database so events
//! can be recorded, inspected and exported from the shell.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, dirs_config_path, dirs_data_path};
