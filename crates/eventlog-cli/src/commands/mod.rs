//! CLI subcommand implementations.

pub mod clear;
pub mod events;
pub mod export;
pub mod record;
pub mod status;
