//! Command-line interface for dockrun.
//!
//! Provides commands for running tasks, destroying containers by name,
//! listing cluster members and managing volumes.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
