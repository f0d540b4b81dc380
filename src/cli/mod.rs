//! CLI module for pgha
//!
//! Provides command-line interface for:
//! - serve: Run the REST API for this node
//! - validate: Check a configuration file

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{run, run_command, serve, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
