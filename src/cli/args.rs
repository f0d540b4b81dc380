//! CLI argument definitions using clap
//!
//! Commands:
//! - pgha serve --config <path>
//! - pgha validate --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pgha - REST control plane for a PostgreSQL HA cluster
#[derive(Parser, Debug)]
#[command(name = "pgha")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the REST API for this node
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./pgha.json")]
        config: PathBuf,
    },

    /// Check a configuration file and exit
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./pgha.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
