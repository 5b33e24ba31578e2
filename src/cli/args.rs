//! CLI argument definitions using clap
//!
//! Commands:
//! - arbordb dump <log>
//! - arbordb stats <log>
//! - arbordb check <log>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ArborDB redo log tooling
#[derive(Parser, Debug)]
#[command(name = "arbordb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every record in a redo log, one line per entry
    Dump {
        /// Path to the redo log file
        log: PathBuf,
    },

    /// Summarize a redo log: record counts per kind, relations touched
    Stats {
        /// Path to the redo log file
        log: PathBuf,

        /// Emit the summary as a single JSON object
        #[arg(long)]
        json: bool,
    },

    /// Verify a redo log, replay it, and check the rebuilt trees
    Check {
        /// Path to the redo log file
        log: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
