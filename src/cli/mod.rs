//! CLI module for ArborDB log tooling
//!
//! - dump: print every log record
//! - stats: per-kind counts and relations touched
//! - check: verify the log, replay it, walk the rebuilt trees

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check, dump, run, stats};
pub use errors::{CliError, CliResult};
