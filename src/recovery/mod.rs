//! Crash recovery
//!
//! Replays the redo log against a page store. Replay is restartable: the
//! per-page LSN guard makes already-applied entries no-ops, so an
//! interrupted recovery simply runs again from the start of the log.

mod errors;
mod replay;

pub use errors::{RecoveryError, RecoveryResult};
pub use replay::{EntrySource, RedoReplayer, ReplayStats};
