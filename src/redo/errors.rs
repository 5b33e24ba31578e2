//! Redo codec and log error types

use std::io;

use thiserror::Error;

/// Result type for redo operations
pub type RedoResult<T> = Result<T, RedoError>;

/// Errors raised by the redo codec and the redo log
#[derive(Debug, Error)]
pub enum RedoError {
    /// A record buffer could not be parsed. Fatal for that decode call only:
    /// recovery stops, diagnostics print a corruption marker and continue.
    #[error("corrupt redo record: {reason}")]
    CorruptRecord { reason: String },

    /// Log framing damage: bad checksum or a truncated frame.
    #[error("corrupt redo log at offset {offset}: {reason}")]
    CorruptLog { offset: u64, reason: String },

    /// Underlying I/O failure on the log file.
    #[error("redo log I/O: {0}")]
    Io(#[from] io::Error),
}

impl RedoError {
    pub fn corrupt_record(reason: impl Into<String>) -> Self {
        RedoError::CorruptRecord {
            reason: reason.into(),
        }
    }

    pub fn corrupt_log(offset: u64, reason: impl Into<String>) -> Self {
        RedoError::CorruptLog {
            offset,
            reason: reason.into(),
        }
    }
}
