//! Access-method error types

use thiserror::Error;

use crate::lock::LockError;
use crate::page::PageError;
use crate::redo::RedoError;

/// Result type for access-method operations
pub type AmResult<T> = Result<T, AmError>;

/// Errors raised by the tree access method
#[derive(Debug, Error)]
pub enum AmError {
    /// Lock could not be acquired; retryable.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Page layer failure.
    #[error(transparent)]
    Page(#[from] PageError),

    /// Redo logging failure.
    #[error(transparent)]
    Redo(#[from] RedoError),

    /// An on-page item could not be decoded.
    #[error("corrupt index entry: {reason}")]
    CorruptEntry { reason: String },
}

impl AmError {
    pub fn corrupt_entry(reason: impl Into<String>) -> Self {
        AmError::CorruptEntry {
            reason: reason.into(),
        }
    }
}
