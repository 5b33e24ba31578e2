//! Lock manager error types

use thiserror::Error;

use crate::page::RelationId;

use super::LockMode;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Errors raised by the lock manager
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// The requested mode conflicts with a held lock. Retryable.
    #[error("lock unavailable: relation {relation} in mode {mode:?}")]
    Unavailable {
        relation: RelationId,
        mode: LockMode,
    },
}
