//! Recovery error types

use thiserror::Error;

use crate::page::{BlockNumber, PageError, RelationId};
use crate::redo::RedoError;

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A log entry mutates a page the store never heard of. The log is the
    /// authority during replay, so a missing target means the log and the
    /// store disagree about history.
    #[error("replay of seq {seq} targets missing page {relation}/{block}")]
    MissingPage {
        seq: u64,
        relation: RelationId,
        block: BlockNumber,
    },

    #[error(transparent)]
    Redo(#[from] RedoError),

    #[error(transparent)]
    Page(#[from] PageError),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
