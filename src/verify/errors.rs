//! Verification error types

use thiserror::Error;

use crate::page::PageError;
use crate::redo::RedoError;

/// Infrastructure failures during a verification pass. Structural findings
/// are never errors; they land in the report's problem list.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Redo(#[from] RedoError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
