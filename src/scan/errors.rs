use thiserror::Error;

use crate::am::AmError;
use crate::lock::LockError;

/// Errors surfaced by the scan protocol.
///
/// Out-of-sequence mark/restore calls are programmer errors and are handled
/// with debug assertions rather than an error variant.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Tree(#[from] AmError),
}

pub type ScanResult<T> = Result<T, ScanError>;
