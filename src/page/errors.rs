//! Page-layer error types

use thiserror::Error;

use super::{BlockNumber, RelationId, SlotNumber};

/// Result type for page operations
pub type PageResult<T> = Result<T, PageError>;

/// Errors raised by the page and buffer layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// Slot number outside the page's live slot range
    #[error("slot {slot} out of range (max slot {max})")]
    BadSlot { slot: SlotNumber, max: SlotNumber },

    /// Block does not exist in the relation
    #[error("relation {relation}: block {block} does not exist")]
    BadBlock {
        relation: RelationId,
        block: BlockNumber,
    },
}
