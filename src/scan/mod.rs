//! Index scan protocol
//!
//! A scan is a cursor over one index relation: open it with a direction and
//! search keys, pull entries with `get_next`, optionally mark and restore a
//! position, close it. The cursor survives concurrent structural mutation of
//! the tree because every writer repairs all open scans through the registry
//! before releasing its structural lock.
//!
//! The protocol is polymorphic over [`AccessMethod`]: the descriptor owns the
//! lifecycle and the position state machine, the access method resolves
//! positions against the tree and decides what matches.

mod adjust;
mod descriptor;
mod errors;
mod position;
mod registry;
mod stack;

pub use adjust::{adjust_scan, broadcast, StructuralChange};
pub use descriptor::ScanDescriptor;
pub use errors::{ScanError, ScanResult};
pub use position::{ItemPosition, Position, PositionTriple, Step};
pub use registry::ScanRegistry;
pub use stack::{DescentStack, StackFrame};

use crate::am::entry::{IndexEntry, RowPointer};
use crate::am::AmResult;
use crate::page::{PageStore, RelationId};

/// Scan direction. Backward scans yield the same matches in reverse block
/// and slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// A search predicate on the (single) indexed key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKey {
    Equal(i64),
    Range { low: Option<i64>, high: Option<i64> },
}

impl ScanKey {
    /// Leaf-level test: does `key` satisfy this predicate?
    pub fn matches(&self, key: i64) -> bool {
        match self {
            ScanKey::Equal(k) => key == *k,
            ScanKey::Range { low, high } => {
                low.map_or(true, |l| key >= l) && high.map_or(true, |h| key <= h)
            }
        }
    }

    /// Internal-level test: can any key in `[low, high]` satisfy this
    /// predicate?
    pub fn overlaps(&self, low: i64, high: i64) -> bool {
        match self {
            ScanKey::Equal(k) => low <= *k && *k <= high,
            ScanKey::Range { low: l, high: h } => {
                l.map_or(true, |l| high >= l) && h.map_or(true, |h| low <= h)
            }
        }
    }
}

pub fn keys_match(keys: &[ScanKey], key: i64) -> bool {
    keys.iter().all(|k| k.matches(key))
}

pub fn keys_overlap(keys: &[ScanKey], low: i64, high: i64) -> bool {
    keys.iter().all(|k| k.overlaps(low, high))
}

/// One entry yielded by `get_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHit {
    pub key: i64,
    pub row: RowPointer,
}

/// Outcome of examining one slot against the scan keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMatch {
    Match(IndexEntry),
    NoMatch,
    /// The slot no longer exists; the position was stale.
    Vanished,
}

/// The part of a scan that structural-change adjustment may rewrite. It is
/// shared between the owning descriptor and the registry; the mutex makes
/// the writer's broadcast and the owner's `get_next` mutually exclusive.
#[derive(Debug, Default)]
pub struct ScanPosState {
    pub positions: PositionTriple,
    /// Current position is conceptually just before the first live slot.
    pub current_before_first: bool,
    pub mark: Position,
    pub mark_before_first: bool,
    /// Posting progress at the marked position.
    pub mark_posting_next: u16,
    /// Whether `mark` has been set since open/rescan.
    pub marked: bool,
    pub stack: DescentStack,
    pub marked_stack: DescentStack,
    /// Next row to yield within the current position's posting list.
    pub posting_next: u16,
    /// Whether the initial descent has happened since open/rescan.
    pub started: bool,
    /// Scan direction, mirrored here so adjustment can tell which neighbor
    /// of a deleted item the scan visits next.
    pub forward: bool,
}

impl ScanPosState {
    pub fn new() -> Self {
        ScanPosState::default()
    }

    /// Returns the state to the as-opened shape, keeping nothing cached.
    /// The direction is not a cache and survives.
    pub fn reset(&mut self) {
        let forward = self.forward;
        *self = ScanPosState::default();
        self.forward = forward;
    }
}

/// The capability set an indexable structure exposes to the scan protocol.
/// Resolved once at scan open and stored in the descriptor.
pub trait AccessMethod: Send + Sync {
    /// Descend to the first candidate position for the scan, pushing resume
    /// frames onto `stack`. Returns `Position::Invalid` when the structure
    /// holds no candidate.
    fn locate_first(
        &self,
        pages: &PageStore,
        relation: RelationId,
        direction: Direction,
        internal_keys: &[ScanKey],
        stack: &mut DescentStack,
    ) -> AmResult<Position>;

    /// The candidate position after `from` in `direction`, climbing and
    /// re-descending through `stack` as needed.
    fn locate_next(
        &self,
        pages: &PageStore,
        relation: RelationId,
        direction: Direction,
        internal_keys: &[ScanKey],
        from: ItemPosition,
        stack: &mut DescentStack,
    ) -> AmResult<Position>;

    /// Decode the entry at `pos` and test it against the leaf-level keys.
    fn examine(
        &self,
        pages: &PageStore,
        relation: RelationId,
        pos: ItemPosition,
        keys: &[ScanKey],
    ) -> AmResult<EntryMatch>;

    /// Rewrite leaf-level keys for use at internal levels, where an equality
    /// predicate becomes interval containment.
    fn translate_keys(&self, keys: &[ScanKey]) -> Vec<ScanKey>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_key_matches_and_overlaps() {
        let k = ScanKey::Equal(5);
        assert!(k.matches(5));
        assert!(!k.matches(6));
        assert!(k.overlaps(1, 5));
        assert!(k.overlaps(5, 9));
        assert!(!k.overlaps(6, 9));
    }

    #[test]
    fn test_range_key_bounds() {
        let k = ScanKey::Range {
            low: Some(3),
            high: None,
        };
        assert!(!k.matches(2));
        assert!(k.matches(3));
        assert!(k.matches(i64::MAX));
        assert!(k.overlaps(-10, 3));
        assert!(!k.overlaps(-10, 2));
    }

    #[test]
    fn test_keys_match_is_conjunctive() {
        let keys = [
            ScanKey::Range {
                low: Some(0),
                high: None,
            },
            ScanKey::Range {
                low: None,
                high: Some(10),
            },
        ];
        assert!(keys_match(&keys, 5));
        assert!(!keys_match(&keys, 11));
        assert!(!keys_match(&keys, -1));
    }
}
