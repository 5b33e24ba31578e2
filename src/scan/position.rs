//! Scan positions and the (previous, current, next) window
//!
//! A scan remembers where it is as a window of three positions. `previous`
//! and `next` are caches; `current` is the slot the next `get_next` call will
//! examine. Each position is in one of three states: invalid (no such item),
//! unknown (not yet resolved), or known (a concrete block and slot).
//!
//! The window moves only through the transitions below; any other shape is a
//! bug in the caller and is asserted against in debug builds:
//!
//! | transition        | meaning                                  |
//! |-------------------|------------------------------------------|
//! | `+ + -` → `+ 0 0` | next resolves to invalid: truncate       |
//! | `+ + -` → `+ X -` | next resolves to a real item             |
//! | `* 0 0` → `* 0 0` | absorbing no-movement state              |
//! | `+ X 0` → `X 0 0` | window shifts forward one                |
//! | `* + X` → `+ X -` | window shifts, new next unresolved       |
//!
//! (`0` invalid, `-` unknown, `X` known, `+` known-or-invalid, `*` any.)

use crate::page::{BlockNumber, SlotNumber};

/// A concrete (block, slot) location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPosition {
    pub block: BlockNumber,
    pub slot: SlotNumber,
}

impl ItemPosition {
    pub fn new(block: BlockNumber, slot: SlotNumber) -> Self {
        ItemPosition { block, slot }
    }
}

/// One position of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// There is no item here (never examined, or past the end).
    #[default]
    Invalid,
    /// Not yet resolved against the tree.
    Unknown,
    /// A concrete item location.
    Known(ItemPosition),
}

impl Position {
    pub fn is_known(&self) -> bool {
        matches!(self, Position::Known(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Position::Unknown)
    }

    /// Known-or-invalid, the `+` of the transition table.
    pub fn is_settled(&self) -> bool {
        !self.is_unknown()
    }

    pub fn known(&self) -> Option<ItemPosition> {
        match self {
            Position::Known(p) => Some(*p),
            _ => None,
        }
    }
}

/// Result of moving the window one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The window moved onto a known item.
    On(ItemPosition),
    /// The scan is at its end; the state is absorbing.
    Finished,
    /// `next` is unknown; resolve it with [`PositionTriple::resolve_next`]
    /// before stepping.
    NeedsResolve,
}

/// The (previous, current, next) window of one scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionTriple {
    pub previous: Position,
    pub current: Position,
    pub next: Position,
}

impl PositionTriple {
    pub fn new() -> Self {
        PositionTriple::default()
    }

    /// Returns all three positions to invalid, e.g. for rescan.
    pub fn reset(&mut self) {
        *self = PositionTriple::default();
    }

    /// Installs a freshly located current position, as after an initial
    /// descent or a restore. `previous` becomes invalid and `next` unknown.
    pub fn install(&mut self, current: Position) {
        debug_assert!(current.is_settled());
        self.previous = Position::Invalid;
        self.current = current;
        self.next = if current.is_known() {
            Position::Unknown
        } else {
            Position::Invalid
        };
    }

    /// Moves the window one step using the cached `next`.
    pub fn step(&mut self) -> Step {
        debug_assert!(self.previous.is_settled(), "previous must never be unknown");
        match self.next {
            Position::Unknown => {
                debug_assert!(
                    self.current.is_settled(),
                    "unresolved next beside unresolved current"
                );
                Step::NeedsResolve
            }
            Position::Known(n) => {
                // `* + X` → `+ X -`
                debug_assert!(self.current.is_settled());
                self.previous = self.current;
                self.current = Position::Known(n);
                self.next = Position::Unknown;
                Step::On(n)
            }
            Position::Invalid => match self.current {
                // `+ X 0` → `X 0 0`
                Position::Known(c) => {
                    self.previous = Position::Known(c);
                    self.current = Position::Invalid;
                    Step::Finished
                }
                // `* 0 0` → `* 0 0`
                Position::Invalid => Step::Finished,
                Position::Unknown => {
                    debug_assert!(false, "current unknown with settled next");
                    Step::Finished
                }
            },
        }
    }

    /// Resolves an unknown `next` into the current position: `+ + -` becomes
    /// `+ 0 0` when nothing follows, `+ X -` otherwise.
    pub fn resolve_next(&mut self, found: Option<ItemPosition>) -> Step {
        debug_assert!(self.next.is_unknown(), "resolve_next with settled next");
        debug_assert!(self.previous.is_settled());
        debug_assert!(self.current.is_settled());
        match found {
            None => {
                self.current = Position::Invalid;
                self.next = Position::Invalid;
                Step::Finished
            }
            Some(p) => {
                self.current = Position::Known(p);
                self.next = Position::Unknown;
                Step::On(p)
            }
        }
    }

    /// True once the scan has reached the absorbing end state.
    pub fn finished(&self) -> bool {
        matches!(self.current, Position::Invalid) && matches!(self.next, Position::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(block: u32, slot: u16) -> ItemPosition {
        ItemPosition::new(block, slot)
    }

    #[test]
    fn test_fresh_triple_is_finished() {
        let mut t = PositionTriple::new();
        assert!(t.finished());
        assert_eq!(t.step(), Step::Finished);
        assert!(t.finished());
    }

    #[test]
    fn test_install_then_resolve_walks_items() {
        let mut t = PositionTriple::new();
        t.install(Position::Known(pos(2, 1)));
        assert_eq!(t.current, Position::Known(pos(2, 1)));
        assert_eq!(t.next, Position::Unknown);

        // Moving requires resolving the unknown next
        assert_eq!(t.step(), Step::NeedsResolve);
        assert_eq!(t.resolve_next(Some(pos(2, 2))), Step::On(pos(2, 2)));
        assert_eq!(t.current, Position::Known(pos(2, 2)));

        // Nothing follows: truncate to the absorbing state
        assert_eq!(t.resolve_next(None), Step::Finished);
        assert!(t.finished());
        assert_eq!(t.previous, Position::Invalid);
    }

    #[test]
    fn test_step_through_known_next_shifts_window() {
        let mut t = PositionTriple {
            previous: Position::Invalid,
            current: Position::Known(pos(2, 4)),
            next: Position::Known(pos(2, 5)),
        };
        assert_eq!(t.step(), Step::On(pos(2, 5)));
        assert_eq!(t.previous, Position::Known(pos(2, 4)));
        assert_eq!(t.next, Position::Unknown);
    }

    #[test]
    fn test_step_onto_known_end_records_previous() {
        let mut t = PositionTriple {
            previous: Position::Invalid,
            current: Position::Known(pos(2, 9)),
            next: Position::Invalid,
        };
        assert_eq!(t.step(), Step::Finished);
        assert_eq!(t.previous, Position::Known(pos(2, 9)));
        assert!(t.finished());
    }

    #[test]
    fn test_install_invalid_finishes_immediately() {
        let mut t = PositionTriple::new();
        t.install(Position::Invalid);
        assert!(t.finished());
    }
}
