//! Scan adjustment after a structural change
//!
//! A writer that deletes a slot or splits a page renumbers that page's slots
//! under every open scan. Before it releases the structural lock it
//! broadcasts the change here, and each scan's cached position is rewritten
//! so the scan neither skips nor loses its place.
//!
//! The rules, applied to a scan's current and mark positions independently:
//!
//! * positions on other blocks are untouched;
//! * a delete at slot `d` decrements any position at slot >= `d`; a position
//!   that would fall below the first slot is clamped there with its boundary
//!   flag set, meaning "just before the first live slot";
//! * a position's posting offset survives only when its item survives: a
//!   delete of the positioned item itself discards it, per scan direction;
//! * a split renumbers the whole page, so positions on it restart at the
//!   first slot with the flag cleared, and every descent-stack frame on the
//!   split page restarts at its first child slot.
//!
//! Adjustment never fails: it rewrites scan-local state only, and runs while
//! the writer still holds the structural lock.

use crate::page::{BlockNumber, RelationId, SlotNumber, FIRST_SLOT};

use super::position::Position;
use super::registry::ScanRegistry;
use super::ScanPosState;

/// A slot-renumbering mutation of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralChange {
    /// The item at `slot` was removed; later slots shifted down by one.
    Delete { block: BlockNumber, slot: SlotNumber },
    /// The page's items were redistributed; its slot order is not stable.
    Split { block: BlockNumber },
}

impl StructuralChange {
    pub fn block(&self) -> BlockNumber {
        match self {
            StructuralChange::Delete { block, .. } => *block,
            StructuralChange::Split { block } => *block,
        }
    }
}

/// Repairs every open scan on `relation`. The caller must hold the
/// relation's structural lock for the whole broadcast.
pub fn broadcast(registry: &ScanRegistry, relation: RelationId, change: StructuralChange) {
    registry.for_each_scan(relation, |state| adjust_scan(state, change));
}

/// Applies `change` to one scan's cached state.
pub fn adjust_scan(state: &mut ScanPosState, change: StructuralChange) {
    let was_on_block = matches!(
        state.positions.current,
        Position::Known(p) if p.block == change.block()
    );
    let current_deleted = position_deleted(state.positions.current, change);
    let flagged_before = state.current_before_first;
    adjust_position(&mut state.positions.current, &mut state.current_before_first, change);
    // A decrement past a delete below the position keeps it on the same
    // item, so the cached posting offset stays valid. A clamp or a split
    // lands on a different item. A delete of the positioned item itself
    // leaves the decremented slot naming the predecessor: a forward scan
    // already returned it and must step past, a backward scan has not
    // visited it yet and examines it from its first row.
    let clamped = state.current_before_first && !flagged_before;
    if clamped || (was_on_block && matches!(change, StructuralChange::Split { .. })) {
        state.posting_next = 0;
    } else if current_deleted {
        state.posting_next = if state.forward { u16::MAX } else { 0 };
    }
    let mark_was_on_block = matches!(
        state.mark,
        Position::Known(p) if p.block == change.block()
    );
    let mark_deleted = position_deleted(state.mark, change);
    let mark_flagged_before = state.mark_before_first;
    adjust_position(&mut state.mark, &mut state.mark_before_first, change);
    let mark_clamped = state.mark_before_first && !mark_flagged_before;
    if mark_clamped || (mark_was_on_block && matches!(change, StructuralChange::Split { .. })) {
        state.mark_posting_next = 0;
    } else if mark_deleted {
        state.mark_posting_next = if state.forward { u16::MAX } else { 0 };
    }

    // previous/next are caches; previous is repaired silently, next is
    // re-resolved by the next step.
    let mut scratch = false;
    adjust_position(&mut state.positions.previous, &mut scratch, change);
    if let Position::Known(n) = state.positions.next {
        if n.block == change.block() {
            state.positions.next = Position::Unknown;
        }
    }

    match change {
        StructuralChange::Delete { block, slot } => {
            for frame in state.stack.frames_mut().chain(state.marked_stack.frames_mut()) {
                if frame.block == block && frame.child_slot >= slot {
                    frame.child_slot = frame.child_slot.saturating_sub(1).max(FIRST_SLOT);
                }
            }
        }
        StructuralChange::Split { block } => {
            state.stack.restart_block(block);
            state.marked_stack.restart_block(block);
            // A scan whose whole descent was this page has no frame left to
            // climb through, so it cannot find the new sibling. Restart the
            // descent from the root instead; re-reads are allowed, skips are
            // not.
            if was_on_block && state.stack.is_empty() {
                state.started = false;
            }
            if mark_was_on_block && state.marked_stack.is_empty() {
                state.mark = Position::Unknown;
            }
        }
    }
}

/// True when `change` removed the very item `position` sits on.
fn position_deleted(position: Position, change: StructuralChange) -> bool {
    matches!(
        (position, change),
        (Position::Known(p), StructuralChange::Delete { block, slot })
            if p.block == block && p.slot == slot
    )
}

fn adjust_position(position: &mut Position, before_first: &mut bool, change: StructuralChange) {
    let Position::Known(pos) = position else {
        return;
    };
    if pos.block != change.block() {
        return;
    }
    match change {
        StructuralChange::Delete { slot, .. } => {
            if pos.slot >= slot {
                if pos.slot > FIRST_SLOT {
                    pos.slot -= 1;
                } else {
                    pos.slot = FIRST_SLOT;
                    *before_first = true;
                }
            }
        }
        StructuralChange::Split { .. } => {
            pos.slot = FIRST_SLOT;
            *before_first = false;
        }
    }
}
