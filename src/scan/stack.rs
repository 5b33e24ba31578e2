//! Descent resume stack
//!
//! While a scan walks the tree it records, per internal level, which page it
//! came through and which child slot to try next when it climbs back up. The
//! stack is a plain growable array; frames hold no pointers into pages, only
//! block and slot numbers, so a frame can outlive any page mutation and is
//! revalidated on use.

use crate::page::{BlockNumber, SlotNumber, FIRST_SLOT};

/// One level of the descent: the internal page and the next child slot to
/// examine there when the scan resumes at this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    pub block: BlockNumber,
    pub child_slot: SlotNumber,
}

impl StackFrame {
    pub fn new(block: BlockNumber, child_slot: SlotNumber) -> Self {
        StackFrame { block, child_slot }
    }
}

/// A scan-owned stack of [`StackFrame`]s, root at the bottom.
#[derive(Debug, Clone, Default)]
pub struct DescentStack {
    frames: Vec<StackFrame>,
}

impl DescentStack {
    pub fn new() -> Self {
        DescentStack::default()
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn top_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn frames_mut(&mut self) -> impl Iterator<Item = &mut StackFrame> {
        self.frames.iter_mut()
    }

    pub fn frames(&self) -> impl Iterator<Item = &StackFrame> {
        self.frames.iter()
    }

    /// Resets the child slot of every frame on `block` to the first slot.
    /// Used when `block`'s slots were renumbered by a split.
    pub fn restart_block(&mut self, block: BlockNumber) {
        for frame in self.frames.iter_mut() {
            if frame.block == block {
                frame.child_slot = FIRST_SLOT;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut stack = DescentStack::new();
        stack.push(StackFrame::new(1, 3));
        stack.push(StackFrame::new(4, 2));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop(), Some(StackFrame::new(4, 2)));
        assert_eq!(stack.pop(), Some(StackFrame::new(1, 3)));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_restart_block_touches_matching_frames_only() {
        let mut stack = DescentStack::new();
        stack.push(StackFrame::new(1, 3));
        stack.push(StackFrame::new(4, 2));
        stack.push(StackFrame::new(1, 7));
        stack.restart_block(1);
        let slots: Vec<(u32, u16)> = stack.frames().map(|f| (f.block, f.child_slot)).collect();
        assert_eq!(slots, vec![(1, FIRST_SLOT), (4, 2), (1, FIRST_SLOT)]);
    }
}
