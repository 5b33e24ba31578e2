//! Tree structure and the read side of the access method
//!
//! Block 0 of every index relation is the meta page; it points at the root.
//! Descent prunes by the bounding intervals on internal items and records a
//! resume frame per internal level, holding the next child slot to try when
//! the scan climbs back. Split adjustment resets those frames to the first
//! slot, so a resumed climb re-examines the renumbered page from the start.

use crate::page::{
    BlockNumber, PageError, PageStore, RelationId, SlotNumber, SpecialArea, FIRST_SLOT,
    INVALID_BLOCK,
};
use crate::scan::{
    keys_match, keys_overlap, AccessMethod, DescentStack, Direction, EntryMatch, ItemPosition,
    Position, ScanKey, StackFrame,
};

use super::entry::{IndexEntry, InternalEntry};
use super::errors::{AmError, AmResult};

/// Block number of the meta page in every index relation.
pub const META_BLOCK: BlockNumber = 0;

/// Default number of items a page holds before it splits.
pub const DEFAULT_PAGE_CAPACITY: usize = 32;

/// The interval-tree access method. Stateless apart from the split
/// threshold; all tree state lives in the page store.
#[derive(Debug, Clone, Copy)]
pub struct TreeAm {
    capacity: usize,
}

impl Default for TreeAm {
    fn default() -> Self {
        TreeAm {
            capacity: DEFAULT_PAGE_CAPACITY,
        }
    }
}

impl TreeAm {
    pub fn new() -> Self {
        TreeAm::default()
    }

    /// A tree that splits pages beyond `capacity` items. Small capacities
    /// force deep trees, which the tests rely on.
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity >= 2, "a page must hold at least two items");
        TreeAm { capacity }
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    /// The root block and its level, or `None` for an empty tree.
    pub(super) fn root(
        &self,
        pages: &PageStore,
        relation: RelationId,
    ) -> AmResult<Option<(BlockNumber, u32)>> {
        let meta = pages.read(relation, META_BLOCK)?;
        match meta.special_area() {
            SpecialArea::Meta {
                root, root_level, ..
            } => Ok((*root != INVALID_BLOCK).then_some((*root, *root_level))),
            SpecialArea::Tree { .. } => {
                Err(AmError::corrupt_entry("meta block holds a tree page"))
            }
        }
    }

    /// Walks down to the first candidate leaf position, starting either at
    /// `descend_to` or from the top resume frame of `stack`.
    fn find_leaf(
        &self,
        pages: &PageStore,
        relation: RelationId,
        direction: Direction,
        internal_keys: &[ScanKey],
        stack: &mut DescentStack,
        mut descend_to: Option<BlockNumber>,
    ) -> AmResult<Position> {
        loop {
            let block = match descend_to.take() {
                Some(block) => block,
                None => {
                    // Resume at the deepest frame: try its remaining children.
                    let Some(top) = stack.top_mut() else {
                        return Ok(Position::Invalid);
                    };
                    let page = match pages.read(relation, top.block) {
                        Ok(page) => page,
                        Err(PageError::BadBlock { .. }) => {
                            stack.pop();
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    let max = page.max_slot();
                    let mut slot = top.child_slot;
                    let mut chosen = None;
                    while (FIRST_SLOT..=max).contains(&slot) {
                        let next = next_slot_after(direction, slot);
                        let downlink = InternalEntry::decode(page.item(slot)?)?;
                        if keys_overlap(internal_keys, downlink.low, downlink.high) {
                            top.child_slot = next;
                            chosen = Some(downlink.child);
                            break;
                        }
                        slot = next;
                    }
                    match chosen {
                        Some(child) => child,
                        None => {
                            stack.pop();
                            continue;
                        }
                    }
                }
            };

            let page = match pages.read(relation, block) {
                Ok(page) => page,
                Err(PageError::BadBlock { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            match page.special_area() {
                SpecialArea::Meta { .. } => {
                    return Err(AmError::corrupt_entry("downlink points at the meta block"))
                }
                SpecialArea::Tree { level: 0, .. } => {
                    let max = page.max_slot();
                    if max == 0 {
                        // Empty leaf: resume from the stack
                        continue;
                    }
                    let slot = if direction.is_forward() { FIRST_SLOT } else { max };
                    return Ok(Position::Known(ItemPosition::new(block, slot)));
                }
                SpecialArea::Tree { .. } => {
                    let max = page.max_slot();
                    let mut slot = if direction.is_forward() { FIRST_SLOT } else { max };
                    let mut entered = false;
                    while (FIRST_SLOT..=max).contains(&slot) {
                        let downlink = InternalEntry::decode(page.item(slot)?)?;
                        if keys_overlap(internal_keys, downlink.low, downlink.high) {
                            stack.push(StackFrame::new(block, next_slot_after(direction, slot)));
                            descend_to = Some(downlink.child);
                            entered = true;
                            break;
                        }
                        slot = next_slot_after(direction, slot);
                    }
                    if !entered {
                        // No qualifying child under this page
                        continue;
                    }
                }
            }
        }
    }
}

/// The slot a scan tries after `slot` in its direction. May be 0 or beyond
/// the page's maximum, which the range checks above treat as exhausted.
fn next_slot_after(direction: Direction, slot: SlotNumber) -> SlotNumber {
    if direction.is_forward() {
        slot + 1
    } else {
        slot - 1
    }
}

impl AccessMethod for TreeAm {
    fn locate_first(
        &self,
        pages: &PageStore,
        relation: RelationId,
        direction: Direction,
        internal_keys: &[ScanKey],
        stack: &mut DescentStack,
    ) -> AmResult<Position> {
        stack.clear();
        let Some((root, _)) = self.root(pages, relation)? else {
            return Ok(Position::Invalid);
        };
        self.find_leaf(pages, relation, direction, internal_keys, stack, Some(root))
    }

    fn locate_next(
        &self,
        pages: &PageStore,
        relation: RelationId,
        direction: Direction,
        internal_keys: &[ScanKey],
        from: ItemPosition,
        stack: &mut DescentStack,
    ) -> AmResult<Position> {
        match pages.read(relation, from.block) {
            Ok(page) => {
                if direction.is_forward() {
                    if from.slot < page.max_slot() {
                        return Ok(Position::Known(ItemPosition::new(
                            from.block,
                            from.slot + 1,
                        )));
                    }
                } else if from.slot > FIRST_SLOT {
                    return Ok(Position::Known(ItemPosition::new(from.block, from.slot - 1)));
                }
            }
            // The page was unlinked under the scan; climb instead.
            Err(PageError::BadBlock { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.find_leaf(pages, relation, direction, internal_keys, stack, None)
    }

    fn examine(
        &self,
        pages: &PageStore,
        relation: RelationId,
        pos: ItemPosition,
        keys: &[ScanKey],
    ) -> AmResult<EntryMatch> {
        let page = match pages.read(relation, pos.block) {
            Ok(page) => page,
            Err(PageError::BadBlock { .. }) => return Ok(EntryMatch::Vanished),
            Err(e) => return Err(e.into()),
        };
        if matches!(
            page.special_area(),
            SpecialArea::Tree {
                half_dead: true,
                ..
            }
        ) {
            return Ok(EntryMatch::NoMatch);
        }
        if pos.slot > page.max_slot() {
            return Ok(EntryMatch::Vanished);
        }
        let entry = IndexEntry::decode(page.item(pos.slot)?)?;
        Ok(if keys_match(keys, entry.key) {
            EntryMatch::Match(entry)
        } else {
            EntryMatch::NoMatch
        })
    }

    fn translate_keys(&self, keys: &[ScanKey]) -> Vec<ScanKey> {
        keys.iter()
            .map(|key| match key {
                // Equality at the leaf is containment one level up
                ScanKey::Equal(k) => ScanKey::Range {
                    low: Some(*k),
                    high: Some(*k),
                },
                range => *range,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::am::entry::RowPointer;
    use crate::page::Page;

    const REL: RelationId = 3;

    /// Two leaves under one root: keys 1..=3 on block 2, 10..=12 on block 3.
    fn two_leaf_tree() -> PageStore {
        let pages = PageStore::new();
        pages.write(REL, META_BLOCK, Page::new_meta(1, 1));

        let mut root = Page::new_tree(1);
        root.append_item(
            InternalEntry {
                low: 1,
                high: 3,
                child: 2,
            }
            .encode(),
        );
        root.append_item(
            InternalEntry {
                low: 10,
                high: 12,
                child: 3,
            }
            .encode(),
        );
        pages.write(REL, 1, root);

        for (block, keys) in [(2u32, [1i64, 2, 3]), (3, [10, 11, 12])] {
            let mut leaf = Page::new_tree(0);
            for (i, key) in keys.into_iter().enumerate() {
                leaf.append_item(IndexEntry::single(key, RowPointer::new(1, i as u16 + 1)).encode());
            }
            pages.write(REL, block, leaf);
        }
        pages
    }

    fn collect(
        am: &TreeAm,
        pages: &PageStore,
        direction: Direction,
        keys: &[ScanKey],
    ) -> Vec<i64> {
        let internal = am.translate_keys(keys);
        let mut stack = DescentStack::new();
        let mut out = Vec::new();
        let mut pos = am
            .locate_first(pages, REL, direction, &internal, &mut stack)
            .unwrap();
        while let Position::Known(p) = pos {
            match am.examine(pages, REL, p, keys).unwrap() {
                EntryMatch::Match(entry) => out.push(entry.key),
                EntryMatch::NoMatch | EntryMatch::Vanished => {}
            }
            pos = am
                .locate_next(pages, REL, direction, &internal, p, &mut stack)
                .unwrap();
        }
        out
    }

    #[test]
    fn test_forward_walk_crosses_leaves() {
        let pages = two_leaf_tree();
        let am = TreeAm::new();
        assert_eq!(collect(&am, &pages, Direction::Forward, &[]), vec![1, 2, 3, 10, 11, 12]);
    }

    #[test]
    fn test_backward_walk_reverses_order() {
        let pages = two_leaf_tree();
        let am = TreeAm::new();
        assert_eq!(
            collect(&am, &pages, Direction::Backward, &[]),
            vec![12, 11, 10, 3, 2, 1]
        );
    }

    #[test]
    fn test_equality_descent_prunes_other_subtrees() {
        let pages = two_leaf_tree();
        let am = TreeAm::new();
        let keys = [ScanKey::Equal(11)];
        assert_eq!(collect(&am, &pages, Direction::Forward, &keys), vec![11]);

        // The pruned descent never touches the left leaf
        let internal = am.translate_keys(&keys);
        let mut stack = DescentStack::new();
        let pos = am
            .locate_first(&pages, REL, Direction::Forward, &internal, &mut stack)
            .unwrap();
        assert_eq!(pos, Position::Known(ItemPosition::new(3, FIRST_SLOT)));
    }

    #[test]
    fn test_empty_tree_has_no_first_position() {
        let pages = PageStore::new();
        pages.write(REL, META_BLOCK, Page::new_meta(INVALID_BLOCK, 0));
        let am = TreeAm::new();
        let mut stack = DescentStack::new();
        let pos = am
            .locate_first(&pages, REL, Direction::Backward, &[], &mut stack)
            .unwrap();
        assert_eq!(pos, Position::Invalid);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_restarted_frame_revisits_children() {
        let pages = two_leaf_tree();
        let am = TreeAm::new();
        let mut stack = DescentStack::new();
        let pos = am
            .locate_first(&pages, REL, Direction::Forward, &[], &mut stack)
            .unwrap();
        assert_eq!(pos, Position::Known(ItemPosition::new(2, 1)));

        // As if the root split: resume from its first child slot again
        stack.restart_block(1);
        let pos = am
            .locate_next(
                &pages,
                REL,
                Direction::Forward,
                &[],
                ItemPosition::new(2, 3),
                &mut stack,
            )
            .unwrap();
        assert_eq!(pos, Position::Known(ItemPosition::new(2, FIRST_SLOT)));
    }

    #[test]
    fn test_examine_reports_vanished_slot() {
        let pages = two_leaf_tree();
        let am = TreeAm::new();
        assert_eq!(
            am.examine(&pages, REL, ItemPosition::new(2, 9), &[]).unwrap(),
            EntryMatch::Vanished
        );
    }
}
