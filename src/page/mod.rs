//! Minimal page model for the access-method core
//!
//! A page is an ordered array of slots, each holding a variable-length item,
//! plus an access-method-private metadata area. Slot numbers are 1-based;
//! deleting a slot renumbers every slot above it, which is exactly why the
//! scan-adjustment broadcast exists.
//!
//! # Invariants
//!
//! - Slot numbers are contiguous from `FIRST_SLOT` to `max_slot()`
//! - The page LSN only ever moves forward
//! - Items are opaque bytes at this layer; only the access method interprets them

mod errors;
mod store;

pub use errors::{PageError, PageResult};
pub use store::PageStore;

/// Physical block number within a relation.
pub type BlockNumber = u32;

/// 1-based slot number within a page.
pub type SlotNumber = u16;

/// Relation identifier.
pub type RelationId = u32;

/// First valid slot number on any page.
pub const FIRST_SLOT: SlotNumber = 1;

/// Sentinel for "no block".
pub const INVALID_BLOCK: BlockNumber = u32::MAX;

/// Access-method-private metadata area of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialArea {
    /// Metadata page (block 0 of an index relation).
    Meta {
        /// Block number of the current root page
        root: BlockNumber,
        /// Level of the root page (0 = the root is a leaf)
        root_level: u32,
        /// Pages deleted by the most recent cleanup pass
        last_cleanup_deleted_pages: u32,
    },
    /// Ordinary tree page.
    Tree {
        /// Level of this page (0 = leaf)
        level: u32,
        /// Page is logically deleted but still linked from its parent
        half_dead: bool,
    },
}

impl SpecialArea {
    /// Level of a tree page; meta pages have no level.
    pub fn level(&self) -> Option<u32> {
        match self {
            SpecialArea::Tree { level, .. } => Some(*level),
            SpecialArea::Meta { .. } => None,
        }
    }

    /// True for leaf tree pages.
    pub fn is_leaf(&self) -> bool {
        matches!(self, SpecialArea::Tree { level: 0, .. })
    }
}

/// A single page: ordered slots of opaque items plus the special area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    items: Vec<Vec<u8>>,
    special: SpecialArea,
    /// LSN of the last redo record applied to this page. Used by recovery to
    /// make `apply` idempotent.
    lsn: u64,
}

impl Page {
    /// Creates an empty tree page at the given level.
    pub fn new_tree(level: u32) -> Self {
        Self {
            items: Vec::new(),
            special: SpecialArea::Tree {
                level,
                half_dead: false,
            },
            lsn: 0,
        }
    }

    /// Creates a metadata page pointing at the given root.
    pub fn new_meta(root: BlockNumber, root_level: u32) -> Self {
        Self {
            items: Vec::new(),
            special: SpecialArea::Meta {
                root,
                root_level,
                last_cleanup_deleted_pages: 0,
            },
            lsn: 0,
        }
    }

    /// Highest valid slot number; 0 when the page is empty.
    pub fn max_slot(&self) -> SlotNumber {
        self.items.len() as SlotNumber
    }

    /// Returns the item at `slot`.
    pub fn item(&self, slot: SlotNumber) -> PageResult<&[u8]> {
        if slot < FIRST_SLOT || slot > self.max_slot() {
            return Err(PageError::BadSlot {
                slot,
                max: self.max_slot(),
            });
        }
        Ok(&self.items[(slot - 1) as usize])
    }

    /// Inserts an item at `slot`, shifting higher slots up.
    /// `slot` may be `max_slot() + 1` to append.
    pub fn insert_item(&mut self, slot: SlotNumber, bytes: Vec<u8>) -> PageResult<()> {
        if slot < FIRST_SLOT || slot > self.max_slot() + 1 {
            return Err(PageError::BadSlot {
                slot,
                max: self.max_slot(),
            });
        }
        self.items.insert((slot - 1) as usize, bytes);
        Ok(())
    }

    /// Appends an item, returning its slot number.
    pub fn append_item(&mut self, bytes: Vec<u8>) -> SlotNumber {
        self.items.push(bytes);
        self.max_slot()
    }

    /// Removes the item at `slot`, renumbering higher slots down.
    pub fn remove_item(&mut self, slot: SlotNumber) -> PageResult<Vec<u8>> {
        if slot < FIRST_SLOT || slot > self.max_slot() {
            return Err(PageError::BadSlot {
                slot,
                max: self.max_slot(),
            });
        }
        Ok(self.items.remove((slot - 1) as usize))
    }

    /// Replaces the item at `slot` in place. Slot numbering is unaffected,
    /// so no scan adjustment is required for this operation.
    pub fn replace_item(&mut self, slot: SlotNumber, bytes: Vec<u8>) -> PageResult<()> {
        if slot < FIRST_SLOT || slot > self.max_slot() {
            return Err(PageError::BadSlot {
                slot,
                max: self.max_slot(),
            });
        }
        self.items[(slot - 1) as usize] = bytes;
        Ok(())
    }

    /// Drops every slot at or above `first_removed`, keeping lower slots.
    pub fn truncate_items(&mut self, first_removed: SlotNumber) {
        let keep = (first_removed.saturating_sub(1)) as usize;
        self.items.truncate(keep);
    }

    /// Access-method-private metadata area.
    pub fn special_area(&self) -> &SpecialArea {
        &self.special
    }

    /// Mutable access to the special area.
    pub fn special_area_mut(&mut self) -> &mut SpecialArea {
        &mut self.special
    }

    /// LSN of the last applied redo record.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    /// Advances the page LSN. The LSN never moves backward.
    pub fn set_lsn(&mut self, lsn: u64) {
        debug_assert!(lsn >= self.lsn, "page LSN moved backward");
        self.lsn = lsn;
    }
}
