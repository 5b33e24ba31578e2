//! Structural mutation of the tree
//!
//! Every writer takes the relation's structural lock, logs a redo record for
//! each page-level change before mutating the page, stamps the record's
//! sequence number into the page LSN, and broadcasts a scan adjustment for
//! every mutation that renumbers slots. Appends and in-place replacements
//! never renumber, so inserts only broadcast when they split.

use crate::context::EngineContext;
use crate::lock::LockMode;
use crate::observability::Logger;
use crate::page::{
    BlockNumber, Page, RelationId, SlotNumber, SpecialArea, FIRST_SLOT, INVALID_BLOCK,
};
use crate::redo::{
    encode_dedup_payload, encode_root_payload, encode_split_payload, FullTransactionId,
    InsertTarget, PostingUpdate, RedoRecord, RedoSink, RelationLocator, SplitSide,
};
use crate::scan::{broadcast, StructuralChange};

use super::entry::{IndexEntry, InternalEntry, RowPointer};
use super::errors::{AmError, AmResult};
use super::tree::{TreeAm, META_BLOCK};

/// Tablespace and database components of the reuse-record locator. This
/// engine has a single space and database.
const SPACE: u32 = 1;
const DATABASE: u32 = 1;

/// Counters reported by a vacuum pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VacuumStats {
    pub entries_removed: u64,
    pub postings_trimmed: u64,
}

fn full_xid(horizon: u64) -> FullTransactionId {
    FullTransactionId {
        epoch: (horizon >> 32) as u32,
        xid: horizon as u32,
    }
}

impl TreeAm {
    /// Creates an empty index relation: a meta page with no root.
    pub fn create(&self, ctx: &EngineContext, relation: RelationId) -> AmResult<()> {
        ctx.locks.acquire(relation, LockMode::Structural)?;
        ctx.pages
            .write(relation, META_BLOCK, Page::new_meta(INVALID_BLOCK, 0));
        ctx.locks.release(relation, LockMode::Structural);
        Ok(())
    }

    /// Inserts one (key, row) pair, growing a posting list when the key
    /// already exists and splitting pages on the way when they are full.
    pub fn insert(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        key: i64,
        row: RowPointer,
    ) -> AmResult<()> {
        ctx.locks.acquire(relation, LockMode::Structural)?;
        let result = self.insert_locked(ctx, sink, relation, key, row);
        ctx.locks.release(relation, LockMode::Structural);
        result
    }

    fn insert_locked(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        key: i64,
        row: RowPointer,
    ) -> AmResult<()> {
        let Some((root, _)) = self.root(&ctx.pages, relation)? else {
            // First entry: the root is a single-item leaf
            let (block, reused) = ctx.pages.allocate(relation);
            if reused {
                self.log_reuse(sink, relation, block, 0)?;
            }
            let item = IndexEntry::single(key, row).encode();
            let seq = sink.append(
                relation,
                block,
                META_BLOCK,
                RedoRecord::NewRoot { level: 0 },
                encode_root_payload(&[item.clone()]),
            )?;
            let mut page = Page::new_tree(0);
            page.append_item(item);
            page.set_lsn(seq);
            ctx.pages.write(relation, block, page);
            self.set_root(ctx, relation, block, 0)?;
            return Ok(());
        };

        // Descend to the best leaf, recording the downlink path
        let mut path: Vec<(BlockNumber, SlotNumber)> = Vec::new();
        let mut block = root;
        loop {
            let page = ctx.pages.read(relation, block)?;
            match page.special_area() {
                SpecialArea::Tree { level: 0, .. } => break,
                SpecialArea::Tree { .. } => {
                    let (slot, downlink) = choose_child(&page, key)?;
                    path.push((block, slot));
                    block = downlink.child;
                }
                SpecialArea::Meta { .. } => {
                    return Err(AmError::corrupt_entry("descent reached the meta block"))
                }
            }
        }

        let page = ctx.pages.read(relation, block)?;
        for slot in FIRST_SLOT..=page.max_slot() {
            let mut entry = IndexEntry::decode(page.item(slot)?)?;
            if entry.key != key {
                continue;
            }
            if entry.rows.contains(&row) {
                return Ok(());
            }
            entry.rows.push(row);
            entry.rows.sort_unstable();
            let bytes = entry.encode();
            let seq = sink.append(
                relation,
                block,
                INVALID_BLOCK,
                RedoRecord::Insert {
                    target: InsertTarget::Posting,
                    slot,
                },
                bytes.clone(),
            )?;
            ctx.pages.update(relation, block, |p| -> AmResult<()> {
                p.replace_item(slot, bytes)?;
                p.set_lsn(seq);
                Ok(())
            })??;
            return self.widen_path(ctx, sink, relation, root, &path, key);
        }

        if (page.max_slot() as usize) < self.capacity() {
            let slot = page.max_slot() + 1;
            let bytes = IndexEntry::single(key, row).encode();
            let seq = sink.append(
                relation,
                block,
                INVALID_BLOCK,
                RedoRecord::Insert {
                    target: InsertTarget::Leaf,
                    slot,
                },
                bytes.clone(),
            )?;
            ctx.pages.update(relation, block, |p| -> AmResult<()> {
                p.insert_item(slot, bytes)?;
                p.set_lsn(seq);
                Ok(())
            })??;
            return self.widen_path(ctx, sink, relation, root, &path, key);
        }

        // The leaf is full: split it, then retry against the reshaped tree
        self.split(ctx, sink, relation, block, key)?;
        self.insert_locked(ctx, sink, relation, key, row)
    }

    /// Widens the downlink intervals along `path` to cover `key`.
    fn widen_path(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        root: BlockNumber,
        path: &[(BlockNumber, SlotNumber)],
        key: i64,
    ) -> AmResult<()> {
        for &(block, slot) in path {
            let page = ctx.pages.read(relation, block)?;
            let mut downlink = InternalEntry::decode(page.item(slot)?)?;
            if downlink.contains(key) {
                continue;
            }
            downlink.widen(key);
            let bytes = downlink.encode();
            let target = if block == root {
                InsertTarget::Meta
            } else {
                InsertTarget::Upper
            };
            let seq = sink.append(
                relation,
                block,
                INVALID_BLOCK,
                RedoRecord::Insert { target, slot },
                bytes.clone(),
            )?;
            ctx.pages.update(relation, block, |p| -> AmResult<()> {
                p.replace_item(slot, bytes)?;
                p.set_lsn(seq);
                Ok(())
            })??;
        }
        Ok(())
    }

    /// Splits `block` in two, redistributing its items around the median
    /// key. `pending_key` is the key whose insertion forced the split; the
    /// record notes which half it will land in.
    fn split(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        block: BlockNumber,
        pending_key: i64,
    ) -> AmResult<()> {
        // The parent must have room for one extra downlink first
        let parent = self.parent_of(ctx, relation, block)?;
        if let Some((pblock, _)) = parent {
            let ppage = ctx.pages.read(relation, pblock)?;
            if ppage.max_slot() as usize >= self.capacity() {
                self.split(ctx, sink, relation, pblock, pending_key)?;
                return self.split(ctx, sink, relation, block, pending_key);
            }
        }

        let page = ctx.pages.read(relation, block)?;
        let level = page
            .special_area()
            .level()
            .ok_or_else(|| AmError::corrupt_entry("split of the meta block"))?;
        let mut keyed: Vec<(i64, Vec<u8>)> = Vec::with_capacity(page.max_slot() as usize);
        for slot in FIRST_SLOT..=page.max_slot() {
            let item = page.item(slot)?.to_vec();
            let key = item_order_key(&item, level)?;
            keyed.push((key, item));
        }
        keyed.sort_by_key(|(key, _)| *key);
        let mid = keyed.len() / 2;
        let split_key = keyed[mid].0;
        let left_items: Vec<Vec<u8>> = keyed[..mid].iter().map(|(_, it)| it.clone()).collect();
        let right_items: Vec<Vec<u8>> = keyed[mid..].iter().map(|(_, it)| it.clone()).collect();

        let (right_block, reused) = ctx.pages.allocate(relation);
        if reused {
            self.log_reuse(sink, relation, right_block, 0)?;
        }
        let side = if pending_key < split_key {
            SplitSide::Left
        } else {
            SplitSide::Right
        };
        let seq = sink.append(
            relation,
            block,
            right_block,
            RedoRecord::Split {
                side,
                level,
                first_right_slot: left_items.len() as SlotNumber + 1,
                // The pending item is re-inserted after the split
                new_item_slot: 0,
                posting_split_offset: 0,
            },
            encode_split_payload(level, &left_items, &right_items),
        )?;

        ctx.pages.update(relation, block, |p| {
            p.truncate_items(FIRST_SLOT);
            for item in &left_items {
                p.append_item(item.clone());
            }
            p.set_lsn(seq);
        })?;
        let mut right = Page::new_tree(level);
        for item in &right_items {
            right.append_item(item.clone());
        }
        right.set_lsn(seq);
        ctx.pages.write(relation, right_block, right);

        broadcast(&ctx.scans, relation, StructuralChange::Split { block });
        Logger::info(
            "PAGE_SPLIT",
            &[
                ("relation", &relation.to_string()),
                ("block", &block.to_string()),
                ("right_block", &right_block.to_string()),
                ("level", &level.to_string()),
            ],
        );

        let left_link = InternalEntry {
            low: left_items
                .iter()
                .map(|it| item_low_key(it, level))
                .try_fold(i64::MAX, |acc, k| k.map(|k| acc.min(k)))?,
            high: left_items
                .iter()
                .map(|it| item_high_key(it, level))
                .try_fold(i64::MIN, |acc, k| k.map(|k| acc.max(k)))?,
            child: block,
        };
        let right_link = InternalEntry {
            low: right_items
                .iter()
                .map(|it| item_low_key(it, level))
                .try_fold(i64::MAX, |acc, k| k.map(|k| acc.min(k)))?,
            high: right_items
                .iter()
                .map(|it| item_high_key(it, level))
                .try_fold(i64::MIN, |acc, k| k.map(|k| acc.max(k)))?,
            child: right_block,
        };

        match parent {
            Some((pblock, pslot)) => {
                let root = self.root(&ctx.pages, relation)?.map(|(r, _)| r);
                let target = if Some(pblock) == root {
                    InsertTarget::Meta
                } else {
                    InsertTarget::Upper
                };
                let bytes = left_link.encode();
                let seq = sink.append(
                    relation,
                    pblock,
                    INVALID_BLOCK,
                    RedoRecord::Insert {
                        target,
                        slot: pslot,
                    },
                    bytes.clone(),
                )?;
                ctx.pages.update(relation, pblock, |p| -> AmResult<()> {
                    p.replace_item(pslot, bytes)?;
                    p.set_lsn(seq);
                    Ok(())
                })??;

                let ppage = ctx.pages.read(relation, pblock)?;
                let slot = ppage.max_slot() + 1;
                let bytes = right_link.encode();
                let seq = sink.append(
                    relation,
                    pblock,
                    INVALID_BLOCK,
                    RedoRecord::Insert { target, slot },
                    bytes.clone(),
                )?;
                ctx.pages.update(relation, pblock, |p| -> AmResult<()> {
                    p.insert_item(slot, bytes)?;
                    p.set_lsn(seq);
                    Ok(())
                })??;
            }
            None => {
                // Root split: a fresh root holds the two downlinks
                let (new_root, reused) = ctx.pages.allocate(relation);
                if reused {
                    self.log_reuse(sink, relation, new_root, 0)?;
                }
                let items = vec![left_link.encode(), right_link.encode()];
                let seq = sink.append(
                    relation,
                    new_root,
                    META_BLOCK,
                    RedoRecord::NewRoot { level: level + 1 },
                    encode_root_payload(&items),
                )?;
                let mut page = Page::new_tree(level + 1);
                for item in items {
                    page.append_item(item);
                }
                page.set_lsn(seq);
                ctx.pages.write(relation, new_root, page);
                self.set_root(ctx, relation, new_root, level + 1)?;
            }
        }
        Ok(())
    }

    /// Removes one (key, row) pair. Shrinks the posting list in place, or
    /// removes the whole entry when the last row goes. Returns whether the
    /// pair was found.
    pub fn delete_entry(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        conflict_horizon: u64,
        key: i64,
        row: RowPointer,
    ) -> AmResult<bool> {
        ctx.locks.acquire(relation, LockMode::Structural)?;
        let result = self.delete_locked(ctx, sink, relation, conflict_horizon, key, row);
        ctx.locks.release(relation, LockMode::Structural);
        result
    }

    fn delete_locked(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        conflict_horizon: u64,
        key: i64,
        row: RowPointer,
    ) -> AmResult<bool> {
        let Some((block, slot, entry)) = self.find_key(ctx, relation, key)? else {
            return Ok(false);
        };
        let Some(row_index) = entry.rows.iter().position(|r| *r == row) else {
            return Ok(false);
        };

        if entry.rows.len() > 1 {
            let seq = sink.append(
                relation,
                block,
                INVALID_BLOCK,
                RedoRecord::Delete {
                    conflict_horizon,
                    is_catalog_rel: false,
                    deleted: vec![],
                    updated: vec![PostingUpdate {
                        slot,
                        deleted_row_indexes: vec![row_index as u16],
                    }],
                },
                Vec::new(),
            )?;
            let mut shrunk = entry;
            shrunk.rows.remove(row_index);
            let bytes = shrunk.encode();
            ctx.pages.update(relation, block, |p| -> AmResult<()> {
                p.replace_item(slot, bytes)?;
                p.set_lsn(seq);
                Ok(())
            })??;
        } else {
            let seq = sink.append(
                relation,
                block,
                INVALID_BLOCK,
                RedoRecord::Delete {
                    conflict_horizon,
                    is_catalog_rel: false,
                    deleted: vec![slot],
                    updated: vec![],
                },
                Vec::new(),
            )?;
            ctx.pages.update(relation, block, |p| -> AmResult<()> {
                p.remove_item(slot)?;
                p.set_lsn(seq);
                Ok(())
            })??;
            broadcast(&ctx.scans, relation, StructuralChange::Delete { block, slot });
        }
        Ok(true)
    }

    /// Removes every reference to `dead` rows, one vacuum record per touched
    /// leaf page.
    pub fn vacuum(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        dead: &[RowPointer],
    ) -> AmResult<VacuumStats> {
        ctx.locks.acquire(relation, LockMode::Structural)?;
        let result = self.vacuum_locked(ctx, sink, relation, dead);
        ctx.locks.release(relation, LockMode::Structural);
        result
    }

    fn vacuum_locked(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        dead: &[RowPointer],
    ) -> AmResult<VacuumStats> {
        let mut stats = VacuumStats::default();
        for block in ctx.pages.blocks(relation) {
            let page = ctx.pages.read(relation, block)?;
            if !page.special_area().is_leaf() {
                continue;
            }
            let mut deleted: Vec<SlotNumber> = Vec::new();
            let mut updated: Vec<PostingUpdate> = Vec::new();
            for slot in FIRST_SLOT..=page.max_slot() {
                let entry = IndexEntry::decode(page.item(slot)?)?;
                let dead_indexes: Vec<u16> = entry
                    .rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| dead.contains(r))
                    .map(|(i, _)| i as u16)
                    .collect();
                if dead_indexes.is_empty() {
                    continue;
                }
                if dead_indexes.len() == entry.rows.len() {
                    deleted.push(slot);
                } else {
                    updated.push(PostingUpdate {
                        slot,
                        deleted_row_indexes: dead_indexes,
                    });
                }
            }
            if deleted.is_empty() && updated.is_empty() {
                continue;
            }
            stats.entries_removed += deleted.len() as u64;
            stats.postings_trimmed += updated.len() as u64;

            let seq = sink.append(
                relation,
                block,
                INVALID_BLOCK,
                RedoRecord::Vacuum {
                    deleted: deleted.clone(),
                    updated: updated.clone(),
                },
                Vec::new(),
            )?;
            ctx.pages.update(relation, block, |p| -> AmResult<()> {
                for update in &updated {
                    let mut entry = IndexEntry::decode(p.item(update.slot)?)?;
                    for &idx in update.deleted_row_indexes.iter().rev() {
                        entry.rows.remove(idx as usize);
                    }
                    p.replace_item(update.slot, entry.encode())?;
                }
                for &slot in deleted.iter().rev() {
                    p.remove_item(slot)?;
                }
                p.set_lsn(seq);
                Ok(())
            })??;
            for &slot in deleted.iter().rev() {
                broadcast(&ctx.scans, relation, StructuralChange::Delete { block, slot });
            }
        }
        Ok(stats)
    }

    /// Merges runs of consecutive same-key leaf items into posting lists.
    /// Returns the number of intervals merged.
    pub fn dedup_page(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        block: BlockNumber,
    ) -> AmResult<u16> {
        ctx.locks.acquire(relation, LockMode::Structural)?;
        let result = self.dedup_locked(ctx, sink, relation, block);
        ctx.locks.release(relation, LockMode::Structural);
        result
    }

    fn dedup_locked(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        block: BlockNumber,
    ) -> AmResult<u16> {
        let page = ctx.pages.read(relation, block)?;
        if !page.special_area().is_leaf() {
            return Err(AmError::corrupt_entry("dedup of a non-leaf page"));
        }
        let mut keys = Vec::with_capacity(page.max_slot() as usize);
        for slot in FIRST_SLOT..=page.max_slot() {
            keys.push(IndexEntry::decode(page.item(slot)?)?.key);
        }
        let mut intervals: Vec<(u16, u16)> = Vec::new();
        let mut base = 0usize;
        while base < keys.len() {
            let mut len = 1usize;
            while base + len < keys.len() && keys[base + len] == keys[base] {
                len += 1;
            }
            if len >= 2 {
                intervals.push((base as u16 + 1, len as u16));
            }
            base += len;
        }
        if intervals.is_empty() {
            return Ok(0);
        }

        let n_intervals = intervals.len() as u16;
        let seq = sink.append(
            relation,
            block,
            INVALID_BLOCK,
            RedoRecord::Dedup { n_intervals },
            encode_dedup_payload(&intervals),
        )?;
        ctx.pages.update(relation, block, |p| -> AmResult<()> {
            for &(start, n_items) in intervals.iter().rev() {
                let mut merged = IndexEntry::decode(p.item(start)?)?;
                for slot in start + 1..start + n_items {
                    let next = IndexEntry::decode(p.item(slot)?)?;
                    merged.rows.extend(next.rows);
                }
                merged.rows.sort_unstable();
                merged.rows.dedup();
                for slot in (start + 1..start + n_items).rev() {
                    p.remove_item(slot)?;
                }
                p.replace_item(start, merged.encode())?;
            }
            p.set_lsn(seq);
            Ok(())
        })??;
        for &(start, n_items) in intervals.iter().rev() {
            for slot in (start + 1..start + n_items).rev() {
                broadcast(&ctx.scans, relation, StructuralChange::Delete { block, slot });
            }
        }
        Ok(n_intervals)
    }

    /// Deletes empty leaf pages: half-dead first, then unlinked and returned
    /// to the free list. Ends with a meta-cleanup record carrying the count.
    pub fn cleanup(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        safe_horizon: u64,
    ) -> AmResult<u32> {
        ctx.locks.acquire(relation, LockMode::Structural)?;
        let result = self.cleanup_locked(ctx, sink, relation, safe_horizon);
        ctx.locks.release(relation, LockMode::Structural);
        result
    }

    fn cleanup_locked(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        safe_horizon: u64,
    ) -> AmResult<u32> {
        let mut deleted_pages = 0u32;
        for block in ctx.pages.blocks(relation) {
            // A collapsed root may already be gone by the time we reach it
            let Ok(page) = ctx.pages.read(relation, block) else {
                continue;
            };
            let SpecialArea::Tree {
                level: 0,
                half_dead,
            } = *page.special_area()
            else {
                continue;
            };
            if page.max_slot() > 0 {
                continue;
            }
            if half_dead {
                // A previous pass got interrupted after the half-dead step
                self.unlink_leaf(ctx, sink, relation, block, safe_horizon, false)?;
                deleted_pages += 1;
                continue;
            }

            let root = self.root(&ctx.pages, relation)?.map(|(r, _)| r);
            if Some(block) == root {
                // The root is never deleted, even when empty
                continue;
            }
            let Some((pblock, pslot)) = self.parent_of(ctx, relation, block)? else {
                continue;
            };
            let ppage = ctx.pages.read(relation, pblock)?;
            let parent_is_root = Some(pblock) == root;
            if ppage.max_slot() <= 1 && !parent_is_root {
                // Dropping the downlink would orphan the parent; leave the
                // leaf for a later pass that can take the parent with it
                continue;
            }

            let grandparent = self
                .parent_of(ctx, relation, pblock)?
                .map(|(g, _)| g)
                .unwrap_or(INVALID_BLOCK);
            let seq = sink.append(
                relation,
                pblock,
                block,
                RedoRecord::MarkPageHalfDead {
                    grandparent,
                    leaf: block,
                    left_sibling: INVALID_BLOCK,
                    right_sibling: INVALID_BLOCK,
                },
                Vec::new(),
            )?;
            ctx.pages.update(relation, pblock, |p| -> AmResult<()> {
                p.remove_item(pslot)?;
                p.set_lsn(seq);
                Ok(())
            })??;
            ctx.pages.update(relation, block, |p| {
                if let SpecialArea::Tree { half_dead, .. } = p.special_area_mut() {
                    *half_dead = true;
                }
                p.set_lsn(seq);
            })?;
            broadcast(
                &ctx.scans,
                relation,
                StructuralChange::Delete {
                    block: pblock,
                    slot: pslot,
                },
            );

            let collapse_root = parent_is_root && ppage.max_slot() <= 1;
            self.unlink_leaf(ctx, sink, relation, block, safe_horizon, collapse_root)?;
            if collapse_root {
                ctx.pages.release(relation, pblock);
                self.set_root(ctx, relation, INVALID_BLOCK, 0)?;
                deleted_pages += 1;
            }
            deleted_pages += 1;
        }

        if deleted_pages > 0 {
            let seq = sink.append(
                relation,
                META_BLOCK,
                INVALID_BLOCK,
                RedoRecord::MetaCleanup {
                    last_cleanup_deleted_pages: deleted_pages,
                },
                Vec::new(),
            )?;
            ctx.pages.update(relation, META_BLOCK, |p| {
                if let SpecialArea::Meta {
                    last_cleanup_deleted_pages,
                    ..
                } = p.special_area_mut()
                {
                    *last_cleanup_deleted_pages = deleted_pages;
                }
                p.set_lsn(seq);
            })?;
            Logger::info(
                "TREE_CLEANUP",
                &[
                    ("relation", &relation.to_string()),
                    ("deleted_pages", &deleted_pages.to_string()),
                ],
            );
        }
        Ok(deleted_pages)
    }

    fn unlink_leaf(
        &self,
        ctx: &EngineContext,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        block: BlockNumber,
        safe_horizon: u64,
        with_meta: bool,
    ) -> AmResult<()> {
        let aux = if with_meta { META_BLOCK } else { INVALID_BLOCK };
        let seq = sink.append(
            relation,
            block,
            aux,
            RedoRecord::UnlinkPage {
                with_meta,
                left_sibling: INVALID_BLOCK,
                right_sibling: INVALID_BLOCK,
                level: 0,
                safe_xid: full_xid(safe_horizon),
                leaf_left_sibling: INVALID_BLOCK,
                leaf_right_sibling: INVALID_BLOCK,
                leaf_top_parent: INVALID_BLOCK,
            },
            Vec::new(),
        )?;
        ctx.pages.update(relation, block, |p| {
            p.truncate_items(FIRST_SLOT);
            p.set_lsn(seq);
        })?;
        ctx.pages.release(relation, block);
        Ok(())
    }

    fn log_reuse(
        &self,
        sink: &mut dyn RedoSink,
        relation: RelationId,
        block: BlockNumber,
        conflict_horizon: u64,
    ) -> AmResult<()> {
        sink.append(
            relation,
            block,
            INVALID_BLOCK,
            RedoRecord::ReusePage {
                locator: RelationLocator {
                    space: SPACE,
                    database: DATABASE,
                    relation,
                },
                conflict_horizon: full_xid(conflict_horizon),
                is_catalog_rel: false,
            },
            Vec::new(),
        )?;
        Ok(())
    }

    fn set_root(
        &self,
        ctx: &EngineContext,
        relation: RelationId,
        root: BlockNumber,
        level: u32,
    ) -> AmResult<()> {
        ctx.pages.update(relation, META_BLOCK, |p| {
            if let SpecialArea::Meta {
                root: r,
                root_level,
                ..
            } = p.special_area_mut()
            {
                *r = root;
                *root_level = level;
            }
        })?;
        Ok(())
    }

    /// Finds the internal page and slot holding the downlink to `block`.
    fn parent_of(
        &self,
        ctx: &EngineContext,
        relation: RelationId,
        block: BlockNumber,
    ) -> AmResult<Option<(BlockNumber, SlotNumber)>> {
        let Some((root, _)) = self.root(&ctx.pages, relation)? else {
            return Ok(None);
        };
        if root == block {
            return Ok(None);
        }
        let mut pending = vec![root];
        while let Some(candidate) = pending.pop() {
            let page = match ctx.pages.read(relation, candidate) {
                Ok(page) => page,
                Err(_) => continue,
            };
            if page.special_area().is_leaf() {
                continue;
            }
            for slot in FIRST_SLOT..=page.max_slot() {
                let downlink = InternalEntry::decode(page.item(slot)?)?;
                if downlink.child == block {
                    return Ok(Some((candidate, slot)));
                }
                pending.push(downlink.child);
            }
        }
        Ok(None)
    }

    /// First leaf slot whose entry carries `key`, pruning by intervals.
    fn find_key(
        &self,
        ctx: &EngineContext,
        relation: RelationId,
        key: i64,
    ) -> AmResult<Option<(BlockNumber, SlotNumber, IndexEntry)>> {
        let Some((root, _)) = self.root(&ctx.pages, relation)? else {
            return Ok(None);
        };
        let mut pending = vec![root];
        while let Some(block) = pending.pop() {
            let page = ctx.pages.read(relation, block)?;
            if page.special_area().is_leaf() {
                for slot in FIRST_SLOT..=page.max_slot() {
                    let entry = IndexEntry::decode(page.item(slot)?)?;
                    if entry.key == key {
                        return Ok(Some((block, slot, entry)));
                    }
                }
                continue;
            }
            for slot in FIRST_SLOT..=page.max_slot() {
                let downlink = InternalEntry::decode(page.item(slot)?)?;
                if downlink.contains(key) {
                    pending.push(downlink.child);
                }
            }
        }
        Ok(None)
    }
}

/// The child whose interval needs the least widening to take `key`.
fn choose_child(page: &Page, key: i64) -> AmResult<(SlotNumber, InternalEntry)> {
    let mut best: Option<(SlotNumber, InternalEntry, u64)> = None;
    for slot in FIRST_SLOT..=page.max_slot() {
        let downlink = InternalEntry::decode(page.item(slot)?)?;
        let cost = if downlink.contains(key) {
            0
        } else if key < downlink.low {
            downlink.low.abs_diff(key)
        } else {
            key.abs_diff(downlink.high)
        };
        if best.as_ref().map_or(true, |(_, _, c)| cost < *c) {
            best = Some((slot, downlink, cost));
        }
    }
    best.map(|(slot, downlink, _)| (slot, downlink))
        .ok_or_else(|| AmError::corrupt_entry("internal page with no downlinks"))
}

/// Sort key of an item during a split.
fn item_order_key(item: &[u8], level: u32) -> AmResult<i64> {
    if level == 0 {
        Ok(IndexEntry::decode(item)?.key)
    } else {
        Ok(InternalEntry::decode(item)?.low)
    }
}

fn item_low_key(item: &[u8], level: u32) -> AmResult<i64> {
    if level == 0 {
        Ok(IndexEntry::decode(item)?.key)
    } else {
        Ok(InternalEntry::decode(item)?.low)
    }
}

fn item_high_key(item: &[u8], level: u32) -> AmResult<i64> {
    if level == 0 {
        Ok(IndexEntry::decode(item)?.key)
    } else {
        Ok(InternalEntry::decode(item)?.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redo::{RecordKind, VecSink};
    use crate::scan::{Direction, ScanDescriptor};
    use std::sync::Arc;

    const REL: RelationId = 11;

    fn setup() -> (Arc<EngineContext>, TreeAm, VecSink) {
        let ctx = Arc::new(EngineContext::new());
        let am = TreeAm::with_capacity(4);
        let sink = VecSink::new();
        am.create(&ctx, REL).unwrap();
        (ctx, am, sink)
    }

    fn all_keys(ctx: &Arc<EngineContext>, am: &TreeAm) -> Vec<i64> {
        let am_obj: Arc<dyn crate::scan::AccessMethod> = Arc::new(*am);
        let mut scan = ScanDescriptor::open(
            Arc::clone(ctx),
            am_obj,
            REL,
            Direction::Forward,
            vec![],
            None,
        )
        .unwrap();
        let mut keys = Vec::new();
        while let Some(hit) = scan.get_next().unwrap() {
            keys.push(hit.key);
        }
        keys
    }

    #[test]
    fn test_first_insert_logs_a_new_root() {
        let (ctx, am, mut sink) = setup();
        am.insert(&ctx, &mut sink, REL, 5, RowPointer::new(1, 1)).unwrap();
        assert_eq!(sink.entries.len(), 1);
        assert_eq!(sink.entries[0].record.kind(), RecordKind::NewRoot);
        assert_eq!(all_keys(&ctx, &am), vec![5]);
    }

    #[test]
    fn test_duplicate_key_grows_posting_list() {
        let (ctx, am, mut sink) = setup();
        am.insert(&ctx, &mut sink, REL, 5, RowPointer::new(1, 1)).unwrap();
        am.insert(&ctx, &mut sink, REL, 5, RowPointer::new(1, 2)).unwrap();
        assert_eq!(
            sink.entries.last().unwrap().record.kind(),
            RecordKind::InsertPosting
        );
        // Two rows under one key, one leaf entry
        assert_eq!(all_keys(&ctx, &am), vec![5, 5]);
    }

    #[test]
    fn test_overflow_splits_and_keeps_every_key() {
        let (ctx, am, mut sink) = setup();
        for key in 0..40 {
            am.insert(&ctx, &mut sink, REL, key, RowPointer::new(1, key as u16 + 1))
                .unwrap();
        }
        let mut keys = all_keys(&ctx, &am);
        keys.sort_unstable();
        assert_eq!(keys, (0..40).collect::<Vec<i64>>());
        assert!(sink
            .entries
            .iter()
            .any(|e| e.record.kind() == RecordKind::SplitLeft
                || e.record.kind() == RecordKind::SplitRight));
    }

    #[test]
    fn test_delete_entry_shrinks_then_removes() {
        let (ctx, am, mut sink) = setup();
        am.insert(&ctx, &mut sink, REL, 5, RowPointer::new(1, 1)).unwrap();
        am.insert(&ctx, &mut sink, REL, 5, RowPointer::new(1, 2)).unwrap();

        assert!(am
            .delete_entry(&ctx, &mut sink, REL, 90, 5, RowPointer::new(1, 1))
            .unwrap());
        assert_eq!(all_keys(&ctx, &am), vec![5]);

        assert!(am
            .delete_entry(&ctx, &mut sink, REL, 91, 5, RowPointer::new(1, 2))
            .unwrap());
        assert_eq!(all_keys(&ctx, &am), Vec::<i64>::new());

        assert!(!am
            .delete_entry(&ctx, &mut sink, REL, 92, 5, RowPointer::new(1, 2))
            .unwrap());
    }

    #[test]
    fn test_vacuum_trims_postings_and_removes_entries() {
        let (ctx, am, mut sink) = setup();
        am.insert(&ctx, &mut sink, REL, 1, RowPointer::new(7, 1)).unwrap();
        am.insert(&ctx, &mut sink, REL, 2, RowPointer::new(7, 2)).unwrap();
        am.insert(&ctx, &mut sink, REL, 2, RowPointer::new(7, 3)).unwrap();

        let stats = am
            .vacuum(
                &ctx,
                &mut sink,
                REL,
                &[RowPointer::new(7, 1), RowPointer::new(7, 2)],
            )
            .unwrap();
        assert_eq!(
            stats,
            VacuumStats {
                entries_removed: 1,
                postings_trimmed: 1,
            }
        );
        assert_eq!(all_keys(&ctx, &am), vec![2]);
    }

    #[test]
    fn test_cleanup_releases_emptied_tree() {
        let (ctx, am, mut sink) = setup();
        // Five inserts at capacity 4: one split, a root over two leaves
        for key in 0..5 {
            am.insert(&ctx, &mut sink, REL, key, RowPointer::new(1, key as u16 + 1))
                .unwrap();
        }
        for key in 0..5 {
            am.delete_entry(&ctx, &mut sink, REL, 50, key, RowPointer::new(1, key as u16 + 1))
                .unwrap();
        }
        let deleted = am.cleanup(&ctx, &mut sink, REL, 60).unwrap();
        assert!(deleted > 0);
        assert_eq!(
            sink.entries.last().unwrap().record.kind(),
            RecordKind::MetaCleanup
        );
        assert_eq!(all_keys(&ctx, &am), Vec::<i64>::new());

        // The tree grows again from scratch on reused blocks
        am.insert(&ctx, &mut sink, REL, 99, RowPointer::new(2, 1)).unwrap();
        assert_eq!(all_keys(&ctx, &am), vec![99]);
        assert!(sink
            .entries
            .iter()
            .any(|e| e.record.kind() == RecordKind::ReusePage));
    }

    #[test]
    fn test_interval_widening_is_logged_as_upper_insert() {
        let (ctx, am, mut sink) = setup();
        for key in 0..12 {
            am.insert(&ctx, &mut sink, REL, key * 10, RowPointer::new(1, key as u16 + 1))
                .unwrap();
        }
        let before = sink.entries.len();
        // Key beyond every interval forces widening along the descent path
        am.insert(&ctx, &mut sink, REL, 5000, RowPointer::new(1, 99)).unwrap();
        let kinds: Vec<RecordKind> = sink.entries[before..]
            .iter()
            .map(|e| e.record.kind())
            .collect();
        assert!(kinds.contains(&RecordKind::InsertLeaf));
        assert!(
            kinds.contains(&RecordKind::InsertUpper) || kinds.contains(&RecordKind::InsertMeta)
        );
    }
}
