//! Redo log replay
//!
//! Drives a page store back to the state the log describes. Every entry is
//! reapplied through the same [`apply`](crate::redo::apply) routine the
//! describe tooling validates against; the page LSN guard inside it makes a
//! second pass over the same log a no-op, so replay can be restarted from
//! the beginning after an interrupted recovery.
//!
//! `apply` covers the single-page effect of each record. The replayer adds
//! the cross-page bookkeeping a running writer does outside the record body:
//! materializing the right half of a split, pointing the meta page at a new
//! root, flagging a half-dead leaf, and returning unlinked blocks to the
//! free list.

use crate::am::META_BLOCK;
use crate::observability::Logger;
use crate::page::{BlockNumber, Page, PageStore, RelationId, SpecialArea, INVALID_BLOCK};
use crate::redo::{
    apply, decode_split_payload, LogEntry, RedoLogReader, RedoRecord, RedoResult,
};

use super::errors::{RecoveryError, RecoveryResult};

/// Ordered supply of log entries for replay.
///
/// Framing or checksum damage surfaces as an error from `read_next`; replay
/// treats that as the end of trustworthy history and aborts.
pub trait EntrySource {
    fn read_next(&mut self) -> RedoResult<Option<LogEntry>>;
}

impl EntrySource for RedoLogReader {
    fn read_next(&mut self) -> RedoResult<Option<LogEntry>> {
        RedoLogReader::read_next(self)
    }
}

/// Counters accumulated over one replay pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub entries_scanned: u64,
    pub entries_applied: u64,
    /// Entries whose target page already carried a covering LSN, plus
    /// conflict-only records with no page effect.
    pub entries_skipped: u64,
    pub pages_created: u64,
    pub pages_released: u64,
    pub inserts: u64,
    pub splits: u64,
    pub deletes: u64,
    pub vacuums: u64,
    pub dedups: u64,
    pub page_deletions: u64,
    pub new_roots: u64,
    pub meta_updates: u64,
    /// Sequence number of the last entry read, 0 for an empty log.
    pub final_sequence: u64,
}

/// Replays a redo log into a page store.
pub struct RedoReplayer<'a> {
    pages: &'a PageStore,
}

impl<'a> RedoReplayer<'a> {
    pub fn new(pages: &'a PageStore) -> Self {
        Self { pages }
    }

    /// Consumes the source to clean end-of-log, reapplying every entry.
    ///
    /// A corrupt frame aborts with the source's error; everything replayed
    /// before it stays applied.
    pub fn replay<S: EntrySource>(&self, source: &mut S) -> RecoveryResult<ReplayStats> {
        let mut stats = ReplayStats::default();
        while let Some(entry) = source.read_next()? {
            stats.entries_scanned += 1;
            stats.final_sequence = entry.seq;
            self.replay_entry(&entry, &mut stats)?;
        }
        Logger::info(
            "REDO_REPLAY_COMPLETE",
            &[
                ("entries", &stats.entries_scanned.to_string()),
                ("applied", &stats.entries_applied.to_string()),
                ("final_sequence", &stats.final_sequence.to_string()),
            ],
        );
        Ok(stats)
    }

    fn replay_entry(&self, entry: &LogEntry, stats: &mut ReplayStats) -> RecoveryResult<()> {
        let relation = entry.relation;
        // Relation creation is unlogged; the first entry for a relation
        // implies its meta page.
        if !self.pages.exists(relation, META_BLOCK) {
            self.pages
                .write(relation, META_BLOCK, Page::new_meta(INVALID_BLOCK, 0));
            stats.pages_created += 1;
        }

        match &entry.record {
            RedoRecord::ReusePage { .. } => {
                // Conflict-only: consulted by standby conflict resolution,
                // never mutates a page.
                stats.entries_skipped += 1;
            }
            RedoRecord::NewRoot { level } => {
                let created = !self.pages.exists(relation, entry.block);
                let mut page = if created {
                    Page::new_tree(*level)
                } else {
                    self.pages.read(relation, entry.block)?
                };
                if apply(entry, &mut page)? {
                    self.pages.write(relation, entry.block, page);
                    if created {
                        stats.pages_created += 1;
                    }
                    self.set_root(relation, entry.block, *level)?;
                    stats.entries_applied += 1;
                    stats.new_roots += 1;
                } else {
                    stats.entries_skipped += 1;
                }
            }
            RedoRecord::Split { level, .. } => {
                let mut left = self.read_target(entry)?;
                if apply(entry, &mut left)? {
                    self.pages.write(relation, entry.block, left);
                    // The record body rebuilds the left half; the right
                    // half page lives whole in the payload.
                    let (_, _, right_items) = decode_split_payload(&entry.payload)?;
                    let created = !self.pages.exists(relation, entry.aux_block);
                    let mut right = Page::new_tree(*level);
                    for item in right_items {
                        right.append_item(item);
                    }
                    right.set_lsn(entry.seq);
                    self.pages.write(relation, entry.aux_block, right);
                    if created {
                        stats.pages_created += 1;
                    }
                    stats.entries_applied += 1;
                    stats.splits += 1;
                } else {
                    stats.entries_skipped += 1;
                }
            }
            RedoRecord::MarkPageHalfDead { .. } => {
                let mut parent = self.read_target(entry)?;
                if apply(entry, &mut parent)? {
                    self.pages.write(relation, entry.block, parent);
                    // aux_block is the leaf losing its downlink.
                    self.pages.update(relation, entry.aux_block, |p| {
                        if p.lsn() < entry.seq {
                            if let SpecialArea::Tree { half_dead, .. } = p.special_area_mut() {
                                *half_dead = true;
                            }
                            p.set_lsn(entry.seq);
                        }
                    })?;
                    stats.entries_applied += 1;
                    stats.page_deletions += 1;
                } else {
                    stats.entries_skipped += 1;
                }
            }
            RedoRecord::UnlinkPage { with_meta, .. } => {
                if self.pages.exists(relation, entry.block) {
                    let mut page = self.pages.read(relation, entry.block)?;
                    if apply(entry, &mut page)? {
                        self.pages.write(relation, entry.block, page);
                    }
                    self.pages.release(relation, entry.block);
                    stats.pages_released += 1;
                    stats.entries_applied += 1;
                    stats.page_deletions += 1;
                } else {
                    // Already released by an earlier pass.
                    stats.entries_skipped += 1;
                }
                if *with_meta {
                    self.collapse_root(relation, entry.block, stats)?;
                }
            }
            _ => {
                let mut page = self.read_target(entry)?;
                if apply(entry, &mut page)? {
                    self.pages.write(relation, entry.block, page);
                    stats.entries_applied += 1;
                    match &entry.record {
                        RedoRecord::Insert { .. } => stats.inserts += 1,
                        RedoRecord::Dedup { .. } => stats.dedups += 1,
                        RedoRecord::Vacuum { .. } => stats.vacuums += 1,
                        RedoRecord::Delete { .. } => stats.deletes += 1,
                        RedoRecord::MetaCleanup { .. } => stats.meta_updates += 1,
                        _ => {}
                    }
                } else {
                    stats.entries_skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Root collapse: the unlinked leaf was the last child of the root, so
    /// the root page goes away too and the meta pointer resets.
    fn collapse_root(
        &self,
        relation: RelationId,
        leaf: BlockNumber,
        stats: &mut ReplayStats,
    ) -> RecoveryResult<()> {
        let meta = self.pages.read(relation, META_BLOCK)?;
        let SpecialArea::Meta { root, .. } = *meta.special_area() else {
            return Ok(());
        };
        if root == INVALID_BLOCK {
            return Ok(());
        }
        if root != leaf && self.pages.exists(relation, root) {
            self.pages.release(relation, root);
            stats.pages_released += 1;
        }
        self.set_root(relation, INVALID_BLOCK, 0)
    }

    fn set_root(&self, relation: RelationId, root: BlockNumber, level: u32) -> RecoveryResult<()> {
        self.pages.update(relation, META_BLOCK, |p| {
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

    fn read_target(&self, entry: &LogEntry) -> RecoveryResult<Page> {
        self.pages
            .read(entry.relation, entry.block)
            .map_err(|_| RecoveryError::MissingPage {
                seq: entry.seq,
                relation: entry.relation,
                block: entry.block,
            })
    }
}
