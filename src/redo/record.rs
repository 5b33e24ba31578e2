//! Redo record types and the bit-exact codec
//!
//! Record layout, after the one-byte kind tag (all integers LE):
//!
//! - `INSERT_*`:             slot u16
//! - `SPLIT_{L,R}`:          level u32 | first_right_slot u16 |
//!                           new_item_slot u16 | posting_split_offset u16
//! - `DEDUP`:                n_intervals u16
//! - `VACUUM`:               n_deleted u16 | n_updated u16 |
//!                           deleted[u16] | updates*
//! - `DELETE`:               conflict_horizon u64 | n_deleted u16 |
//!                           n_updated u16 | is_catalog_rel u8 |
//!                           deleted[u16] | updates*
//! - `MARK_PAGE_HALF_DEAD`:  grandparent u32 | leaf u32 | left u32 | right u32
//! - `UNLINK_PAGE(_META)`:   left u32 | right u32 | level u32 |
//!                           safe_xid_epoch u32 | safe_xid u32 |
//!                           leaf_left u32 | leaf_right u32 |
//!                           leaf_top_parent u32
//! - `NEWROOT`:              level u32
//! - `REUSE_PAGE`:           space u32 | database u32 | relation u32 |
//!                           horizon_epoch u32 | horizon_xid u32 |
//!                           is_catalog_rel u8
//! - `META_CLEANUP`:         last_cleanup_deleted_pages u32
//!
//! where each `update` is `slot u16 | n_sub u16 | sub_ids[u16]`. Array
//! lengths are explicit counts immediately preceding the array, never
//! sentinel-terminated, so replay never needs look-ahead.

use crate::page::{BlockNumber, RelationId, SlotNumber};

use super::errors::{RedoError, RedoResult};

/// Record kind tags. The numeric values are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    InsertLeaf = 0,
    InsertUpper = 1,
    InsertMeta = 2,
    InsertPosting = 3,
    SplitLeft = 4,
    SplitRight = 5,
    Dedup = 6,
    Vacuum = 7,
    Delete = 8,
    MarkPageHalfDead = 9,
    UnlinkPage = 10,
    UnlinkPageMeta = 11,
    NewRoot = 12,
    ReusePage = 13,
    MetaCleanup = 14,
}

impl RecordKind {
    /// Every kind, in tag order.
    pub const ALL: [RecordKind; 15] = [
        RecordKind::InsertLeaf,
        RecordKind::InsertUpper,
        RecordKind::InsertMeta,
        RecordKind::InsertPosting,
        RecordKind::SplitLeft,
        RecordKind::SplitRight,
        RecordKind::Dedup,
        RecordKind::Vacuum,
        RecordKind::Delete,
        RecordKind::MarkPageHalfDead,
        RecordKind::UnlinkPage,
        RecordKind::UnlinkPageMeta,
        RecordKind::NewRoot,
        RecordKind::ReusePage,
        RecordKind::MetaCleanup,
    ];

    /// Convert from the tag byte, `None` for unknown tags.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Convert to the tag byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Diagnostic name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::InsertLeaf => "INSERT_LEAF",
            RecordKind::InsertUpper => "INSERT_UPPER",
            RecordKind::InsertMeta => "INSERT_META",
            RecordKind::InsertPosting => "INSERT_POSTING",
            RecordKind::SplitLeft => "SPLIT_L",
            RecordKind::SplitRight => "SPLIT_R",
            RecordKind::Dedup => "DEDUP",
            RecordKind::Vacuum => "VACUUM",
            RecordKind::Delete => "DELETE",
            RecordKind::MarkPageHalfDead => "MARK_PAGE_HALF_DEAD",
            RecordKind::UnlinkPage => "UNLINK_PAGE",
            RecordKind::UnlinkPageMeta => "UNLINK_PAGE_META",
            RecordKind::NewRoot => "NEWROOT",
            RecordKind::ReusePage => "REUSE_PAGE",
            RecordKind::MetaCleanup => "META_CLEANUP",
        }
    }
}

/// Which page an insert record targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTarget {
    Leaf,
    Upper,
    Meta,
    Posting,
}

/// Which half of a split received the new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSide {
    Left,
    Right,
}

/// An epoch-qualified transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullTransactionId {
    pub epoch: u32,
    pub xid: u32,
}

/// Physical relation locator: (tablespace, database, relation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationLocator {
    pub space: u32,
    pub database: u32,
    pub relation: u32,
}

/// One posting-list shrink within a VACUUM or DELETE record: the slot of the
/// surviving item and the indexes of the row pointers removed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingUpdate {
    pub slot: SlotNumber,
    pub deleted_row_indexes: Vec<u16>,
}

/// A decoded redo record. Immutable once written; consumed once by recovery
/// replay and any number of times by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedoRecord {
    Insert {
        target: InsertTarget,
        slot: SlotNumber,
    },
    Split {
        side: SplitSide,
        level: u32,
        first_right_slot: SlotNumber,
        new_item_slot: SlotNumber,
        posting_split_offset: u16,
    },
    Dedup {
        n_intervals: u16,
    },
    Vacuum {
        deleted: Vec<SlotNumber>,
        updated: Vec<PostingUpdate>,
    },
    Delete {
        conflict_horizon: u64,
        is_catalog_rel: bool,
        deleted: Vec<SlotNumber>,
        updated: Vec<PostingUpdate>,
    },
    MarkPageHalfDead {
        grandparent: BlockNumber,
        leaf: BlockNumber,
        left_sibling: BlockNumber,
        right_sibling: BlockNumber,
    },
    UnlinkPage {
        with_meta: bool,
        left_sibling: BlockNumber,
        right_sibling: BlockNumber,
        level: u32,
        safe_xid: FullTransactionId,
        leaf_left_sibling: BlockNumber,
        leaf_right_sibling: BlockNumber,
        leaf_top_parent: BlockNumber,
    },
    NewRoot {
        level: u32,
    },
    ReusePage {
        locator: RelationLocator,
        conflict_horizon: FullTransactionId,
        is_catalog_rel: bool,
    },
    MetaCleanup {
        last_cleanup_deleted_pages: u32,
    },
}

impl RedoRecord {
    /// The kind tag for this record.
    pub fn kind(&self) -> RecordKind {
        match self {
            RedoRecord::Insert { target, .. } => match target {
                InsertTarget::Leaf => RecordKind::InsertLeaf,
                InsertTarget::Upper => RecordKind::InsertUpper,
                InsertTarget::Meta => RecordKind::InsertMeta,
                InsertTarget::Posting => RecordKind::InsertPosting,
            },
            RedoRecord::Split { side, .. } => match side {
                SplitSide::Left => RecordKind::SplitLeft,
                SplitSide::Right => RecordKind::SplitRight,
            },
            RedoRecord::Dedup { .. } => RecordKind::Dedup,
            RedoRecord::Vacuum { .. } => RecordKind::Vacuum,
            RedoRecord::Delete { .. } => RecordKind::Delete,
            RedoRecord::MarkPageHalfDead { .. } => RecordKind::MarkPageHalfDead,
            RedoRecord::UnlinkPage { with_meta, .. } => {
                if *with_meta {
                    RecordKind::UnlinkPageMeta
                } else {
                    RecordKind::UnlinkPage
                }
            }
            RedoRecord::NewRoot { .. } => RecordKind::NewRoot,
            RedoRecord::ReusePage { .. } => RecordKind::ReusePage,
            RedoRecord::MetaCleanup { .. } => RecordKind::MetaCleanup,
        }
    }

    /// Serializes the record: kind tag, fixed fields in declared order, then
    /// counts and arrays.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(self.kind().as_u8());
        match self {
            RedoRecord::Insert { slot, .. } => {
                buf.extend_from_slice(&slot.to_le_bytes());
            }
            RedoRecord::Split {
                level,
                first_right_slot,
                new_item_slot,
                posting_split_offset,
                ..
            } => {
                buf.extend_from_slice(&level.to_le_bytes());
                buf.extend_from_slice(&first_right_slot.to_le_bytes());
                buf.extend_from_slice(&new_item_slot.to_le_bytes());
                buf.extend_from_slice(&posting_split_offset.to_le_bytes());
            }
            RedoRecord::Dedup { n_intervals } => {
                buf.extend_from_slice(&n_intervals.to_le_bytes());
            }
            RedoRecord::Vacuum { deleted, updated } => {
                encode_counts(&mut buf, deleted, updated);
                encode_arrays(&mut buf, deleted, updated);
            }
            RedoRecord::Delete {
                conflict_horizon,
                is_catalog_rel,
                deleted,
                updated,
            } => {
                buf.extend_from_slice(&conflict_horizon.to_le_bytes());
                encode_counts(&mut buf, deleted, updated);
                buf.push(u8::from(*is_catalog_rel));
                encode_arrays(&mut buf, deleted, updated);
            }
            RedoRecord::MarkPageHalfDead {
                grandparent,
                leaf,
                left_sibling,
                right_sibling,
            } => {
                buf.extend_from_slice(&grandparent.to_le_bytes());
                buf.extend_from_slice(&leaf.to_le_bytes());
                buf.extend_from_slice(&left_sibling.to_le_bytes());
                buf.extend_from_slice(&right_sibling.to_le_bytes());
            }
            RedoRecord::UnlinkPage {
                left_sibling,
                right_sibling,
                level,
                safe_xid,
                leaf_left_sibling,
                leaf_right_sibling,
                leaf_top_parent,
                ..
            } => {
                buf.extend_from_slice(&left_sibling.to_le_bytes());
                buf.extend_from_slice(&right_sibling.to_le_bytes());
                buf.extend_from_slice(&level.to_le_bytes());
                buf.extend_from_slice(&safe_xid.epoch.to_le_bytes());
                buf.extend_from_slice(&safe_xid.xid.to_le_bytes());
                buf.extend_from_slice(&leaf_left_sibling.to_le_bytes());
                buf.extend_from_slice(&leaf_right_sibling.to_le_bytes());
                buf.extend_from_slice(&leaf_top_parent.to_le_bytes());
            }
            RedoRecord::NewRoot { level } => {
                buf.extend_from_slice(&level.to_le_bytes());
            }
            RedoRecord::ReusePage {
                locator,
                conflict_horizon,
                is_catalog_rel,
            } => {
                buf.extend_from_slice(&locator.space.to_le_bytes());
                buf.extend_from_slice(&locator.database.to_le_bytes());
                buf.extend_from_slice(&locator.relation.to_le_bytes());
                buf.extend_from_slice(&conflict_horizon.epoch.to_le_bytes());
                buf.extend_from_slice(&conflict_horizon.xid.to_le_bytes());
                buf.push(u8::from(*is_catalog_rel));
            }
            RedoRecord::MetaCleanup {
                last_cleanup_deleted_pages,
            } => {
                buf.extend_from_slice(&last_cleanup_deleted_pages.to_le_bytes());
            }
        }
        buf
    }

    /// Decodes a record buffer. The whole buffer must be consumed exactly;
    /// a short buffer, an unknown kind tag, or trailing bytes are corruption.
    pub fn decode(buf: &[u8]) -> RedoResult<RedoRecord> {
        let mut r = Reader::new(buf);
        let tag = r.u8()?;
        let kind = RecordKind::from_u8(tag)
            .ok_or_else(|| RedoError::corrupt_record(format!("unknown kind tag {}", tag)))?;
        let record = match kind {
            RecordKind::InsertLeaf => RedoRecord::Insert {
                target: InsertTarget::Leaf,
                slot: r.u16()?,
            },
            RecordKind::InsertUpper => RedoRecord::Insert {
                target: InsertTarget::Upper,
                slot: r.u16()?,
            },
            RecordKind::InsertMeta => RedoRecord::Insert {
                target: InsertTarget::Meta,
                slot: r.u16()?,
            },
            RecordKind::InsertPosting => RedoRecord::Insert {
                target: InsertTarget::Posting,
                slot: r.u16()?,
            },
            RecordKind::SplitLeft | RecordKind::SplitRight => RedoRecord::Split {
                side: if kind == RecordKind::SplitLeft {
                    SplitSide::Left
                } else {
                    SplitSide::Right
                },
                level: r.u32()?,
                first_right_slot: r.u16()?,
                new_item_slot: r.u16()?,
                posting_split_offset: r.u16()?,
            },
            RecordKind::Dedup => RedoRecord::Dedup {
                n_intervals: r.u16()?,
            },
            RecordKind::Vacuum => {
                let n_deleted = r.u16()?;
                let n_updated = r.u16()?;
                let (deleted, updated) = decode_arrays(&mut r, n_deleted, n_updated)?;
                RedoRecord::Vacuum { deleted, updated }
            }
            RecordKind::Delete => {
                let conflict_horizon = r.u64()?;
                let n_deleted = r.u16()?;
                let n_updated = r.u16()?;
                let is_catalog_rel = r.bool()?;
                let (deleted, updated) = decode_arrays(&mut r, n_deleted, n_updated)?;
                RedoRecord::Delete {
                    conflict_horizon,
                    is_catalog_rel,
                    deleted,
                    updated,
                }
            }
            RecordKind::MarkPageHalfDead => RedoRecord::MarkPageHalfDead {
                grandparent: r.u32()?,
                leaf: r.u32()?,
                left_sibling: r.u32()?,
                right_sibling: r.u32()?,
            },
            RecordKind::UnlinkPage | RecordKind::UnlinkPageMeta => RedoRecord::UnlinkPage {
                with_meta: kind == RecordKind::UnlinkPageMeta,
                left_sibling: r.u32()?,
                right_sibling: r.u32()?,
                level: r.u32()?,
                safe_xid: FullTransactionId {
                    epoch: r.u32()?,
                    xid: r.u32()?,
                },
                leaf_left_sibling: r.u32()?,
                leaf_right_sibling: r.u32()?,
                leaf_top_parent: r.u32()?,
            },
            RecordKind::NewRoot => RedoRecord::NewRoot { level: r.u32()? },
            RecordKind::ReusePage => RedoRecord::ReusePage {
                locator: RelationLocator {
                    space: r.u32()?,
                    database: r.u32()?,
                    relation: r.u32()?,
                },
                conflict_horizon: FullTransactionId {
                    epoch: r.u32()?,
                    xid: r.u32()?,
                },
                is_catalog_rel: r.bool()?,
            },
            RecordKind::MetaCleanup => RedoRecord::MetaCleanup {
                last_cleanup_deleted_pages: r.u32()?,
            },
        };
        r.finish()?;
        Ok(record)
    }
}

fn encode_counts(buf: &mut Vec<u8>, deleted: &[SlotNumber], updated: &[PostingUpdate]) {
    debug_assert!(deleted.len() <= u16::MAX as usize);
    debug_assert!(updated.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(deleted.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(updated.len() as u16).to_le_bytes());
}

fn encode_arrays(buf: &mut Vec<u8>, deleted: &[SlotNumber], updated: &[PostingUpdate]) {
    for slot in deleted {
        buf.extend_from_slice(&slot.to_le_bytes());
    }
    for update in updated {
        debug_assert!(update.deleted_row_indexes.len() <= u16::MAX as usize);
        buf.extend_from_slice(&update.slot.to_le_bytes());
        buf.extend_from_slice(&(update.deleted_row_indexes.len() as u16).to_le_bytes());
        for id in &update.deleted_row_indexes {
            buf.extend_from_slice(&id.to_le_bytes());
        }
    }
}

fn decode_arrays(
    r: &mut Reader<'_>,
    n_deleted: u16,
    n_updated: u16,
) -> RedoResult<(Vec<SlotNumber>, Vec<PostingUpdate>)> {
    let mut deleted = Vec::with_capacity(n_deleted as usize);
    for _ in 0..n_deleted {
        deleted.push(r.u16()?);
    }
    let mut updated = Vec::with_capacity(n_updated as usize);
    for _ in 0..n_updated {
        let slot = r.u16()?;
        let n_sub = r.u16()?;
        let mut deleted_row_indexes = Vec::with_capacity(n_sub as usize);
        for _ in 0..n_sub {
            deleted_row_indexes.push(r.u16()?);
        }
        updated.push(PostingUpdate {
            slot,
            deleted_row_indexes,
        });
    }
    Ok((deleted, updated))
}

/// A framed log entry: the record plus the context recovery needs to locate
/// its target page. `aux_block` is the secondary block reference (the new
/// right sibling of a split, or the metadata page of a meta-updating record);
/// `payload` carries page data the record's fixed fields do not describe,
/// such as the inserted item bytes or the items moved to a split's new page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Sequence number, also the LSN stamped on mutated pages.
    pub seq: u64,
    pub relation: RelationId,
    /// Primary target block of the mutation.
    pub block: BlockNumber,
    /// Secondary block reference, `INVALID_BLOCK` when unused.
    pub aux_block: BlockNumber,
    pub record: RedoRecord,
    pub payload: Vec<u8>,
}

impl LogEntry {
    /// Serializes the frame body (everything the frame checksum covers except
    /// the length field itself).
    pub fn encode_body(&self) -> Vec<u8> {
        let record = self.record.encode();
        let mut buf = Vec::with_capacity(24 + record.len() + self.payload.len());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.relation.to_le_bytes());
        buf.extend_from_slice(&self.block.to_le_bytes());
        buf.extend_from_slice(&self.aux_block.to_le_bytes());
        buf.extend_from_slice(&(record.len() as u32).to_le_bytes());
        buf.extend_from_slice(&record);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes a frame body.
    pub fn decode_body(buf: &[u8]) -> RedoResult<LogEntry> {
        let mut r = Reader::new(buf);
        let seq = r.u64()?;
        let relation = r.u32()?;
        let block = r.u32()?;
        let aux_block = r.u32()?;
        let record_len = r.u32()? as usize;
        let record_bytes = r.bytes(record_len)?;
        let record = RedoRecord::decode(record_bytes)?;
        let payload = r.rest().to_vec();
        Ok(LogEntry {
            seq,
            relation,
            block,
            aux_block,
            record,
            payload,
        })
    }
}

/// Bounds-checked little-endian reader over a record buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> RedoResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(RedoError::corrupt_record(format!(
                "truncated at byte {}: need {} more bytes, have {}",
                self.pos,
                n,
                self.buf.len() - self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> RedoResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn bool(&mut self) -> RedoResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(RedoError::corrupt_record(format!(
                "invalid boolean byte {}",
                other
            ))),
        }
    }

    fn u16(&mut self) -> RedoResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> RedoResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> RedoResult<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn finish(self) -> RedoResult<()> {
        if self.pos != self.buf.len() {
            return Err(RedoError::corrupt_record(format!(
                "{} trailing bytes after record",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}
