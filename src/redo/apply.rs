//! Applying redo records to pages
//!
//! `apply` is idempotent: each entry carries a sequence number, every applied
//! entry stamps it onto the page, and an entry whose sequence number is not
//! newer than the page LSN is a no-op. Reapplying the same record to an
//! already-mutated page therefore changes nothing.
//!
//! `apply` mutates exactly one page. Mutations with a second page image (the
//! right half of a split, the items of a new root) carry it in the entry
//! payload; the replay driver materializes those pages.

use crate::am::entry::{IndexEntry, InternalEntry};
use crate::page::{Page, SpecialArea, FIRST_SLOT};

use super::errors::{RedoError, RedoResult};
use super::record::{InsertTarget, LogEntry, PostingUpdate, RedoRecord};

/// Applies one log entry to its primary target page.
///
/// Returns `false` when the entry was skipped: either the page LSN already
/// covers it, or the record kind has no page-level effect.
pub fn apply(entry: &LogEntry, page: &mut Page) -> RedoResult<bool> {
    if matches!(entry.record, RedoRecord::ReusePage { .. }) {
        // Conflict-only record; no page mutation to perform or repeat.
        return Ok(false);
    }
    if page.lsn() >= entry.seq {
        return Ok(false);
    }

    match &entry.record {
        RedoRecord::Insert { target, slot } => match target {
            InsertTarget::Posting => {
                // Posting-list growth replaces the existing item image.
                page.replace_item(*slot, entry.payload.clone())
                    .map_err(page_damage)?;
            }
            InsertTarget::Upper | InsertTarget::Meta => {
                // Downlink upsert: widening overwrites in place, a fresh
                // downlink lands at max_slot + 1.
                if *slot <= page.max_slot() {
                    page.replace_item(*slot, entry.payload.clone())
                        .map_err(page_damage)?;
                } else {
                    page.insert_item(*slot, entry.payload.clone())
                        .map_err(page_damage)?;
                }
            }
            InsertTarget::Leaf => {
                page.insert_item(*slot, entry.payload.clone())
                    .map_err(page_damage)?;
            }
        },
        RedoRecord::Split {
            first_right_slot, ..
        } => {
            let (_, left_items, _) = decode_split_payload(&entry.payload)?;
            if left_items.len() + 1 != *first_right_slot as usize {
                return Err(RedoError::corrupt_record(format!(
                    "split payload holds {} left items but first right slot is {}",
                    left_items.len(),
                    first_right_slot
                )));
            }
            page.truncate_items(FIRST_SLOT);
            for item in left_items {
                page.append_item(item);
            }
        }
        RedoRecord::Dedup { n_intervals } => {
            let intervals = decode_dedup_payload(&entry.payload)?;
            if intervals.len() != *n_intervals as usize {
                return Err(RedoError::corrupt_record(format!(
                    "dedup record declares {} intervals, payload holds {}",
                    n_intervals,
                    intervals.len()
                )));
            }
            // Merge back-to-front so earlier interval bases stay valid.
            for &(base, n_items) in intervals.iter().rev() {
                merge_interval(page, base, n_items)?;
            }
        }
        RedoRecord::Vacuum { deleted, updated } => {
            apply_removals(page, deleted, updated)?;
        }
        RedoRecord::Delete {
            deleted, updated, ..
        } => {
            apply_removals(page, deleted, updated)?;
        }
        RedoRecord::MarkPageHalfDead { leaf, .. } => {
            // Target is the parent: drop its downlink to the half-dead leaf.
            // The leaf's own flag is set by the caller/replay driver.
            let mut downlink = None;
            for slot in FIRST_SLOT..=page.max_slot() {
                let item = page.item(slot).map_err(page_damage)?;
                let child = InternalEntry::decode(item)
                    .map_err(|e| RedoError::corrupt_record(e.to_string()))?
                    .child;
                if child == *leaf {
                    downlink = Some(slot);
                    break;
                }
            }
            let slot = downlink.ok_or_else(|| {
                RedoError::corrupt_record(format!("no downlink to half-dead leaf {leaf}"))
            })?;
            page.remove_item(slot).map_err(page_damage)?;
        }
        RedoRecord::UnlinkPage { level, .. } => {
            page.truncate_items(FIRST_SLOT);
            *page.special_area_mut() = SpecialArea::Tree {
                level: *level,
                half_dead: false,
            };
        }
        RedoRecord::NewRoot { level } => {
            let items = decode_item_list(&entry.payload, &mut 0)?;
            page.truncate_items(FIRST_SLOT);
            for item in items {
                page.append_item(item);
            }
            *page.special_area_mut() = SpecialArea::Tree {
                level: *level,
                half_dead: false,
            };
        }
        RedoRecord::ReusePage { .. } => unreachable!("handled above"),
        RedoRecord::MetaCleanup {
            last_cleanup_deleted_pages,
        } => match page.special_area_mut() {
            SpecialArea::Meta {
                last_cleanup_deleted_pages: field,
                ..
            } => *field = *last_cleanup_deleted_pages,
            SpecialArea::Tree { .. } => {
                return Err(RedoError::corrupt_record(
                    "meta-cleanup record targets a tree page",
                ))
            }
        },
    }

    page.set_lsn(entry.seq);
    Ok(true)
}

fn apply_removals(
    page: &mut Page,
    deleted: &[u16],
    updated: &[PostingUpdate],
) -> RedoResult<()> {
    for update in updated {
        let item = page.item(update.slot).map_err(page_damage)?;
        let mut entry = IndexEntry::decode(item)
            .map_err(|e| RedoError::corrupt_record(e.to_string()))?;
        let mut indexes = update.deleted_row_indexes.clone();
        indexes.sort_unstable();
        for &idx in indexes.iter().rev() {
            if (idx as usize) < entry.rows.len() {
                entry.rows.remove(idx as usize);
            } else {
                return Err(RedoError::corrupt_record(format!(
                    "posting update removes row {} of {}",
                    idx,
                    entry.rows.len()
                )));
            }
        }
        page.replace_item(update.slot, entry.encode())
            .map_err(page_damage)?;
    }
    let mut slots = deleted.to_vec();
    slots.sort_unstable();
    for &slot in slots.iter().rev() {
        page.remove_item(slot).map_err(page_damage)?;
    }
    Ok(())
}

/// Merges the `n_items` leaf items starting at `base` into one posting item.
fn merge_interval(page: &mut Page, base: u16, n_items: u16) -> RedoResult<()> {
    if n_items < 2 {
        return Err(RedoError::corrupt_record("dedup interval of fewer than 2"));
    }
    let mut merged: Option<IndexEntry> = None;
    for slot in base..base + n_items {
        let item = page.item(slot).map_err(page_damage)?;
        let entry = IndexEntry::decode(item)
            .map_err(|e| RedoError::corrupt_record(e.to_string()))?;
        match &mut merged {
            None => merged = Some(entry),
            Some(acc) => {
                if acc.key != entry.key {
                    return Err(RedoError::corrupt_record(
                        "dedup interval spans distinct keys",
                    ));
                }
                acc.rows.extend(entry.rows);
            }
        }
    }
    let mut acc = merged.expect("interval is non-empty");
    acc.rows.sort_unstable();
    acc.rows.dedup();
    for slot in (base + 1..base + n_items).rev() {
        page.remove_item(slot).map_err(page_damage)?;
    }
    page.replace_item(base, acc.encode()).map_err(page_damage)?;
    Ok(())
}

fn page_damage(err: crate::page::PageError) -> RedoError {
    RedoError::corrupt_record(err.to_string())
}

/// Encodes a split's page data: the level, then the post-split item lists of
/// the left and right pages.
pub fn encode_split_payload(level: u32, left: &[Vec<u8>], right: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&level.to_le_bytes());
    encode_item_list(&mut buf, left);
    encode_item_list(&mut buf, right);
    buf
}

/// Decodes a split payload into (level, left items, right items).
pub fn decode_split_payload(bytes: &[u8]) -> RedoResult<(u32, Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    if bytes.len() < 4 {
        return Err(RedoError::corrupt_record("split payload shorter than header"));
    }
    let level = u32::from_le_bytes(bytes[0..4].try_into().expect("sized slice"));
    let mut pos = 4;
    let left = decode_item_list(bytes, &mut pos)?;
    let right = decode_item_list(&bytes[pos..], &mut 0)?;
    Ok((level, left, right))
}

/// Encodes the item list carried by a new-root record.
pub fn encode_root_payload(items: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_item_list(&mut buf, items);
    buf
}

/// Decodes the item list carried by a new-root record.
pub fn decode_root_payload(bytes: &[u8]) -> RedoResult<Vec<Vec<u8>>> {
    decode_item_list(bytes, &mut 0)
}

fn encode_item_list(buf: &mut Vec<u8>, items: &[Vec<u8>]) {
    debug_assert!(items.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(items.len() as u16).to_le_bytes());
    for item in items {
        debug_assert!(item.len() <= u16::MAX as usize);
        buf.extend_from_slice(&(item.len() as u16).to_le_bytes());
        buf.extend_from_slice(item);
    }
}

fn decode_item_list(bytes: &[u8], pos: &mut usize) -> RedoResult<Vec<Vec<u8>>> {
    let take = |pos: &mut usize, n: usize| -> RedoResult<&[u8]> {
        if bytes.len() - *pos < n {
            return Err(RedoError::corrupt_record("truncated item list"));
        }
        let out = &bytes[*pos..*pos + n];
        *pos += n;
        Ok(out)
    };
    let count_bytes = take(pos, 2)?;
    let count = u16::from_le_bytes([count_bytes[0], count_bytes[1]]) as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let len_bytes = take(pos, 2)?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        items.push(take(pos, len)?.to_vec());
    }
    Ok(items)
}

fn decode_dedup_payload(bytes: &[u8]) -> RedoResult<Vec<(u16, u16)>> {
    if bytes.len() % 4 != 0 {
        return Err(RedoError::corrupt_record("dedup payload not interval-sized"));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| {
            (
                u16::from_le_bytes([c[0], c[1]]),
                u16::from_le_bytes([c[2], c[3]]),
            )
        })
        .collect())
}

/// Encodes dedup intervals as `(base, n_items)` pairs.
pub fn encode_dedup_payload(intervals: &[(u16, u16)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(intervals.len() * 4);
    for (base, n_items) in intervals {
        buf.extend_from_slice(&base.to_le_bytes());
        buf.extend_from_slice(&n_items.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::am::entry::RowPointer;
    use crate::page::INVALID_BLOCK;

    fn leaf_with(keys: &[i64]) -> Page {
        let mut page = Page::new_tree(0);
        for (i, &key) in keys.iter().enumerate() {
            page.append_item(IndexEntry::single(key, RowPointer::new(1, i as u16 + 1)).encode());
        }
        page
    }

    fn entry(seq: u64, record: RedoRecord, payload: Vec<u8>) -> LogEntry {
        LogEntry {
            seq,
            relation: 1,
            block: 2,
            aux_block: INVALID_BLOCK,
            record,
            payload,
        }
    }

    #[test]
    fn test_insert_applies_once() {
        let mut page = leaf_with(&[10, 30]);
        let item = IndexEntry::single(20, RowPointer::new(5, 5)).encode();
        let e = entry(
            7,
            RedoRecord::Insert {
                target: InsertTarget::Leaf,
                slot: 2,
            },
            item.clone(),
        );

        assert!(apply(&e, &mut page).unwrap());
        assert_eq!(page.max_slot(), 3);
        assert_eq!(page.item(2).unwrap(), item.as_slice());
        assert_eq!(page.lsn(), 7);

        // Second application is a no-op
        assert!(!apply(&e, &mut page).unwrap());
        assert_eq!(page.max_slot(), 3);
    }

    #[test]
    fn test_delete_removes_descending() {
        let mut page = leaf_with(&[1, 2, 3, 4]);
        let e = entry(
            3,
            RedoRecord::Delete {
                conflict_horizon: 0,
                is_catalog_rel: false,
                deleted: vec![1, 3],
                updated: vec![],
            },
            Vec::new(),
        );
        assert!(apply(&e, &mut page).unwrap());
        assert_eq!(page.max_slot(), 2);
        let keep: Vec<i64> = (1..=2)
            .map(|s| IndexEntry::decode(page.item(s).unwrap()).unwrap().key)
            .collect();
        assert_eq!(keep, vec![2, 4]);
    }

    #[test]
    fn test_vacuum_posting_update() {
        let mut page = Page::new_tree(0);
        page.append_item(
            IndexEntry {
                key: 5,
                rows: vec![
                    RowPointer::new(1, 1),
                    RowPointer::new(1, 2),
                    RowPointer::new(1, 3),
                ],
            }
            .encode(),
        );
        let e = entry(
            2,
            RedoRecord::Vacuum {
                deleted: vec![],
                updated: vec![PostingUpdate {
                    slot: 1,
                    deleted_row_indexes: vec![1],
                }],
            },
            Vec::new(),
        );
        assert!(apply(&e, &mut page).unwrap());
        let got = IndexEntry::decode(page.item(1).unwrap()).unwrap();
        assert_eq!(got.rows, vec![RowPointer::new(1, 1), RowPointer::new(1, 3)]);
    }

    #[test]
    fn test_dedup_merges_interval() {
        let mut page = leaf_with(&[7, 7, 7, 9]);
        let e = entry(
            4,
            RedoRecord::Dedup { n_intervals: 1 },
            encode_dedup_payload(&[(1, 3)]),
        );
        assert!(apply(&e, &mut page).unwrap());
        assert_eq!(page.max_slot(), 2);
        let merged = IndexEntry::decode(page.item(1).unwrap()).unwrap();
        assert_eq!(merged.key, 7);
        assert_eq!(merged.rows.len(), 3);
    }

    #[test]
    fn test_split_truncates_left_page() {
        let mut page = leaf_with(&[1, 2, 3, 4]);
        let left: Vec<Vec<u8>> = (1..=2).map(|s| page.item(s).unwrap().to_vec()).collect();
        let right: Vec<Vec<u8>> = (3..=4).map(|s| page.item(s).unwrap().to_vec()).collect();
        let e = LogEntry {
            seq: 9,
            relation: 1,
            block: 2,
            aux_block: 5,
            record: RedoRecord::Split {
                side: super::super::record::SplitSide::Left,
                level: 0,
                first_right_slot: 3,
                new_item_slot: 1,
                posting_split_offset: 0,
            },
            payload: encode_split_payload(0, &left, &right),
        };
        assert!(apply(&e, &mut page).unwrap());
        assert_eq!(page.max_slot(), 2);
        assert_eq!(page.lsn(), 9);
    }

    #[test]
    fn test_reuse_page_is_pure_noop() {
        let mut page = leaf_with(&[1]);
        let before = page.clone();
        let e = entry(
            50,
            RedoRecord::ReusePage {
                locator: super::super::record::RelationLocator {
                    space: 1,
                    database: 1,
                    relation: 1,
                },
                conflict_horizon: super::super::record::FullTransactionId { epoch: 0, xid: 9 },
                is_catalog_rel: false,
            },
            Vec::new(),
        );
        assert!(!apply(&e, &mut page).unwrap());
        assert_eq!(page, before);
    }

    #[test]
    fn test_half_dead_drops_parent_downlink() {
        use crate::am::entry::InternalEntry;
        let mut parent = Page::new_tree(1);
        for (low, high, child) in [(1, 5, 7u32), (6, 9, 8)] {
            parent.append_item(InternalEntry { low, high, child }.encode());
        }
        let mark = entry(
            2,
            RedoRecord::MarkPageHalfDead {
                grandparent: INVALID_BLOCK,
                leaf: 7,
                left_sibling: INVALID_BLOCK,
                right_sibling: INVALID_BLOCK,
            },
            Vec::new(),
        );
        assert!(apply(&mark, &mut parent).unwrap());
        assert_eq!(parent.max_slot(), 1);
        assert_eq!(
            InternalEntry::decode(parent.item(1).unwrap()).unwrap().child,
            8
        );
    }

    #[test]
    fn test_unlink_empties_the_page() {
        let mut page = leaf_with(&[1, 2]);
        let unlink = entry(
            3,
            RedoRecord::UnlinkPage {
                with_meta: false,
                left_sibling: INVALID_BLOCK,
                right_sibling: INVALID_BLOCK,
                level: 0,
                safe_xid: super::super::record::FullTransactionId { epoch: 0, xid: 1 },
                leaf_left_sibling: INVALID_BLOCK,
                leaf_right_sibling: INVALID_BLOCK,
                leaf_top_parent: INVALID_BLOCK,
            },
            Vec::new(),
        );
        assert!(apply(&unlink, &mut page).unwrap());
        assert_eq!(page.max_slot(), 0);
    }
}
