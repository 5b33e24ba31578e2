//! Integrity checking
//!
//! Read-only structural checks over a relation's tree and over a redo log
//! file. Both walks collect findings instead of failing fast, so one pass
//! reports every problem a page or log holds. Only infrastructure failures
//! (an unreadable meta page, an unopenable log file) surface as errors.

mod errors;

pub use errors::{VerifyError, VerifyResult};

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::am::entry::{IndexEntry, InternalEntry};
use crate::am::META_BLOCK;
use crate::page::{BlockNumber, PageStore, RelationId, SlotNumber, SpecialArea, FIRST_SLOT};
use crate::redo::{describe, LogEntry, RedoError, RedoLogReader};

/// One structural finding from a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    BadMeta {
        detail: String,
    },
    /// A downlink names a block the store does not hold.
    MissingChild {
        block: BlockNumber,
        slot: SlotNumber,
        child: BlockNumber,
    },
    /// A child's special area disagrees with its parent about depth.
    LevelMismatch {
        block: BlockNumber,
        expected: u32,
        found: u32,
    },
    /// An item's bytes do not decode for the page's level.
    BadItem {
        block: BlockNumber,
        slot: SlotNumber,
        detail: String,
    },
    /// A leaf key falls outside the downlink interval that led to it.
    KeyOutsideInterval {
        block: BlockNumber,
        slot: SlotNumber,
        key: i64,
    },
    EmptyPosting {
        block: BlockNumber,
        slot: SlotNumber,
    },
    /// Posting list rows out of order or duplicated.
    UnsortedPosting {
        block: BlockNumber,
        slot: SlotNumber,
    },
    /// A half-dead page still has a live downlink pointing at it.
    HalfDeadReachable {
        block: BlockNumber,
    },
    /// The same block is reachable along two downlink paths.
    CycleDetected {
        block: BlockNumber,
    },
    /// A live page no downlink path reaches, usually an interrupted cleanup.
    OrphanPage {
        block: BlockNumber,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::BadMeta { detail } => write!(f, "meta page: {}", detail),
            Problem::MissingChild { block, slot, child } => {
                write!(f, "block {} slot {}: downlink to missing block {}", block, slot, child)
            }
            Problem::LevelMismatch {
                block,
                expected,
                found,
            } => write!(
                f,
                "block {}: expected level {}, page claims {}",
                block, expected, found
            ),
            Problem::BadItem {
                block,
                slot,
                detail,
            } => write!(f, "block {} slot {}: undecodable item: {}", block, slot, detail),
            Problem::KeyOutsideInterval { block, slot, key } => write!(
                f,
                "block {} slot {}: key {} outside parent interval",
                block, slot, key
            ),
            Problem::EmptyPosting { block, slot } => {
                write!(f, "block {} slot {}: empty posting list", block, slot)
            }
            Problem::UnsortedPosting { block, slot } => {
                write!(f, "block {} slot {}: posting list unsorted or duplicated", block, slot)
            }
            Problem::HalfDeadReachable { block } => {
                write!(f, "block {}: half-dead page still reachable", block)
            }
            Problem::CycleDetected { block } => {
                write!(f, "block {}: reached twice during walk", block)
            }
            Problem::OrphanPage { block } => write!(f, "block {}: unreachable live page", block),
        }
    }
}

/// Outcome of a tree walk.
#[derive(Debug, Default, Clone)]
pub struct TreeReport {
    pub pages_checked: u32,
    pub entries_checked: u64,
    pub problems: Vec<Problem>,
}

impl TreeReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Walks a relation's tree from the meta page down, checking every
/// reachable page and flagging live pages the walk never reaches.
pub fn verify_tree(pages: &PageStore, relation: RelationId) -> VerifyResult<TreeReport> {
    let mut report = TreeReport::default();
    let meta = pages.read(relation, META_BLOCK)?;
    let SpecialArea::Meta {
        root, root_level, ..
    } = *meta.special_area()
    else {
        report.problems.push(Problem::BadMeta {
            detail: "meta block carries a tree special area".into(),
        });
        return Ok(report);
    };
    report.pages_checked += 1;

    let mut visited: HashSet<BlockNumber> = HashSet::new();
    visited.insert(META_BLOCK);
    if root != crate::page::INVALID_BLOCK {
        if pages.exists(relation, root) {
            walk(
                pages, relation, root, root_level, None, &mut visited, &mut report,
            );
        } else {
            report.problems.push(Problem::BadMeta {
                detail: format!("root pointer names missing block {}", root),
            });
        }
    }

    for block in pages.blocks(relation) {
        if !visited.contains(&block) {
            report.problems.push(Problem::OrphanPage { block });
        }
    }
    Ok(report)
}

fn walk(
    pages: &PageStore,
    relation: RelationId,
    block: BlockNumber,
    expected_level: u32,
    interval: Option<(i64, i64)>,
    visited: &mut HashSet<BlockNumber>,
    report: &mut TreeReport,
) {
    if !visited.insert(block) {
        report.problems.push(Problem::CycleDetected { block });
        return;
    }
    let Ok(page) = pages.read(relation, block) else {
        // Caller checked existence for the root; downlinks report their own
        // missing children before recursing.
        return;
    };
    report.pages_checked += 1;

    let SpecialArea::Tree { level, half_dead } = *page.special_area() else {
        report.problems.push(Problem::BadMeta {
            detail: format!("block {} carries a meta special area", block),
        });
        return;
    };
    if half_dead {
        report.problems.push(Problem::HalfDeadReachable { block });
    }
    if level != expected_level {
        report.problems.push(Problem::LevelMismatch {
            block,
            expected: expected_level,
            found: level,
        });
    }

    for slot in FIRST_SLOT..=page.max_slot() {
        let Ok(item) = page.item(slot) else { continue };
        if level == 0 {
            check_leaf_item(item, block, slot, interval, report);
        } else {
            match InternalEntry::decode(item) {
                Ok(entry) => {
                    if entry.low > entry.high {
                        report.problems.push(Problem::BadItem {
                            block,
                            slot,
                            detail: format!(
                                "inverted interval [{}, {}]",
                                entry.low, entry.high
                            ),
                        });
                    }
                    if pages.exists(relation, entry.child) {
                        walk(
                            pages,
                            relation,
                            entry.child,
                            level - 1,
                            Some((entry.low, entry.high)),
                            visited,
                            report,
                        );
                    } else {
                        report.problems.push(Problem::MissingChild {
                            block,
                            slot,
                            child: entry.child,
                        });
                    }
                }
                Err(e) => report.problems.push(Problem::BadItem {
                    block,
                    slot,
                    detail: e.to_string(),
                }),
            }
        }
    }
}

fn check_leaf_item(
    item: &[u8],
    block: BlockNumber,
    slot: SlotNumber,
    interval: Option<(i64, i64)>,
    report: &mut TreeReport,
) {
    let entry = match IndexEntry::decode(item) {
        Ok(entry) => entry,
        Err(e) => {
            report.problems.push(Problem::BadItem {
                block,
                slot,
                detail: e.to_string(),
            });
            return;
        }
    };
    report.entries_checked += 1;
    if let Some((low, high)) = interval {
        if entry.key < low || entry.key > high {
            report.problems.push(Problem::KeyOutsideInterval {
                block,
                slot,
                key: entry.key,
            });
        }
    }
    if entry.rows.is_empty() {
        report.problems.push(Problem::EmptyPosting { block, slot });
        return;
    }
    if entry.rows.windows(2).any(|w| w[0] >= w[1]) {
        report.problems.push(Problem::UnsortedPosting { block, slot });
    }
}

/// Outcome of scanning a redo log file.
#[derive(Debug, Default, Clone)]
pub struct LogReport {
    pub frames_verified: u64,
    pub entries_decoded: u64,
    /// Human-readable findings: record-level decode failures, and the
    /// frame-level damage (if any) that ended the scan.
    pub problems: Vec<String>,
    /// True when the scan reached clean end-of-file.
    pub reached_end: bool,
}

impl LogReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.reached_end
    }
}

/// Scans a redo log front to back, checksumming every frame and decoding
/// every record. Record-level damage is reported and skipped; frame-level
/// damage ends the scan, since nothing past it can be framed.
pub fn verify_log(path: &Path) -> VerifyResult<LogReport> {
    let mut reader = RedoLogReader::open(path)?;
    let mut report = LogReport::default();
    loop {
        match reader.next_frame() {
            Ok(None) => {
                report.reached_end = true;
                return Ok(report);
            }
            Ok(Some((offset, body))) => {
                report.frames_verified += 1;
                match LogEntry::decode_body(&body) {
                    Ok(entry) => {
                        report.entries_decoded += 1;
                        // Exercise the printer too: it re-validates counts.
                        let _ = describe(&entry.record);
                    }
                    Err(e) => report
                        .problems
                        .push(format!("frame at offset {}: {}", offset, e)),
                }
            }
            Err(RedoError::CorruptLog { offset, reason }) => {
                report
                    .problems
                    .push(format!("log damaged at offset {}: {}", offset, reason));
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::am::entry::RowPointer;
    use crate::am::TreeAm;
    use crate::context::EngineContext;
    use crate::page::{Page, INVALID_BLOCK};
    use crate::redo::{RedoLogWriter, RedoRecord, RedoSink, VecSink};
    use std::fs;

    const REL: RelationId = 11;

    fn populated_ctx() -> EngineContext {
        let ctx = EngineContext::new();
        let mut sink = VecSink::new();
        let am = TreeAm::with_capacity(4);
        am.create(&ctx, REL).unwrap();
        for key in 0..20 {
            am.insert(&ctx, &mut sink, REL, key, RowPointer::new(50, key as u16 + 1))
                .unwrap();
        }
        ctx
    }

    #[test]
    fn test_populated_tree_is_clean() {
        let ctx = populated_ctx();
        let report = verify_tree(&ctx.pages, REL).unwrap();
        assert!(report.is_clean(), "problems: {:?}", report.problems);
        assert_eq!(report.entries_checked, 20);
        assert!(report.pages_checked > 2);
    }

    #[test]
    fn test_empty_tree_is_clean() {
        let ctx = EngineContext::new();
        TreeAm::new().create(&ctx, REL).unwrap();
        let report = verify_tree(&ctx.pages, REL).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.pages_checked, 1);
    }

    #[test]
    fn test_orphan_page_reported() {
        let ctx = populated_ctx();
        let (stray, _) = ctx.pages.allocate(REL);
        ctx.pages.write(REL, stray, Page::new_tree(0));
        let report = verify_tree(&ctx.pages, REL).unwrap();
        assert_eq!(report.problems, vec![Problem::OrphanPage { block: stray }]);
    }

    #[test]
    fn test_corrupt_item_reported() {
        let ctx = populated_ctx();
        let block = *ctx.pages.blocks(REL).last().unwrap();
        ctx.pages
            .update(REL, block, |p| {
                p.replace_item(FIRST_SLOT, vec![1, 2, 3])
            })
            .unwrap()
            .unwrap();
        let report = verify_tree(&ctx.pages, REL).unwrap();
        assert!(report
            .problems
            .iter()
            .any(|p| matches!(p, Problem::BadItem { .. })));
    }

    #[test]
    fn test_unsorted_posting_reported() {
        let ctx = EngineContext::new();
        let am = TreeAm::new();
        am.create(&ctx, REL).unwrap();
        let mut sink = VecSink::new();
        am.insert(&ctx, &mut sink, REL, 5, RowPointer::new(50, 1))
            .unwrap();
        let root = ctx.pages.blocks(REL)[1];
        let bad = IndexEntry {
            key: 5,
            rows: vec![RowPointer::new(50, 2), RowPointer::new(50, 2)],
        };
        ctx.pages
            .update(REL, root, |p| p.replace_item(FIRST_SLOT, bad.encode()))
            .unwrap()
            .unwrap();
        let report = verify_tree(&ctx.pages, REL).unwrap();
        assert_eq!(
            report.problems,
            vec![Problem::UnsortedPosting {
                block: root,
                slot: FIRST_SLOT
            }]
        );
    }

    #[test]
    fn test_clean_log_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redo.log");
        let mut writer = RedoLogWriter::open(&path).unwrap();
        writer
            .append(
                REL,
                2,
                INVALID_BLOCK,
                RedoRecord::NewRoot { level: 0 },
                Vec::new(),
            )
            .unwrap();
        let report = verify_log(&path).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.frames_verified, 1);
        assert_eq!(report.entries_decoded, 1);
    }

    #[test]
    fn test_torn_tail_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redo.log");
        let mut writer = RedoLogWriter::open(&path).unwrap();
        writer
            .append(
                REL,
                2,
                INVALID_BLOCK,
                RedoRecord::NewRoot { level: 0 },
                Vec::new(),
            )
            .unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[9, 9, 9]);
        fs::write(&path, &bytes).unwrap();

        let report = verify_log(&path).unwrap();
        assert_eq!(report.frames_verified, 1);
        assert!(!report.reached_end);
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].contains("torn frame"));
    }
}
