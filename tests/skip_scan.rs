//! Distinct-key skip scans over a multi-page tree.
//!
//! A skip scan yields one row per distinct key value, leaping over the rest
//! of each duplicate run by re-descending with a tightened bound. Because
//! every leap is a fresh pruned descent, the distinct values come back in
//! key order even though page contents are unordered.

use std::sync::Arc;

use arbordb::am::entry::RowPointer;
use arbordb::am::TreeAm;
use arbordb::context::EngineContext;
use arbordb::redo::VecSink;
use arbordb::scan::{Direction, ScanDescriptor, ScanKey};
use arbordb::skip::SkipSupport;

const REL: u32 = 5;

fn setup(am: TreeAm, rows: &[(i64, u16)]) -> Arc<EngineContext> {
    let ctx = Arc::new(EngineContext::new());
    let mut sink = VecSink::new();
    am.create(&ctx, REL).unwrap();
    for &(key, slot) in rows {
        am.insert(&ctx, &mut sink, REL, key, RowPointer::new(200, slot))
            .unwrap();
    }
    ctx
}

fn collect_keys(mut scan: ScanDescriptor) -> Vec<i64> {
    let mut keys = Vec::new();
    while let Some(hit) = scan.get_next().unwrap() {
        keys.push(hit.key);
    }
    keys
}

#[test]
fn test_skip_scan_yields_distinct_keys_in_order() {
    let am = TreeAm::with_capacity(4);
    let rows: Vec<(i64, u16)> = vec![
        (3, 1),
        (3, 2),
        (7, 1),
        (1, 1),
        (7, 2),
        (9, 1),
        (1, 2),
        (5, 1),
        (3, 3),
    ];
    let ctx = setup(am, &rows);
    let scan = ScanDescriptor::open(
        ctx,
        Arc::new(am),
        REL,
        Direction::Forward,
        vec![],
        Some(SkipSupport::for_int()),
    )
    .unwrap();
    assert_eq!(collect_keys(scan), vec![1, 3, 5, 7, 9]);
}

#[test]
fn test_plain_scan_yields_every_row() {
    let am = TreeAm::with_capacity(4);
    let rows: Vec<(i64, u16)> = vec![(3, 1), (3, 2), (7, 1), (1, 1), (7, 2)];
    let ctx = setup(am, &rows);
    let scan = ScanDescriptor::open(
        ctx,
        Arc::new(am),
        REL,
        Direction::Forward,
        vec![],
        None,
    )
    .unwrap();
    assert_eq!(collect_keys(scan).len(), 5);
}

#[test]
fn test_backward_skip_scan_descends_distinct_keys() {
    let am = TreeAm::with_capacity(4);
    let rows: Vec<(i64, u16)> = vec![(1, 1), (2, 1), (2, 2), (3, 1), (2, 3), (1, 2)];
    let ctx = setup(am, &rows);
    let scan = ScanDescriptor::open(
        ctx,
        Arc::new(am),
        REL,
        Direction::Backward,
        vec![],
        Some(SkipSupport::for_int()),
    )
    .unwrap();
    assert_eq!(collect_keys(scan), vec![3, 2, 1]);
}

#[test]
fn test_skip_scan_ends_at_domain_bound() {
    let am = TreeAm::new();
    let rows: Vec<(i64, u16)> = vec![(2, 1), (4, 1), (9, 1)];
    let ctx = setup(am, &rows);
    // Key 9 lies beyond the supported domain; incrementing past 4
    // overflows and the scan finishes instead of leaping.
    let scan = ScanDescriptor::open(
        ctx,
        Arc::new(am),
        REL,
        Direction::Forward,
        vec![],
        Some(SkipSupport::bounded(0, 4)),
    )
    .unwrap();
    assert_eq!(collect_keys(scan), vec![2, 4]);
}

#[test]
fn test_skip_scan_combines_with_caller_keys() {
    let am = TreeAm::with_capacity(4);
    let rows: Vec<(i64, u16)> = vec![(1, 1), (2, 1), (2, 2), (5, 1), (5, 2), (8, 1)];
    let ctx = setup(am, &rows);
    let scan = ScanDescriptor::open(
        ctx,
        Arc::new(am),
        REL,
        Direction::Forward,
        vec![ScanKey::Range {
            low: Some(2),
            high: Some(5),
        }],
        Some(SkipSupport::for_int()),
    )
    .unwrap();
    assert_eq!(collect_keys(scan), vec![2, 5]);
}
