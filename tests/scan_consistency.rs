//! End-to-end scan consistency under concurrent structural mutation.
//!
//! Each test opens a real scan over a real tree, mutates the tree through
//! the writers (which broadcast adjustments before releasing the structural
//! lock), and checks the scan neither skips a surviving entry nor loses its
//! place. Re-reads after a split are allowed; silent skips are not.

use std::sync::Arc;

use arbordb::am::entry::RowPointer;
use arbordb::am::TreeAm;
use arbordb::context::EngineContext;
use arbordb::redo::VecSink;
use arbordb::scan::{Direction, ScanDescriptor, ScanKey};

const REL: u32 = 7;

fn row(key: i64) -> RowPointer {
    RowPointer::new(100, key as u16)
}

fn setup(am: TreeAm, keys: &[i64]) -> (Arc<EngineContext>, VecSink) {
    let ctx = Arc::new(EngineContext::new());
    let mut sink = VecSink::new();
    am.create(&ctx, REL).unwrap();
    for &key in keys {
        am.insert(&ctx, &mut sink, REL, key, row(key)).unwrap();
    }
    (ctx, sink)
}

fn open_scan(
    ctx: &Arc<EngineContext>,
    am: TreeAm,
    direction: Direction,
    keys: Vec<ScanKey>,
) -> ScanDescriptor {
    ScanDescriptor::open(Arc::clone(ctx), Arc::new(am), REL, direction, keys, None).unwrap()
}

fn next_key(scan: &mut ScanDescriptor) -> Option<i64> {
    scan.get_next().unwrap().map(|h| h.key)
}

#[test]
fn test_empty_index_scan_ends_immediately_both_directions() {
    let am = TreeAm::new();
    let (ctx, _) = setup(am, &[]);
    for direction in [Direction::Forward, Direction::Backward] {
        let mut scan = open_scan(&ctx, am, direction, vec![]);
        assert_eq!(next_key(&mut scan), None);
        assert_eq!(next_key(&mut scan), None);
    }
}

#[test]
fn test_delete_below_scan_position_does_not_skip_or_repeat() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3, 4, 5, 6, 7, 8]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    for expected in 1..=4 {
        assert_eq!(next_key(&mut scan), Some(expected));
    }

    // Remove the entry behind the scan; slots above it shift down.
    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 3, row(3)).unwrap());

    for expected in 5..=8 {
        assert_eq!(next_key(&mut scan), Some(expected));
    }
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_delete_of_just_returned_entry_resumes_at_successor() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3, 4, 5, 6, 7, 8]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    for expected in 1..=3 {
        assert_eq!(next_key(&mut scan), Some(expected));
    }

    // The scan's own position decrements with the slots it sits on.
    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 3, row(3)).unwrap());

    for expected in 4..=8 {
        assert_eq!(next_key(&mut scan), Some(expected));
    }
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_delete_at_first_slot_clamps_scan_to_page_start() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3, 4]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    assert_eq!(next_key(&mut scan), Some(1));

    // Deleting slot 1 under a scan at slot 1 leaves it just before the
    // first live slot; forward, the next step examines that slot itself.
    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 1, row(1)).unwrap());

    assert_eq!(next_key(&mut scan), Some(2));
    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(4));
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_vacuum_of_mid_posting_entry_does_not_replay_predecessor_rows() {
    let am = TreeAm::new();
    let ctx = Arc::new(EngineContext::new());
    let mut sink = VecSink::new();
    am.create(&ctx, REL).unwrap();
    for (key, n_rows) in [(1i64, 3i64), (2, 3), (3, 2), (4, 1)] {
        for n in 1..=n_rows {
            am.insert(&ctx, &mut sink, REL, key, RowPointer::new(100, (key * 10 + n) as u16))
                .unwrap();
        }
    }

    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    // All of key 1, then partway into key 2's posting list.
    for expected in [1, 1, 1, 2] {
        assert_eq!(next_key(&mut scan), Some(expected));
    }

    // Every row of key 2 is dead, so the whole entry goes mid-traversal.
    let dead: Vec<RowPointer> = (1u16..=3).map(|n| RowPointer::new(100, 20 + n)).collect();
    am.vacuum(&ctx, &mut sink, REL, &dead).unwrap();

    // Key 1's rows were already returned; the scan resumes at key 3.
    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(4));
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_backward_scan_survives_delete_below() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3, 4, 5]);
    let mut scan = open_scan(&ctx, am, Direction::Backward, vec![]);
    assert_eq!(next_key(&mut scan), Some(5));
    assert_eq!(next_key(&mut scan), Some(4));

    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 1, row(1)).unwrap());

    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(2));
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_backward_scan_clamped_off_page_end() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3]);
    let mut scan = open_scan(&ctx, am, Direction::Backward, vec![]);
    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(2));
    assert_eq!(next_key(&mut scan), Some(1));

    // Backward, the extra step off the clamped slot leaves the page.
    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 1, row(1)).unwrap());
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_split_under_scan_restarts_without_skipping() {
    let am = TreeAm::with_capacity(4);
    let (ctx, mut sink) = setup(am, &[10, 20, 30, 40]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    assert_eq!(next_key(&mut scan), Some(10));
    assert_eq!(next_key(&mut scan), Some(20));

    // Fifth insert splits the single root leaf out from under the scan.
    am.insert(&ctx, &mut sink, REL, 50, row(50)).unwrap();

    // The scan restarts its descent; the already-seen prefix comes back,
    // but nothing surviving is skipped.
    let mut rest = Vec::new();
    while let Some(key) = next_key(&mut scan) {
        rest.push(key);
    }
    assert_eq!(rest, vec![10, 20, 30, 40, 50]);
}

#[test]
fn test_split_resets_descent_frames_on_deeper_scans() {
    // Three levels: capacity 3 with 12 keys forces internal pages.
    let am = TreeAm::with_capacity(3);
    let keys: Vec<i64> = (1..=12).collect();
    let (ctx, mut sink) = setup(am, &keys);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(next_key(&mut scan).unwrap());
    }

    // Splits somewhere above the scan's leaf reset the affected frames.
    for key in [13, 14, 15, 16] {
        am.insert(&ctx, &mut sink, REL, key, row(key)).unwrap();
    }
    while let Some(key) = next_key(&mut scan) {
        seen.push(key);
    }

    // Every original key must appear at least once; re-reads are fine.
    for key in 1..=12 {
        assert!(seen.contains(&key), "key {} skipped, saw {:?}", key, seen);
    }
}

#[test]
fn test_mark_restore_replays_from_marked_entry() {
    let am = TreeAm::new();
    let (ctx, _) = setup(am, &[1, 2, 3, 4, 5]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    assert_eq!(next_key(&mut scan), Some(1));
    assert_eq!(next_key(&mut scan), Some(2));
    scan.mark();
    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(4));
    scan.restore();
    assert_eq!(next_key(&mut scan), Some(3));
    assert_eq!(next_key(&mut scan), Some(4));
    assert_eq!(next_key(&mut scan), Some(5));
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_mark_survives_delete_before_it() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3, 4, 5]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    assert_eq!(next_key(&mut scan), Some(1));
    assert_eq!(next_key(&mut scan), Some(2));
    assert_eq!(next_key(&mut scan), Some(3));
    scan.mark();
    assert_eq!(next_key(&mut scan), Some(4));

    // The marked slot shifts down with the deletion and still names key 3.
    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 1, row(1)).unwrap());

    scan.restore();
    assert_eq!(next_key(&mut scan), Some(4));
    assert_eq!(next_key(&mut scan), Some(5));
    assert_eq!(next_key(&mut scan), None);
}

#[test]
fn test_restore_after_split_of_marked_page_restarts() {
    let am = TreeAm::with_capacity(4);
    let (ctx, mut sink) = setup(am, &[10, 20, 30, 40]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    assert_eq!(next_key(&mut scan), Some(10));
    scan.mark();
    assert_eq!(next_key(&mut scan), Some(20));

    am.insert(&ctx, &mut sink, REL, 50, row(50)).unwrap();

    // The marked page was redistributed; the restore falls back to the
    // start of the scan rather than risk skipping moved entries.
    scan.restore();
    let mut rest = Vec::new();
    while let Some(key) = next_key(&mut scan) {
        rest.push(key);
    }
    assert_eq!(rest, vec![10, 20, 30, 40, 50]);
}

#[test]
fn test_rescan_after_structural_churn() {
    let am = TreeAm::with_capacity(4);
    let (ctx, mut sink) = setup(am, &[10, 20, 30, 40]);
    let mut scan = open_scan(&ctx, am, Direction::Forward, vec![]);
    assert_eq!(next_key(&mut scan), Some(10));

    am.insert(&ctx, &mut sink, REL, 50, row(50)).unwrap();
    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 20, row(20)).unwrap());

    scan.rescan(Direction::Backward, vec![ScanKey::Range { low: Some(30), high: None }]);
    let mut keys = Vec::new();
    while let Some(key) = next_key(&mut scan) {
        keys.push(key);
    }
    keys.sort_unstable();
    assert_eq!(keys, vec![30, 40, 50]);
}

#[test]
fn test_two_scans_adjusted_independently() {
    let am = TreeAm::new();
    let (ctx, mut sink) = setup(am, &[1, 2, 3, 4, 5, 6]);
    let mut ahead = open_scan(&ctx, am, Direction::Forward, vec![]);
    let mut behind = open_scan(&ctx, am, Direction::Forward, vec![]);
    for expected in 1..=4 {
        assert_eq!(next_key(&mut ahead), Some(expected));
    }
    assert_eq!(next_key(&mut behind), Some(1));

    assert!(am.delete_entry(&ctx, &mut sink, REL, 9, 2, row(2)).unwrap());

    assert_eq!(next_key(&mut ahead), Some(5));
    assert_eq!(next_key(&mut behind), Some(3));
    assert_eq!(next_key(&mut behind), Some(4));
}
