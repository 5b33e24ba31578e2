//! Scan descriptor lifecycle
//!
//! The descriptor is exclusively owned by its opening caller. Its position
//! state sits behind a mutex shared with the open-scan registry, because the
//! adjustment broadcast is the one sanctioned cross-worker mutation of a
//! scan. Everything else here runs on the owning worker only.

use std::sync::{Arc, Mutex};

use crate::context::EngineContext;
use crate::lock::LockMode;
use crate::page::{RelationId, FIRST_SLOT};
use crate::skip::{PreparedSkip, SkipSupport};

use super::errors::ScanResult;
use super::position::{ItemPosition, Position, Step};
use super::{AccessMethod, Direction, EntryMatch, ScanHit, ScanKey, ScanPosState};

pub struct ScanDescriptor {
    ctx: Arc<EngineContext>,
    am: Arc<dyn AccessMethod>,
    relation: RelationId,
    direction: Direction,
    keys: Vec<ScanKey>,
    state: Arc<Mutex<ScanPosState>>,
    /// Operator-class support for distinct-key leaping, if the caller asked
    /// for a skip scan.
    skip_support: Option<SkipSupport>,
    skip: Option<PreparedSkip>,
    /// Key bound installed after a distinct-key leap; folded into the
    /// effective keys of every later call.
    skip_bound: Option<i64>,
}

impl ScanDescriptor {
    /// Opens a scan: takes the read-intent lock, registers for adjustment
    /// notifications, and leaves all positions invalid until the first
    /// `get_next`.
    pub fn open(
        ctx: Arc<EngineContext>,
        am: Arc<dyn AccessMethod>,
        relation: RelationId,
        direction: Direction,
        keys: Vec<ScanKey>,
        skip_support: Option<SkipSupport>,
    ) -> ScanResult<ScanDescriptor> {
        ctx.locks.acquire(relation, LockMode::ReadIntent)?;
        let mut st = ScanPosState::new();
        st.forward = direction.is_forward();
        let state = Arc::new(Mutex::new(st));
        ctx.scans.register(relation, &state);
        let skip = skip_support.map(|s| PreparedSkip::prepare(s, !direction.is_forward()));
        Ok(ScanDescriptor {
            ctx,
            am,
            relation,
            direction,
            keys,
            state,
            skip_support,
            skip,
            skip_bound: None,
        })
    }

    pub fn relation(&self) -> RelationId {
        self.relation
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The current position, for diagnostics and tests.
    pub fn position(&self) -> Position {
        self.state.lock().expect("scan state poisoned").positions.current
    }

    /// Yields the next matching entry in scan order, or `None` at the end of
    /// the scan.
    pub fn get_next(&mut self) -> ScanResult<Option<ScanHit>> {
        let shared = Arc::clone(&self.state);
        let mut st = shared.lock().expect("scan state poisoned");
        let keys = self.effective_keys();
        let internal_keys = self.am.translate_keys(&keys);

        loop {
            if !st.started {
                st.started = true;
                let first = self.am.locate_first(
                    &self.ctx.pages,
                    self.relation,
                    self.direction,
                    &internal_keys,
                    &mut st.stack,
                )?;
                st.positions.install(first);
                st.posting_next = 0;
                st.current_before_first = false;
            }
            if st.positions.finished() {
                return Ok(None);
            }

            if st.current_before_first {
                // One extra step in scan direction, then normal search.
                // Forward, the step lands on the clamped first slot itself;
                // backward, it leaves the page.
                st.current_before_first = false;
                st.posting_next = 0;
                if !self.direction.is_forward() {
                    let cur = st
                        .positions
                        .current
                        .known()
                        .expect("boundary flag on a positionless scan");
                    let from = ItemPosition::new(cur.block, FIRST_SLOT);
                    let found = self.am.locate_next(
                        &self.ctx.pages,
                        self.relation,
                        self.direction,
                        &internal_keys,
                        from,
                        &mut st.stack,
                    )?;
                    st.positions.next = Position::Unknown;
                    st.positions.resolve_next(found.known());
                    continue;
                }
            }

            let Some(cur) = st.positions.current.known() else {
                return Ok(None);
            };
            match self
                .am
                .examine(&self.ctx.pages, self.relation, cur, &keys)?
            {
                EntryMatch::Match(entry) => {
                    let idx = st.posting_next as usize;
                    if idx >= entry.rows.len() {
                        self.advance(&mut st, &internal_keys)?;
                        continue;
                    }
                    st.posting_next += 1;
                    let hit = ScanHit {
                        key: entry.key,
                        row: entry.rows[idx],
                    };
                    if let Some(skip) = self.skip {
                        self.leap_past(&mut st, skip, entry.key);
                    }
                    return Ok(Some(hit));
                }
                EntryMatch::NoMatch | EntryMatch::Vanished => {
                    self.advance(&mut st, &internal_keys)?;
                }
            }
        }
    }

    /// Remembers the current position and descent stack for a later restore.
    pub fn mark(&self) {
        let mut st = self.state.lock().expect("scan state poisoned");
        st.mark = st.positions.current;
        st.mark_before_first = st.current_before_first;
        st.mark_posting_next = st.posting_next;
        st.marked_stack = st.stack.clone();
        st.marked = true;
    }

    /// Returns the scan to its marked position. Restoring without a prior
    /// mark is a protocol violation: asserted in debug builds, a no-op in
    /// release builds.
    pub fn restore(&self) {
        let mut st = self.state.lock().expect("scan state poisoned");
        debug_assert!(st.marked, "restore without a prior mark");
        if !st.marked {
            return;
        }
        if st.mark.is_unknown() {
            // The marked page split out from under a stackless descent;
            // the only position that cannot skip entries is the start.
            st.reset();
            st.mark = Position::Unknown;
            st.marked = true;
            return;
        }
        st.stack = st.marked_stack.clone();
        let mark = st.mark;
        st.positions.install(mark);
        st.current_before_first = st.mark_before_first;
        st.posting_next = st.mark_posting_next;
        st.started = true;
    }

    /// Restarts the scan with new keys and direction: all positions return
    /// to invalid and keys are re-translated for the internal levels on the
    /// next descent.
    pub fn rescan(&mut self, direction: Direction, keys: Vec<ScanKey>) {
        self.direction = direction;
        self.keys = keys;
        self.skip = self
            .skip_support
            .map(|s| PreparedSkip::prepare(s, !direction.is_forward()));
        self.skip_bound = None;
        let mut st = self.state.lock().expect("scan state poisoned");
        st.reset();
        st.forward = direction.is_forward();
    }

    /// Closes the scan. Dropping the descriptor is equivalent; closing is
    /// safe at any point and frees the whole descent stack.
    pub fn close(self) {}

    fn effective_keys(&self) -> Vec<ScanKey> {
        let mut keys = self.keys.clone();
        if let Some(bound) = self.skip_bound {
            keys.push(if self.direction.is_forward() {
                ScanKey::Range {
                    low: Some(bound),
                    high: None,
                }
            } else {
                ScanKey::Range {
                    low: None,
                    high: Some(bound),
                }
            });
        }
        keys
    }

    /// Moves the position window off the current item.
    fn advance(&self, st: &mut ScanPosState, internal_keys: &[ScanKey]) -> ScanResult<()> {
        match st.positions.step() {
            Step::On(_) | Step::Finished => {}
            Step::NeedsResolve => {
                let cur = st
                    .positions
                    .current
                    .known()
                    .expect("unresolved next beside an unpositioned scan");
                let found = self.am.locate_next(
                    &self.ctx.pages,
                    self.relation,
                    self.direction,
                    internal_keys,
                    cur,
                    &mut st.stack,
                )?;
                st.positions.resolve_next(found.known());
            }
        }
        st.posting_next = 0;
        Ok(())
    }

    /// After yielding `key` in a skip scan, jumps the scan past the rest of
    /// that key's duplicate run: the next call re-descends with a tightened
    /// bound, or finishes when no further distinct value exists.
    fn leap_past(&mut self, st: &mut ScanPosState, skip: PreparedSkip, key: i64) {
        let mark = st.mark;
        let mark_before_first = st.mark_before_first;
        let mark_posting_next = st.mark_posting_next;
        let marked = st.marked;
        let marked_stack = std::mem::take(&mut st.marked_stack);
        st.reset();
        st.mark = mark;
        st.mark_before_first = mark_before_first;
        st.mark_posting_next = mark_posting_next;
        st.marked = marked;
        st.marked_stack = marked_stack;

        match skip.next_distinct(key) {
            Ok(bound) => self.skip_bound = Some(bound),
            Err(_) => {
                // No further distinct value in the domain
                st.started = true;
                st.positions.install(Position::Invalid);
            }
        }
    }
}

impl Drop for ScanDescriptor {
    fn drop(&mut self) {
        self.ctx.scans.deregister(self.relation, &self.state);
        self.ctx.locks.release(self.relation, LockMode::ReadIntent);
    }
}
