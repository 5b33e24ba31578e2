//! Per-relation open-scan registry
//!
//! Writers use the registry to find every open scan on a relation so they can
//! repair its cached position after a structural change. Entries are weak
//! references: the registry notifies, it never keeps a scan alive, and a scan
//! that was dropped without deregistering is pruned on the next walk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::page::RelationId;

use super::ScanPosState;

type SharedState = Arc<Mutex<ScanPosState>>;

#[derive(Debug, Default)]
pub struct ScanRegistry {
    inner: Mutex<HashMap<RelationId, Vec<Weak<Mutex<ScanPosState>>>>>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        ScanRegistry::default()
    }

    pub fn register(&self, relation: RelationId, state: &SharedState) {
        let mut inner = self.inner.lock().expect("scan registry poisoned");
        inner.entry(relation).or_default().push(Arc::downgrade(state));
    }

    pub fn deregister(&self, relation: RelationId, state: &SharedState) {
        let mut inner = self.inner.lock().expect("scan registry poisoned");
        if let Some(scans) = inner.get_mut(&relation) {
            scans.retain(|weak| match weak.upgrade() {
                Some(live) => !Arc::ptr_eq(&live, state),
                None => false,
            });
            if scans.is_empty() {
                inner.remove(&relation);
            }
        }
    }

    /// Runs `repair` against every live scan on `relation`. The caller must
    /// hold the relation's structural lock, so no scan is concurrently inside
    /// `get_next` while its state is rewritten.
    pub fn for_each_scan(&self, relation: RelationId, mut repair: impl FnMut(&mut ScanPosState)) {
        let mut inner = self.inner.lock().expect("scan registry poisoned");
        if let Some(scans) = inner.get_mut(&relation) {
            scans.retain(|weak| match weak.upgrade() {
                Some(live) => {
                    let mut state = live.lock().expect("scan state poisoned");
                    repair(&mut state);
                    true
                }
                None => false,
            });
            if scans.is_empty() {
                inner.remove(&relation);
            }
        }
    }

    #[cfg(test)]
    pub fn open_scans(&self, relation: RelationId) -> usize {
        let inner = self.inner.lock().expect("scan registry poisoned");
        inner
            .get(&relation)
            .map(|scans| scans.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}
