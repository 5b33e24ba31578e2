//! Relation-level lock manager interface
//!
//! Two modes only: `ReadIntent`, taken by every open scan, and `Structural`,
//! taken by writers about to change a page's slot set or inter-page links.
//! `Structural` excludes only other structural holders: scans keep their
//! `ReadIntent` while a mutation runs, and the mutation's adjustment
//! broadcast repairs their cached positions before the lock is released.
//! `ReadIntent` does wait out an in-flight structural mutation, so a scan
//! never starts its descent against a half-mutated tree.
//!
//! Acquisition is conditional: an incompatible request fails immediately with
//! `LockUnavailable` rather than queueing. The error is retryable.

mod errors;

pub use errors::{LockError, LockResult};

use std::collections::HashMap;
use std::sync::Mutex;

use crate::page::RelationId;

/// Lock modes, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared intent to read; held for the lifetime of a scan.
    ReadIntent,
    /// Exclusive right to perform a structural mutation.
    Structural,
}

#[derive(Debug, Default, Clone, Copy)]
struct Held {
    read_intent: u32,
    structural: bool,
}

/// Conditional relation-level lock table.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashMap<RelationId, Held>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditionally acquires `mode` on `relation`.
    pub fn acquire(&self, relation: RelationId, mode: LockMode) -> LockResult<()> {
        let mut held = self.held.lock().expect("lock table poisoned");
        let entry = held.entry(relation).or_default();
        match mode {
            LockMode::ReadIntent => {
                if entry.structural {
                    return Err(LockError::Unavailable { relation, mode });
                }
                entry.read_intent += 1;
            }
            LockMode::Structural => {
                if entry.structural {
                    return Err(LockError::Unavailable { relation, mode });
                }
                entry.structural = true;
            }
        }
        Ok(())
    }

    /// Releases a previously acquired lock.
    pub fn release(&self, relation: RelationId, mode: LockMode) {
        let mut held = self.held.lock().expect("lock table poisoned");
        let entry = held.entry(relation).or_default();
        match mode {
            LockMode::ReadIntent => {
                debug_assert!(entry.read_intent > 0, "release without acquire");
                entry.read_intent = entry.read_intent.saturating_sub(1);
            }
            LockMode::Structural => {
                debug_assert!(entry.structural, "release without acquire");
                entry.structural = false;
            }
        }
    }

    /// True while a structural mutation holds the relation.
    pub fn structural_held(&self, relation: RelationId) -> bool {
        let held = self.held.lock().expect("lock table poisoned");
        held.get(&relation).map(|h| h.structural).unwrap_or(false)
    }

    /// Number of read-intent holders, for diagnostics and tests.
    pub fn read_intent_count(&self, relation: RelationId) -> u32 {
        let held = self.held.lock().expect("lock table poisoned");
        held.get(&relation).map(|h| h.read_intent).unwrap_or(0)
    }
}
