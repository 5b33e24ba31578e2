//! Shared engine context
//!
//! One context per storage-engine instance, passed explicitly to everything
//! that opens scans or mutates relations. There is no process-global state:
//! the page store, the lock table, and the open-scan registry all live here.

use crate::lock::LockTable;
use crate::page::PageStore;
use crate::scan::ScanRegistry;

#[derive(Debug, Default)]
pub struct EngineContext {
    pub pages: PageStore,
    pub locks: LockTable,
    pub scans: ScanRegistry,
}

impl EngineContext {
    pub fn new() -> Self {
        EngineContext::default()
    }
}
