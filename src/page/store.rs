//! In-memory page store
//!
//! Stands in for the buffer/page cache at its interface boundary: read a
//! page, write a page back, allocate fresh blocks. Reads hand out clones;
//! the short page-read lock of a real buffer manager collapses into the
//! store's internal `RwLock` critical section.

use std::collections::HashMap;
use std::sync::RwLock;

use super::errors::{PageError, PageResult};
use super::{BlockNumber, Page, RelationId};

/// Shared page store for all relations in one engine context.
#[derive(Debug, Default)]
pub struct PageStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<(RelationId, BlockNumber), Page>,
    next_block: HashMap<RelationId, BlockNumber>,
    free: HashMap<RelationId, Vec<BlockNumber>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a copy of a page.
    pub fn read(&self, relation: RelationId, block: BlockNumber) -> PageResult<Page> {
        let inner = self.inner.read().expect("page store poisoned");
        inner
            .pages
            .get(&(relation, block))
            .cloned()
            .ok_or(PageError::BadBlock { relation, block })
    }

    /// Writes a page back, creating the block if it does not exist.
    pub fn write(&self, relation: RelationId, block: BlockNumber, page: Page) {
        let mut inner = self.inner.write().expect("page store poisoned");
        let next = inner.next_block.entry(relation).or_insert(0);
        if block >= *next {
            *next = block + 1;
        }
        inner.pages.insert((relation, block), page);
    }

    /// Mutates a page under the store lock.
    pub fn update<R>(
        &self,
        relation: RelationId,
        block: BlockNumber,
        f: impl FnOnce(&mut Page) -> R,
    ) -> PageResult<R> {
        let mut inner = self.inner.write().expect("page store poisoned");
        let page = inner
            .pages
            .get_mut(&(relation, block))
            .ok_or(PageError::BadBlock { relation, block })?;
        Ok(f(page))
    }

    /// Allocates a fresh block number, reusing a freed block when one exists.
    /// Returns the block and whether it came from the free list.
    pub fn allocate(&self, relation: RelationId) -> (BlockNumber, bool) {
        let mut inner = self.inner.write().expect("page store poisoned");
        if let Some(block) = inner.free.get_mut(&relation).and_then(Vec::pop) {
            return (block, true);
        }
        let next = inner.next_block.entry(relation).or_insert(0);
        let block = *next;
        *next += 1;
        (block, false)
    }

    /// Returns a block to the relation's free list and drops its page.
    pub fn release(&self, relation: RelationId, block: BlockNumber) {
        let mut inner = self.inner.write().expect("page store poisoned");
        inner.pages.remove(&(relation, block));
        inner.free.entry(relation).or_default().push(block);
    }

    /// True if the block currently holds a page.
    pub fn exists(&self, relation: RelationId, block: BlockNumber) -> bool {
        let inner = self.inner.read().expect("page store poisoned");
        inner.pages.contains_key(&(relation, block))
    }

    /// Every live block of a relation, ascending.
    pub fn blocks(&self, relation: RelationId) -> Vec<BlockNumber> {
        let inner = self.inner.read().expect("page store poisoned");
        let mut blocks: Vec<BlockNumber> = inner
            .pages
            .keys()
            .filter(|(rel, _)| *rel == relation)
            .map(|(_, block)| *block)
            .collect();
        blocks.sort_unstable();
        blocks
    }

    /// Every relation with at least one live page, ascending.
    pub fn relations(&self) -> Vec<RelationId> {
        let inner = self.inner.read().expect("page store poisoned");
        let mut relations: Vec<RelationId> = inner.pages.keys().map(|(rel, _)| *rel).collect();
        relations.sort_unstable();
        relations.dedup();
        relations
    }
}
