//! Tree access method
//!
//! An interval tree over a single i64 key column. Internal items carry the
//! bounding key interval of their child page, so an equality predicate at the
//! leaf level becomes interval containment one level up. Pages hold their
//! items as unsorted bags: inserts append and never disturb other slots,
//! while deletes renumber and splits redistribute, which is what the scan
//! adjustment broadcast repairs.

pub mod entry;
mod errors;
mod tree;
mod write;

pub use errors::{AmError, AmResult};
pub use tree::{TreeAm, META_BLOCK};
