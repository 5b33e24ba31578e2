//! On-page item formats for the tree access method
//!
//! Leaf item: `key i64 | n_rows u16 | (block u32, slot u16)*` — one key with
//! a posting list of row pointers, kept sorted and duplicate-free.
//!
//! Internal item: `low i64 | high i64 | child u32` — the bounding key
//! interval of the child page. Intervals are widened in place during descent,
//! which never renumbers slots and so never requires a scan adjustment.

use crate::page::{BlockNumber, SlotNumber};

use super::errors::{AmError, AmResult};

/// Reference to a heap row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowPointer {
    pub block: BlockNumber,
    pub slot: SlotNumber,
}

impl RowPointer {
    pub fn new(block: BlockNumber, slot: SlotNumber) -> Self {
        Self { block, slot }
    }
}

/// A leaf index entry: one key and its posting list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: i64,
    pub rows: Vec<RowPointer>,
}

impl IndexEntry {
    /// Single-row entry.
    pub fn single(key: i64, row: RowPointer) -> Self {
        Self {
            key,
            rows: vec![row],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.rows.len() <= u16::MAX as usize);
        let mut buf = Vec::with_capacity(10 + self.rows.len() * 6);
        buf.extend_from_slice(&self.key.to_le_bytes());
        buf.extend_from_slice(&(self.rows.len() as u16).to_le_bytes());
        for row in &self.rows {
            buf.extend_from_slice(&row.block.to_le_bytes());
            buf.extend_from_slice(&row.slot.to_le_bytes());
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> AmResult<Self> {
        if bytes.len() < 10 {
            return Err(AmError::corrupt_entry("leaf item shorter than header"));
        }
        let key = i64::from_le_bytes(bytes[0..8].try_into().expect("sized slice"));
        let n_rows = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        if bytes.len() != 10 + n_rows * 6 {
            return Err(AmError::corrupt_entry(format!(
                "leaf item length {} does not match {} rows",
                bytes.len(),
                n_rows
            )));
        }
        let mut rows = Vec::with_capacity(n_rows);
        for i in 0..n_rows {
            let at = 10 + i * 6;
            rows.push(RowPointer {
                block: u32::from_le_bytes(bytes[at..at + 4].try_into().expect("sized slice")),
                slot: u16::from_le_bytes([bytes[at + 4], bytes[at + 5]]),
            });
        }
        Ok(Self { key, rows })
    }
}

/// An internal (non-leaf) entry: the child page and its key interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalEntry {
    pub low: i64,
    pub high: i64,
    pub child: BlockNumber,
}

impl InternalEntry {
    /// Byte length of every internal item.
    pub const LEN: usize = 20;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.extend_from_slice(&self.low.to_le_bytes());
        buf.extend_from_slice(&self.high.to_le_bytes());
        buf.extend_from_slice(&self.child.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> AmResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(AmError::corrupt_entry(format!(
                "internal item length {} (expected {})",
                bytes.len(),
                Self::LEN
            )));
        }
        Ok(Self {
            low: i64::from_le_bytes(bytes[0..8].try_into().expect("sized slice")),
            high: i64::from_le_bytes(bytes[8..16].try_into().expect("sized slice")),
            child: u32::from_le_bytes(bytes[16..20].try_into().expect("sized slice")),
        })
    }

    /// True if `key` falls inside this child's interval.
    pub fn contains(&self, key: i64) -> bool {
        self.low <= key && key <= self.high
    }

    /// Widens the interval to cover `key`.
    pub fn widen(&mut self, key: i64) {
        self.low = self.low.min(key);
        self.high = self.high.max(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_entry_round_trip() {
        let entry = IndexEntry {
            key: -42,
            rows: vec![RowPointer::new(3, 1), RowPointer::new(9, 7)],
        };
        assert_eq!(IndexEntry::decode(&entry.encode()).unwrap(), entry);
    }

    #[test]
    fn test_leaf_entry_rejects_length_mismatch() {
        let mut bytes = IndexEntry::single(1, RowPointer::new(1, 1)).encode();
        bytes.pop();
        assert!(IndexEntry::decode(&bytes).is_err());
    }

    #[test]
    fn test_internal_entry_round_trip() {
        let entry = InternalEntry {
            low: -5,
            high: 100,
            child: 8,
        };
        assert_eq!(InternalEntry::decode(&entry.encode()).unwrap(), entry);
    }

    #[test]
    fn test_interval_contains_and_widen() {
        let mut entry = InternalEntry {
            low: 0,
            high: 10,
            child: 2,
        };
        assert!(entry.contains(0) && entry.contains(10));
        assert!(!entry.contains(11));
        entry.widen(15);
        assert!(entry.contains(11));
        assert_eq!(entry.low, 0);
    }
}
