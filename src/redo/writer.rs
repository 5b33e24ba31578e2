//! Redo log writer
//!
//! Append-only, single file, fsync after every append. Frame layout:
//! `len (u32 LE) | body | crc32 (u32 LE)` where `len` counts the whole frame
//! including itself and the checksum, and the checksum covers the length
//! field plus the body.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::page::{BlockNumber, RelationId};

use super::checksum::compute_checksum;
use super::errors::RedoResult;
use super::reader::RedoLogReader;
use super::record::{LogEntry, RedoRecord};

/// Destination for redo records emitted by structural writers.
///
/// `append` assigns and returns the entry's sequence number, which the caller
/// stamps onto every page the mutation touched.
pub trait RedoSink {
    fn append(
        &mut self,
        relation: RelationId,
        block: BlockNumber,
        aux_block: BlockNumber,
        record: RedoRecord,
        payload: Vec<u8>,
    ) -> RedoResult<u64>;
}

/// File-backed redo log writer.
pub struct RedoLogWriter {
    path: PathBuf,
    file: File,
    /// Next sequence number to assign (starts at 1, never reused)
    next_seq: u64,
}

impl RedoLogWriter {
    /// Opens or creates the redo log, scanning any existing tail to resume
    /// the sequence counter.
    pub fn open(path: &Path) -> RedoResult<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let next_seq = Self::determine_next_seq(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_seq,
        })
    }

    fn determine_next_seq(path: &Path) -> RedoResult<u64> {
        let metadata = fs::metadata(path)?;
        if metadata.len() == 0 {
            return Ok(1);
        }
        let mut reader = RedoLogReader::open(path)?;
        let mut max_seq = 0u64;
        while let Some(entry) = reader.read_next()? {
            max_seq = max_seq.max(entry.seq);
        }
        Ok(max_seq + 1)
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number the next append will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

impl RedoSink for RedoLogWriter {
    fn append(
        &mut self,
        relation: RelationId,
        block: BlockNumber,
        aux_block: BlockNumber,
        record: RedoRecord,
        payload: Vec<u8>,
    ) -> RedoResult<u64> {
        let seq = self.next_seq;
        let entry = LogEntry {
            seq,
            relation,
            block,
            aux_block,
            record,
            payload,
        };
        let body = entry.encode_body();
        let frame_len = (4 + body.len() + 4) as u32;

        let mut checksummed = Vec::with_capacity(4 + body.len());
        checksummed.extend_from_slice(&frame_len.to_le_bytes());
        checksummed.extend_from_slice(&body);
        let crc = compute_checksum(&checksummed);

        let mut frame = checksummed;
        frame.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&frame)?;
        self.file.sync_data()?;
        self.next_seq += 1;
        Ok(seq)
    }
}

/// In-memory sink collecting entries; used by tests and by mutations that
/// run against a throwaway context.
#[derive(Debug, Default)]
pub struct VecSink {
    pub entries: Vec<LogEntry>,
    next_seq: u64,
}

impl VecSink {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 1,
        }
    }
}

impl RedoSink for VecSink {
    fn append(
        &mut self,
        relation: RelationId,
        block: BlockNumber,
        aux_block: BlockNumber,
        record: RedoRecord,
        payload: Vec<u8>,
    ) -> RedoResult<u64> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(LogEntry {
            seq,
            relation,
            block,
            aux_block,
            record,
            payload,
        });
        Ok(seq)
    }
}
