//! Redo log reader
//!
//! Sequential, checksum-verified frame reads. Recovery treats any framing
//! damage as "cannot proceed"; diagnostic tooling reads raw frames so it can
//! report a record-level decode failure and keep going.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::checksum::verify_checksum;
use super::errors::{RedoError, RedoResult};
use super::record::LogEntry;

/// Smallest possible frame: length field, empty body, checksum.
const MIN_FRAME: u64 = 8;

/// Sequential reader over a redo log file.
pub struct RedoLogReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    file_size: u64,
}

impl RedoLogReader {
    /// Opens a redo log for sequential reading from byte 0.
    pub fn open(path: &Path) -> RedoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            offset: 0,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next frame.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next checksum-verified frame body, without decoding it.
    ///
    /// Returns the frame's starting offset with the body. A truncated frame
    /// or a checksum mismatch is `CorruptLog`; clean end-of-file is `None`.
    pub fn next_frame(&mut self) -> RedoResult<Option<(u64, Vec<u8>)>> {
        if self.offset >= self.file_size {
            return Ok(None);
        }
        let start = self.offset;
        let remaining = self.file_size - self.offset;
        if remaining < MIN_FRAME {
            return Err(RedoError::corrupt_log(
                start,
                format!("torn frame: {} trailing bytes", remaining),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;
        let frame_len = u32::from_le_bytes(len_buf) as u64;
        if frame_len < MIN_FRAME || frame_len > remaining {
            return Err(RedoError::corrupt_log(
                start,
                format!(
                    "invalid frame length {} ({} bytes remain)",
                    frame_len, remaining
                ),
            ));
        }

        let body_len = (frame_len - MIN_FRAME) as usize;
        let mut body = vec![0u8; body_len];
        self.reader.read_exact(&mut body)?;

        let mut crc_buf = [0u8; 4];
        self.reader.read_exact(&mut crc_buf)?;
        let stored_crc = u32::from_le_bytes(crc_buf);

        let mut checksummed = Vec::with_capacity(4 + body_len);
        checksummed.extend_from_slice(&len_buf);
        checksummed.extend_from_slice(&body);
        if !verify_checksum(&checksummed, stored_crc) {
            return Err(RedoError::corrupt_log(start, "checksum mismatch"));
        }

        self.offset += frame_len;
        Ok(Some((start, body)))
    }

    /// Reads and decodes the next log entry.
    pub fn read_next(&mut self) -> RedoResult<Option<LogEntry>> {
        match self.next_frame()? {
            None => Ok(None),
            Some((_, body)) => Ok(Some(LogEntry::decode_body(&body)?)),
        }
    }
}
