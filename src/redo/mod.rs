//! Binary redo-record codec and redo log
//!
//! Every structural mutation of the tree produces one redo record. Records
//! are self-describing: the kind tag plus embedded counts fully determine how
//! to parse the trailing payload, so replay never needs look-ahead and a
//! diagnostic tool can print any record in isolation.
//!
//! The on-disk byte layout is the serialization contract, independent of the
//! in-memory representation: fixed fields in declared order, then explicit
//! array-length counts, then arrays in declared order; little-endian
//! fixed-width integers; no padding; no sentinel terminators.
//!
//! Log framing (`writer`/`reader`) wraps each record in
//! `len (u32 LE) | body | crc32 (u32 LE)`, with the checksum computed over
//! the length field and the body.

mod apply;
mod checksum;
mod describe;
mod errors;
mod reader;
mod record;
mod writer;

pub use apply::{
    apply, decode_root_payload, decode_split_payload, encode_dedup_payload, encode_root_payload,
    encode_split_payload,
};
pub use checksum::{compute_checksum, verify_checksum};
pub use describe::{describe, describe_relations};
pub use errors::{RedoError, RedoResult};
pub use reader::RedoLogReader;
pub use record::{
    FullTransactionId, InsertTarget, LogEntry, PostingUpdate, RecordKind, RedoRecord,
    RelationLocator, SplitSide,
};
pub use writer::{RedoLogWriter, RedoSink, VecSink};
