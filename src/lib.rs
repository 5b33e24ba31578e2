//! arbordb - a strict, deterministic index access-method core
//!
//! The crate implements the scan-consistency and crash-recovery core of a
//! tree-structured index: the generic scan protocol, the adjustment broadcast
//! that repairs live cursors after a concurrent structural mutation, and the
//! self-describing binary redo-record format that makes every structural
//! mutation replayable after a crash.

pub mod am;
pub mod cli;
pub mod context;
pub mod lock;
pub mod observability;
pub mod page;
pub mod recovery;
pub mod redo;
pub mod scan;
pub mod skip;
pub mod verify;
