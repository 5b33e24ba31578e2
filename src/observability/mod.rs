//! Observability for the access-method core
//!
//! Structured JSON logs only. One log line = one event; synchronous, no
//! buffering, deterministic key ordering.

mod logger;

pub use logger::{Logger, Severity};
