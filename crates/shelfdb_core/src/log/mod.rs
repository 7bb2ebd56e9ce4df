//! Commit log for durability and restart.
//!
//! Every committed transaction that changed something becomes one framed
//! record; deleting a database writes one more. Opening an engine replays
//! the log front to back.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is canonical CBOR of the record's logical operations.
//!
//! ## Recovery Policy
//!
//! - A trailing record with a short header or short payload is the trace
//!   of a crash mid-append. It is truncated and recovery continues with the
//!   records before it.
//! - A complete record with bad magic, an unknown type or version, or a
//!   checksum mismatch is corruption and the open fails.

mod reader;
mod record;
mod writer;

pub use reader::{scan_log, LogEntry, LogScan};
pub use record::{compute_crc32, LogOp, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub(crate) use writer::CommitLog;
