//! Dump-log command implementation.

use super::{emit, read_log, Format};
use crate::error::CliResult;
use serde::Serialize;
use shelfdb_core::log::{scan_log, LogEntry, LogRecord};
use std::path::Path;

/// Information about one commit log record.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Byte offset of the record.
    pub offset: u64,
    /// Framed size in bytes.
    pub len: u64,
    /// Record type.
    #[serde(rename = "type")]
    pub record_type: &'static str,
    /// Database the record belongs to.
    pub database: String,
    /// Operation names in execution order.
    pub ops: Vec<&'static str>,
}

impl From<&LogEntry> for RecordInfo {
    fn from(entry: &LogEntry) -> Self {
        let (record_type, ops) = match &entry.record {
            LogRecord::Commit { ops, .. } => ("COMMIT", ops.iter().map(|op| op.name()).collect()),
            LogRecord::DeleteDatabase { .. } => ("DELETE_DATABASE", Vec::new()),
        };
        Self {
            offset: entry.offset,
            len: entry.len,
            record_type,
            database: entry.record.database().to_string(),
            ops,
        }
    }
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, offset: u64, format: &str) -> CliResult<()> {
    let format = Format::parse(format)?;
    let records = collect(&read_log(path)?, limit, offset)?;
    emit(&records, format, |records| print_text(path, records))
}

pub(crate) fn collect(bytes: &[u8], limit: Option<usize>, offset: u64) -> CliResult<Vec<RecordInfo>> {
    let scan = scan_log(bytes)?;
    Ok(scan
        .entries
        .iter()
        .filter(|entry| entry.offset >= offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(RecordInfo::from)
        .collect())
}

fn print_text(path: &Path, records: &[RecordInfo]) {
    println!("Commit log: {}", path.display());
    println!();
    println!("{:<10} {:<8} {:<16} {:<16} OPS", "OFFSET", "LEN", "TYPE", "DATABASE");
    println!("{}", "-".repeat(72));
    for record in records {
        println!(
            "{:<10} {:<8} {:<16} {:<16} {}",
            record.offset,
            record.len,
            record.record_type,
            record.database,
            record.ops.join(",")
        );
    }
    println!();
    println!("{} records", records.len());
}
