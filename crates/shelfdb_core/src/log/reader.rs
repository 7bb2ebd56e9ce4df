//! Commit log scanning.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};

/// A decoded record and where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Byte offset of the record envelope.
    pub offset: u64,
    /// Framed size in bytes.
    pub len: u64,
    /// The record.
    pub record: LogRecord,
}

/// Result of scanning a commit log.
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    /// Every complete, valid record in log order.
    pub entries: Vec<LogEntry>,
    /// Bytes covered by `entries`.
    pub valid_len: u64,
    /// Total bytes in the log, including any torn tail.
    pub total_len: u64,
}

impl LogScan {
    /// Whether the log ends in an incomplete record.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.total_len
    }
}

/// Parses every record in `bytes`.
///
/// An incomplete trailing record (short header or short payload) ends the
/// scan without error. A complete record with bad magic, an unsupported
/// version, an unknown type or a checksum mismatch is fatal.
pub fn scan_log(bytes: &[u8]) -> CoreResult<LogScan> {
    let total = bytes.len();
    let mut pos = 0usize;
    let mut entries = Vec::new();

    while pos < total {
        let offset = pos as u64;
        let Some(header) = bytes.get(pos..pos + HEADER_SIZE) else {
            break;
        };

        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(offset, "invalid magic bytes"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != LOG_VERSION {
            return Err(CoreError::log_corruption(
                offset,
                format!("unsupported format version {version}"),
            ));
        }
        let record_type = LogRecordType::from_byte(header[6]).ok_or_else(|| {
            CoreError::log_corruption(offset, format!("unknown record type {}", header[6]))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let end = pos + HEADER_SIZE + len + CRC_SIZE;
        if end > total {
            break;
        }

        let body = &bytes[pos..pos + HEADER_SIZE + len];
        let stored = u32::from_le_bytes([
            bytes[end - 4],
            bytes[end - 3],
            bytes[end - 2],
            bytes[end - 1],
        ]);
        let computed = compute_crc32(body);
        if stored != computed {
            return Err(CoreError::log_corruption(
                offset,
                format!("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }

        let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..], offset)?;
        entries.push(LogEntry {
            offset,
            len: (end - pos) as u64,
            record,
        });
        pos = end;
    }

    Ok(LogScan {
        entries,
        valid_len: pos as u64,
        total_len: total as u64,
    })
}
