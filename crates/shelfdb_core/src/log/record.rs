//! Commit log records and their framing.

use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyPath};
use shelfdb_codec::{from_cbor, to_canonical_cbor, Value};

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"SHLF";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A committed transaction.
    Commit = 1,
    /// A database removed by `Engine::delete_database`.
    DeleteDatabase = 2,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::DeleteDatabase),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One logical change inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp {
    /// Database version set by a version-change transaction.
    SetVersion {
        /// New version.
        version: u64,
    },
    /// Object store created.
    CreateStore {
        /// Store name.
        name: String,
        /// In-line key path.
        key_path: Option<KeyPath>,
        /// Whether the store has a key generator.
        auto_increment: bool,
    },
    /// Object store deleted.
    DeleteStore {
        /// Store name.
        name: String,
    },
    /// Index created (and backfilled on replay).
    CreateIndex {
        /// Parent store.
        store: String,
        /// Index name.
        name: String,
        /// Path the index key is read from.
        key_path: KeyPath,
        /// Unique flag.
        unique: bool,
        /// Multi-entry flag.
        multi_entry: bool,
    },
    /// Index deleted.
    DeleteIndex {
        /// Parent store.
        store: String,
        /// Index name.
        name: String,
    },
    /// Record stored.
    Put {
        /// Store name.
        store: String,
        /// Primary key.
        key: Key,
        /// Record value, with any generated key already injected.
        value: Value,
    },
    /// Record removed.
    Delete {
        /// Store name.
        store: String,
        /// Primary key.
        key: Key,
    },
    /// All records of a store removed.
    Clear {
        /// Store name.
        store: String,
    },
    /// Key generator moved.
    Generator {
        /// Store name.
        store: String,
        /// Next key to hand out; `None` once exhausted.
        next: Option<i64>,
    },
}

/// A framed unit of the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Every change of one committed transaction, in order.
    Commit {
        /// Database the transaction ran against.
        database: String,
        /// Changes in execution order.
        ops: Vec<LogOp>,
    },
    /// Database deleted.
    DeleteDatabase {
        /// Database name.
        database: String,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Commit { .. } => LogRecordType::Commit,
            Self::DeleteDatabase { .. } => LogRecordType::DeleteDatabase,
        }
    }

    /// Name of the database the record applies to.
    #[must_use]
    pub fn database(&self) -> &str {
        match self {
            Self::Commit { database, .. } | Self::DeleteDatabase { database } => database,
        }
    }

    /// Serializes the record payload (canonical CBOR, without envelope).
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let value = match self {
            Self::Commit { database, ops } => Value::object([
                ("database", Value::from(database.as_str())),
                ("ops", Value::Array(ops.iter().map(LogOp::to_value).collect())),
            ]),
            Self::DeleteDatabase { database } => {
                Value::object([("database", Value::from(database.as_str()))])
            }
        };
        Ok(to_canonical_cbor(&value)?)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// `offset` only labels errors.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8], offset: u64) -> CoreResult<Self> {
        let value = from_cbor(payload)
            .map_err(|e| CoreError::log_corruption(offset, format!("bad payload: {e}")))?;
        let fields = Fields { value: &value, offset };
        let database = fields.text("database")?;
        match record_type {
            LogRecordType::Commit => {
                let ops = fields
                    .array("ops")?
                    .iter()
                    .map(|op| LogOp::from_value(op, offset))
                    .collect::<CoreResult<Vec<_>>>()?;
                Ok(Self::Commit { database, ops })
            }
            LogRecordType::DeleteDatabase => Ok(Self::DeleteDatabase { database }),
        }
    }

    /// Wraps the record in its envelope.
    ///
    /// ```text
    /// | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
    /// ```
    pub fn frame(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::data("commit record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        // covers everything before it
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

impl LogOp {
    /// Short name of the operation, as used in the payload.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetVersion { .. } => "set_version",
            Self::CreateStore { .. } => "create_store",
            Self::DeleteStore { .. } => "delete_store",
            Self::CreateIndex { .. } => "create_index",
            Self::DeleteIndex { .. } => "delete_index",
            Self::Put { .. } => "put",
            Self::Delete { .. } => "delete",
            Self::Clear { .. } => "clear",
            Self::Generator { .. } => "generator",
        }
    }

    fn to_value(&self) -> Value {
        let op = ("op", Value::from(self.name()));
        match self {
            Self::SetVersion { version } => Value::object([
                op,
                ("version", Value::Integer(i64::try_from(*version).unwrap_or(i64::MAX))),
            ]),
            Self::CreateStore {
                name,
                key_path,
                auto_increment,
            } => Value::object([
                op,
                ("name", Value::from(name.as_str())),
                ("key_path", key_path.as_ref().map_or(Value::Null, KeyPath::to_value)),
                ("auto_increment", Value::Bool(*auto_increment)),
            ]),
            Self::DeleteStore { name } => Value::object([op, ("name", Value::from(name.as_str()))]),
            Self::CreateIndex {
                store,
                name,
                key_path,
                unique,
                multi_entry,
            } => Value::object([
                op,
                ("store", Value::from(store.as_str())),
                ("name", Value::from(name.as_str())),
                ("key_path", key_path.to_value()),
                ("unique", Value::Bool(*unique)),
                ("multi_entry", Value::Bool(*multi_entry)),
            ]),
            Self::DeleteIndex { store, name } => Value::object([
                op,
                ("store", Value::from(store.as_str())),
                ("name", Value::from(name.as_str())),
            ]),
            Self::Put { store, key, value } => Value::object([
                op,
                ("store", Value::from(store.as_str())),
                ("key", key.to_value()),
                ("value", value.clone()),
            ]),
            Self::Delete { store, key } => Value::object([
                op,
                ("store", Value::from(store.as_str())),
                ("key", key.to_value()),
            ]),
            Self::Clear { store } => Value::object([op, ("store", Value::from(store.as_str()))]),
            Self::Generator { store, next } => Value::object([
                op,
                ("store", Value::from(store.as_str())),
                ("next", Value::from(*next)),
            ]),
        }
    }

    fn from_value(value: &Value, offset: u64) -> CoreResult<Self> {
        let f = Fields { value, offset };
        let op = f.text("op")?;
        let op = match op.as_str() {
            "set_version" => Self::SetVersion {
                version: u64::try_from(f.integer("version")?)
                    .map_err(|_| f.corrupt("negative version"))?,
            },
            "create_store" => Self::CreateStore {
                name: f.text("name")?,
                key_path: match f.get("key_path")? {
                    Value::Null => None,
                    path => Some(f.key_path(path)?),
                },
                auto_increment: f.boolean("auto_increment")?,
            },
            "delete_store" => Self::DeleteStore { name: f.text("name")? },
            "create_index" => Self::CreateIndex {
                store: f.text("store")?,
                name: f.text("name")?,
                key_path: f.key_path(f.get("key_path")?)?,
                unique: f.boolean("unique")?,
                multi_entry: f.boolean("multi_entry")?,
            },
            "delete_index" => Self::DeleteIndex {
                store: f.text("store")?,
                name: f.text("name")?,
            },
            "put" => Self::Put {
                store: f.text("store")?,
                key: f.key("key")?,
                value: f.get("value")?.clone(),
            },
            "delete" => Self::Delete {
                store: f.text("store")?,
                key: f.key("key")?,
            },
            "clear" => Self::Clear { store: f.text("store")? },
            "generator" => Self::Generator {
                store: f.text("store")?,
                next: match f.get("next")? {
                    Value::Null => None,
                    _ => Some(f.integer("next")?),
                },
            },
            other => return Err(f.corrupt(format!("unknown operation '{other}'"))),
        };
        Ok(op)
    }
}

/// Typed field access over a decoded payload map.
struct Fields<'a> {
    value: &'a Value,
    offset: u64,
}

impl<'a> Fields<'a> {
    fn corrupt(&self, message: impl Into<String>) -> CoreError {
        CoreError::log_corruption(self.offset, message)
    }

    fn get(&self, name: &str) -> CoreResult<&'a Value> {
        self.value
            .field(name)
            .ok_or_else(|| self.corrupt(format!("missing field '{name}'")))
    }

    fn text(&self, name: &str) -> CoreResult<String> {
        self.get(name)?
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| self.corrupt(format!("field '{name}' is not text")))
    }

    fn integer(&self, name: &str) -> CoreResult<i64> {
        self.get(name)?
            .as_integer()
            .ok_or_else(|| self.corrupt(format!("field '{name}' is not an integer")))
    }

    fn boolean(&self, name: &str) -> CoreResult<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| self.corrupt(format!("field '{name}' is not a bool")))
    }

    fn array(&self, name: &str) -> CoreResult<&'a [Value]> {
        self.get(name)?
            .as_array()
            .ok_or_else(|| self.corrupt(format!("field '{name}' is not an array")))
    }

    fn key(&self, name: &str) -> CoreResult<Key> {
        Key::from_value(self.get(name)?).map_err(|e| self.corrupt(e.to_string()))
    }

    fn key_path(&self, value: &Value) -> CoreResult<KeyPath> {
        KeyPath::from_value(value).map_err(|e| self.corrupt(e.to_string()))
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    }) ^ 0xFFFF_FFFF
}
