//! Object store handle.

use crate::cursor::{Cursor, CursorSource};
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, IndexMeta, IndexParams};
use crate::key::{Key, KeyPath};
use crate::log::LogOp;
use crate::range::{bounds_of, KeyRange};
use crate::transaction::Transaction;
use crate::types::Direction;
use shelfdb_codec::Value;
use tracing::debug;

/// A named object store, seen through one transaction.
///
/// Handles are cheap; every call goes back to the transaction, which
/// checks that it is still active and that the store is in scope.
///
/// ```
/// use shelfdb_core::{Engine, KeyRange, StoreParams, TransactionMode, Value};
///
/// let engine = Engine::open_in_memory();
/// let db = engine
///     .open("library", 1, |txn, _old, _new| {
///         txn.create_object_store("books", StoreParams::new().auto_increment(true))?;
///         Ok(())
///     })
///     .unwrap();
///
/// db.run(["books"], TransactionMode::ReadWrite, |txn| {
///     let books = txn.object_store("books")?;
///     books.add(Value::object([("title", Value::from("Dune"))]))?;
///     books.add(Value::object([("title", Value::from("Emma"))]))?;
///     assert_eq!(books.count(None)?, 2);
///     Ok(())
/// })
/// .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStore<'t> {
    txn: &'t Transaction,
    name: String,
}

impl<'t> ObjectStore<'t> {
    pub(crate) fn new(txn: &'t Transaction, name: &str) -> Self {
        Self {
            txn,
            name: name.to_string(),
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> &'t Transaction {
        self.txn
    }

    /// In-line key path, if the store has one.
    pub fn key_path(&self) -> CoreResult<Option<KeyPath>> {
        self.txn
            .read_store(&self.name, |s| Ok(s.meta.key_path.clone()))
    }

    /// Whether the store has a key generator.
    pub fn auto_increment(&self) -> CoreResult<bool> {
        self.txn.read_store(&self.name, |s| Ok(s.meta.auto_increment))
    }

    /// Names of the store's indexes, sorted.
    pub fn index_names(&self) -> CoreResult<Vec<String>> {
        self.txn.read_store(&self.name, |s| Ok(s.index_names()))
    }

    /// Inserts a record. The key comes from the key path or the generator.
    ///
    /// # Errors
    ///
    /// `Constraint` if a record with the key exists or a unique index
    /// rejects the value; `Data` if no key can be derived. Both abort the
    /// transaction.
    pub fn add(&self, value: Value) -> CoreResult<Key> {
        self.store_record(value, None, false)
    }

    /// Inserts a record under an explicit (out-of-line) key.
    pub fn add_with_key(&self, value: Value, key: impl Into<Key>) -> CoreResult<Key> {
        self.store_record(value, Some(key.into()), false)
    }

    /// Inserts or replaces a record.
    pub fn put(&self, value: Value) -> CoreResult<Key> {
        self.store_record(value, None, true)
    }

    /// Inserts or replaces a record under an explicit (out-of-line) key.
    pub fn put_with_key(&self, value: Value, key: impl Into<Key>) -> CoreResult<Key> {
        self.store_record(value, Some(key.into()), true)
    }

    fn store_record(&self, mut value: Value, explicit: Option<Key>, overwrite: bool) -> CoreResult<Key> {
        self.txn.write_store(&self.name, |store, journal| {
            let before = store.generator();
            let derived = store.derive_key(&mut value, explicit);
            journal.generator(store, before);
            let key = derived?;

            if !overwrite && store.contains(&key) {
                return Err(CoreError::constraint(format!(
                    "key {key} already exists in store '{}'",
                    store.meta.name
                )));
            }
            let previous = store.write(&key, Some(value.clone()))?;
            journal.record(&store.meta.name, key.clone(), previous, Some(value));
            Ok(key)
        })
    }

    /// Replaces the record at `key`, which must already be its key.
    ///
    /// For stores with a key path the new value must carry the same key.
    pub(crate) fn replace(&self, key: &Key, value: Value) -> CoreResult<()> {
        self.txn.write_store(&self.name, |store, journal| {
            if let Some(path) = &store.meta.key_path {
                match path.extract(&value)? {
                    Some(k) if &k == key => {}
                    _ => {
                        return Err(CoreError::data(format!(
                            "updated value must keep key {key} at path '{path}'"
                        )))
                    }
                }
            }
            let previous = store.write(key, Some(value.clone()))?;
            journal.record(&store.meta.name, key.clone(), previous, Some(value));
            Ok(())
        })
    }

    /// Record with the lowest key in `range` (or exactly `key`).
    pub fn get(&self, range: impl Into<KeyRange>) -> CoreResult<Option<Value>> {
        let range = range.into();
        self.txn.read_store(&self.name, |s| {
            let (lo, hi) = range.bounds();
            Ok(s.range(lo, hi).next().map(|(_, v)| v.clone()))
        })
    }

    /// Lowest key in `range`.
    pub fn get_key(&self, range: impl Into<KeyRange>) -> CoreResult<Option<Key>> {
        let range = range.into();
        self.txn.read_store(&self.name, |s| {
            let (lo, hi) = range.bounds();
            Ok(s.range(lo, hi).next().map(|(k, _)| k.clone()))
        })
    }

    /// Every record in `range`, ascending by key.
    pub fn get_all(&self, range: Option<KeyRange>) -> CoreResult<Vec<Value>> {
        self.get_all_limited(range, None)
    }

    /// At most `limit` records in `range`, ascending by key.
    pub fn get_all_limited(&self, range: Option<KeyRange>, limit: Option<usize>) -> CoreResult<Vec<Value>> {
        self.txn.read_store(&self.name, |s| {
            let (lo, hi) = bounds_of(range.as_ref());
            Ok(s.range(lo, hi)
                .take(limit.unwrap_or(usize::MAX))
                .map(|(_, v)| v.clone())
                .collect())
        })
    }

    /// Every key in `range`, ascending.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> CoreResult<Vec<Key>> {
        self.txn.read_store(&self.name, |s| {
            let (lo, hi) = bounds_of(range.as_ref());
            Ok(s.range(lo, hi).map(|(k, _)| k.clone()).collect())
        })
    }

    /// Number of records in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> CoreResult<u64> {
        self.txn.read_store(&self.name, |s| {
            let n = match &range {
                None => s.len(),
                Some(r) => {
                    let (lo, hi) = r.bounds();
                    s.range(lo, hi).count()
                }
            };
            Ok(n as u64)
        })
    }

    /// Removes the record at `key`, if any.
    pub fn delete(&self, key: impl Into<Key>) -> CoreResult<()> {
        self.delete_range(KeyRange::only(key))
    }

    /// Removes every record in `range`.
    pub fn delete_range(&self, range: KeyRange) -> CoreResult<()> {
        self.txn.write_store(&self.name, |store, journal| {
            let (lo, hi) = range.bounds();
            let keys: Vec<Key> = store.range(lo, hi).map(|(k, _)| k.clone()).collect();
            for key in keys {
                let previous = store.write(&key, None)?;
                journal.record(&store.meta.name, key, previous, None);
            }
            Ok(())
        })
    }

    /// Removes every record.
    pub fn clear(&self) -> CoreResult<()> {
        self.txn.write_store(&self.name, |store, journal| {
            let records = store.clear();
            journal.cleared(&store.meta.name, records);
            Ok(())
        })
    }

    /// Creates an index and fills it from the existing records.
    /// Version-change transactions only.
    ///
    /// # Errors
    ///
    /// `Constraint` if the name is taken or a unique index would hold a
    /// duplicate key (aborting the transaction).
    pub fn create_index(
        &self,
        name: &str,
        key_path: impl Into<KeyPath>,
        params: IndexParams,
    ) -> CoreResult<Index<'t>> {
        let meta = IndexMeta {
            name: name.to_string(),
            key_path: key_path.into(),
            unique: params.unique,
            multi_entry: params.multi_entry,
        };
        self.txn.write_schema(|state, journal| {
            let store = state.store_mut(&self.name)?;
            journal.schema(LogOp::CreateIndex {
                store: self.name.clone(),
                name: meta.name.clone(),
                key_path: meta.key_path.clone(),
                unique: meta.unique,
                multi_entry: meta.multi_entry,
            });
            store.create_index(meta)
        })?;
        debug!(store = %self.name, index = name, "index created");
        Ok(Index::new(self.txn, &self.name, name))
    }

    /// Deletes an index. Version-change transactions only.
    pub fn delete_index(&self, name: &str) -> CoreResult<()> {
        self.txn.write_schema(|state, journal| {
            state.store_mut(&self.name)?.delete_index(name)?;
            journal.schema(LogOp::DeleteIndex {
                store: self.name.clone(),
                name: name.to_string(),
            });
            Ok(())
        })
    }

    /// Opens a handle to an existing index.
    pub fn index(&self, name: &str) -> CoreResult<Index<'t>> {
        self.txn
            .read_store(&self.name, |s| s.index(name).map(|_| ()))?;
        Ok(Index::new(self.txn, &self.name, name))
    }

    /// Opens a cursor over the records in `range`.
    pub fn open_cursor(&self, range: Option<KeyRange>, direction: Direction) -> CoreResult<Cursor<'t>> {
        Cursor::open(
            self.txn,
            CursorSource::Store {
                store: self.name.clone(),
            },
            range,
            direction,
        )
    }
}
