//! Index handle.

use crate::cursor::{Cursor, CursorSource};
use crate::error::CoreResult;
use crate::index::data::IndexData;
use crate::key::{Key, KeyPath};
use crate::range::{bounds_of, KeyRange};
use crate::store::{ObjectStore, StoreData};
use crate::transaction::Transaction;
use crate::types::Direction;
use shelfdb_codec::Value;

/// A named index on an object store, seen through one transaction.
///
/// Lookups go by index key; results come back ordered by index key and
/// then by primary key.
#[derive(Debug, Clone)]
pub struct Index<'t> {
    txn: &'t Transaction,
    store: String,
    name: String,
}

impl<'t> Index<'t> {
    pub(crate) fn new(txn: &'t Transaction, store: &str, name: &str) -> Self {
        Self {
            txn,
            store: store.to_string(),
            name: name.to_string(),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&StoreData, &IndexData) -> CoreResult<R>) -> CoreResult<R> {
        self.txn.read_store(&self.store, |store| {
            let index = store.index(&self.name)?;
            f(store, index)
        })
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The indexed store.
    #[must_use]
    pub fn object_store(&self) -> ObjectStore<'t> {
        ObjectStore::new(self.txn, &self.store)
    }

    /// Path the index key is read from.
    pub fn key_path(&self) -> CoreResult<KeyPath> {
        self.read(|_, index| Ok(index.meta.key_path.clone()))
    }

    /// Whether the index rejects duplicate keys.
    pub fn unique(&self) -> CoreResult<bool> {
        self.read(|_, index| Ok(index.meta.unique))
    }

    /// Whether array values produce one entry per element.
    pub fn multi_entry(&self) -> CoreResult<bool> {
        self.read(|_, index| Ok(index.meta.multi_entry))
    }

    /// First record whose index key is in `range` (lowest primary key
    /// among equal index keys).
    pub fn get(&self, range: impl Into<KeyRange>) -> CoreResult<Option<Value>> {
        let range = range.into();
        self.read(|store, index| {
            let (lo, hi) = range.bounds();
            Ok(index
                .range(lo, hi)
                .next()
                .and_then(|(_, pk)| store.get(pk).cloned()))
        })
    }

    /// Primary key of the record [`Index::get`] would return.
    pub fn get_key(&self, range: impl Into<KeyRange>) -> CoreResult<Option<Key>> {
        let range = range.into();
        self.read(|_, index| {
            let (lo, hi) = range.bounds();
            Ok(index.range(lo, hi).next().map(|(_, pk)| pk.clone()))
        })
    }

    /// Every record with an index key in `range`.
    pub fn get_all(&self, range: Option<KeyRange>) -> CoreResult<Vec<Value>> {
        self.read(|store, index| {
            let (lo, hi) = bounds_of(range.as_ref());
            Ok(index
                .range(lo, hi)
                .filter_map(|(_, pk)| store.get(pk).cloned())
                .collect())
        })
    }

    /// Primary keys of every record with an index key in `range`.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> CoreResult<Vec<Key>> {
        self.read(|_, index| {
            let (lo, hi) = bounds_of(range.as_ref());
            Ok(index.range(lo, hi).map(|(_, pk)| pk.clone()).collect())
        })
    }

    /// Number of index entries in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> CoreResult<u64> {
        self.read(|_, index| {
            let (lo, hi) = bounds_of(range.as_ref());
            Ok(index.range(lo, hi).count() as u64)
        })
    }

    /// Opens a cursor over index entries in `range`.
    pub fn open_cursor(&self, range: Option<KeyRange>, direction: Direction) -> CoreResult<Cursor<'t>> {
        Cursor::open(
            self.txn,
            CursorSource::Index {
                store: self.store.clone(),
                index: self.name.clone(),
            },
            range,
            direction,
        )
    }
}
