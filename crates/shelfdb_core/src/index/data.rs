//! Index entry storage.

use crate::error::{CoreError, CoreResult};
use crate::key::{Key, KeyPath};
use crate::range::is_empty_interval;
use shelfdb_codec::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Options for [`crate::ObjectStore::create_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexParams {
    /// Reject two records that produce the same index key.
    pub unique: bool,
    /// Index each element of an array-valued key path separately.
    pub multi_entry: bool,
}

impl IndexParams {
    /// Non-unique, single-entry index.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            unique: false,
            multi_entry: false,
        }
    }

    /// Sets the unique flag.
    #[must_use]
    pub const fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets the multi-entry flag.
    #[must_use]
    pub const fn multi_entry(mut self, multi_entry: bool) -> Self {
        self.multi_entry = multi_entry;
        self
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexMeta {
    pub(crate) name: String,
    pub(crate) key_path: KeyPath,
    pub(crate) unique: bool,
    pub(crate) multi_entry: bool,
}

/// Ordered mapping from derived key to the primary keys that produce it.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    pub(crate) meta: IndexMeta,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexData {
    pub(crate) fn new(meta: IndexMeta) -> Self {
        Self {
            meta,
            entries: BTreeMap::new(),
        }
    }

    /// Index keys a record contributes.
    ///
    /// Missing fields and values that are not valid keys contribute
    /// nothing. A multi-entry index over an array contributes each valid
    /// element once.
    pub(crate) fn keys_for(&self, value: &Value) -> Vec<Key> {
        let Some(derived) = self.meta.key_path.evaluate(value) else {
            return Vec::new();
        };
        match (&derived, self.meta.multi_entry) {
            (Value::Array(items), true) => {
                let set: BTreeSet<Key> = items
                    .iter()
                    .filter_map(|item| Key::from_value(item).ok())
                    .collect();
                set.into_iter().collect()
            }
            _ => Key::from_value(&derived).map(|k| vec![k]).unwrap_or_default(),
        }
    }

    /// Fails if a unique index already maps any of `keys` to a record
    /// other than `primary`.
    pub(crate) fn check_unique(&self, keys: &[Key], primary: &Key) -> CoreResult<()> {
        if !self.meta.unique {
            return Ok(());
        }
        for key in keys {
            if let Some(owners) = self.entries.get(key) {
                if owners.iter().any(|pk| pk != primary) {
                    return Err(CoreError::constraint(format!(
                        "unique index '{}' already contains key {key}",
                        self.meta.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, keys: Vec<Key>, primary: &Key) {
        for key in keys {
            self.entries.entry(key).or_default().insert(primary.clone());
        }
    }

    pub(crate) fn remove(&mut self, keys: &[Key], primary: &Key) {
        for key in keys {
            if let Some(owners) = self.entries.get_mut(key) {
                owners.remove(primary);
                if owners.is_empty() {
                    self.entries.remove(key);
                }
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// `(index key, primary key)` pairs within bounds, ascending by index
    /// key then primary key.
    pub(crate) fn range<'a>(
        &'a self,
        lo: Bound<&'a Key>,
        hi: Bound<&'a Key>,
    ) -> Box<dyn DoubleEndedIterator<Item = (&'a Key, &'a Key)> + 'a> {
        if is_empty_interval(lo, hi) {
            return Box::new(std::iter::empty());
        }
        Box::new(
            self.entries
                .range::<Key, _>((lo, hi))
                .flat_map(|(key, owners)| owners.iter().map(move |pk| (key, pk))),
        )
    }

    /// Primary keys stored under exactly `key`.
    pub(crate) fn owners(&self, key: &Key) -> Option<&BTreeSet<Key>> {
        self.entries.get(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }
}
