//! Object-store records, indexes and key generator.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexData, IndexMeta};
use crate::key::{Key, KeyPath};
use crate::range::is_empty_interval;
use shelfdb_codec::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Largest key a generator hands out.
pub(crate) const MAX_GENERATED_KEY: i64 = 1 << 53;

/// Options for [`crate::Transaction::create_object_store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParams {
    /// Path the primary key is read from. `None` means out-of-line keys.
    pub key_path: Option<KeyPath>,
    /// Whether the store generates keys for records that lack one.
    pub auto_increment: bool,
}

impl StoreParams {
    /// Out-of-line keys, no generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key path.
    #[must_use]
    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Sets the auto-increment flag.
    #[must_use]
    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoreMeta {
    pub(crate) name: String,
    pub(crate) key_path: Option<KeyPath>,
    pub(crate) auto_increment: bool,
}

impl StoreMeta {
    pub(crate) fn new(name: impl Into<String>, params: StoreParams) -> CoreResult<Self> {
        let name = name.into();
        if params.auto_increment {
            match &params.key_path {
                Some(KeyPath::Compound(_)) => {
                    return Err(CoreError::data(format!(
                        "store '{name}': a compound key path cannot be auto-incremented"
                    )))
                }
                Some(KeyPath::Single(path)) if path.is_empty() => {
                    return Err(CoreError::data(format!(
                        "store '{name}': an empty key path cannot be auto-incremented"
                    )))
                }
                _ => {}
            }
        }
        Ok(Self {
            name,
            key_path: params.key_path,
            auto_increment: params.auto_increment,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoreData {
    pub(crate) meta: StoreMeta,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexData>,
    /// Next generated key; `None` once exhausted or for stores without a
    /// generator.
    generator: Option<i64>,
}

impl StoreData {
    pub(crate) fn new(meta: StoreMeta) -> Self {
        let generator = meta.auto_increment.then_some(1);
        Self {
            meta,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            generator,
        }
    }

    pub(crate) fn generator(&self) -> Option<i64> {
        self.generator
    }

    pub(crate) fn set_generator(&mut self, next: Option<i64>) {
        self.generator = next;
    }

    /// Works out the primary key of a record being stored.
    ///
    /// May advance the key generator and, for in-line auto-increment
    /// stores, writes the generated key into `value`.
    pub(crate) fn derive_key(&mut self, value: &mut Value, explicit: Option<Key>) -> CoreResult<Key> {
        let key_path = self.meta.key_path.clone();
        match (key_path, explicit) {
            (Some(_), Some(key)) => Err(CoreError::data(format!(
                "store '{}' uses in-line keys; explicit key {key} not allowed",
                self.meta.name
            ))),
            (Some(path), None) => match path.extract(value)? {
                Some(key) => {
                    self.observe_key(&key);
                    Ok(key)
                }
                None if self.meta.auto_increment => {
                    let key = self.next_generated()?;
                    if let KeyPath::Single(field) = &path {
                        value.set_path(field, key.to_value()).map_err(|_| {
                            CoreError::data(format!(
                                "cannot inject generated key at '{field}' in store '{}'",
                                self.meta.name
                            ))
                        })?;
                    }
                    Ok(key)
                }
                None => Err(CoreError::data(format!(
                    "record has no key at path '{path}' in store '{}'",
                    self.meta.name
                ))),
            },
            (None, Some(key)) => {
                self.observe_key(&key);
                Ok(key)
            }
            (None, None) if self.meta.auto_increment => self.next_generated(),
            (None, None) => Err(CoreError::data(format!(
                "store '{}' has no key path or generator and no key was supplied",
                self.meta.name
            ))),
        }
    }

    fn next_generated(&mut self) -> CoreResult<Key> {
        let Some(next) = self.generator else {
            return Err(CoreError::constraint(format!(
                "key generator of store '{}' is exhausted",
                self.meta.name
            )));
        };
        self.generator = (next < MAX_GENERATED_KEY).then_some(next + 1);
        Ok(Key::Number(next))
    }

    /// Explicit numeric keys at or past the generator move it forward.
    fn observe_key(&mut self, key: &Key) {
        if let (Some(next), Some(n)) = (self.generator, key.as_number()) {
            if n >= next {
                self.generator = (n < MAX_GENERATED_KEY).then_some(n + 1);
            }
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&Value> {
        self.records.get(key)
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.records.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Records within bounds, ascending by primary key.
    pub(crate) fn range<'a>(
        &'a self,
        lo: Bound<&'a Key>,
        hi: Bound<&'a Key>,
    ) -> Box<dyn DoubleEndedIterator<Item = (&'a Key, &'a Value)> + 'a> {
        if is_empty_interval(lo, hi) {
            return Box::new(std::iter::empty());
        }
        Box::new(self.records.range::<Key, _>((lo, hi)))
    }

    /// Stores (`Some`) or removes (`None`) the record at `key`, keeping
    /// every index in step. Returns the previous record.
    ///
    /// Unique constraints are checked against all indexes before anything
    /// changes, so a failed write leaves the store untouched.
    pub(crate) fn write(&mut self, key: &Key, value: Option<Value>) -> CoreResult<Option<Value>> {
        let new_keys: Vec<Vec<Key>> = match &value {
            Some(v) => {
                let mut all = Vec::with_capacity(self.indexes.len());
                for index in self.indexes.values() {
                    let keys = index.keys_for(v);
                    index.check_unique(&keys, key)?;
                    all.push(keys);
                }
                all
            }
            None => vec![Vec::new(); self.indexes.len()],
        };

        let previous = match value {
            Some(v) => self.records.insert(key.clone(), v),
            None => self.records.remove(key),
        };

        for (index, keys) in self.indexes.values_mut().zip(new_keys) {
            if let Some(prev) = &previous {
                let old_keys = index.keys_for(prev);
                index.remove(&old_keys, key);
            }
            index.insert(keys, key);
        }
        Ok(previous)
    }

    /// Removes every record. Returns them for rollback.
    pub(crate) fn clear(&mut self) -> BTreeMap<Key, Value> {
        for index in self.indexes.values_mut() {
            index.clear();
        }
        std::mem::take(&mut self.records)
    }

    /// Puts back records taken by [`StoreData::clear`].
    pub(crate) fn restore(&mut self, records: BTreeMap<Key, Value>) {
        self.records = records;
        for index in self.indexes.values_mut() {
            index.clear();
            for (pk, value) in &self.records {
                let keys = index.keys_for(value);
                index.insert(keys, pk);
            }
        }
    }

    pub(crate) fn create_index(&mut self, meta: IndexMeta) -> CoreResult<()> {
        if self.indexes.contains_key(&meta.name) {
            return Err(CoreError::constraint(format!(
                "index '{}' already exists on store '{}'",
                meta.name, self.meta.name
            )));
        }
        if meta.multi_entry && matches!(meta.key_path, KeyPath::Compound(_)) {
            return Err(CoreError::data(format!(
                "index '{}': a compound key path cannot be multi-entry",
                meta.name
            )));
        }

        let mut index = IndexData::new(meta);
        for (pk, value) in &self.records {
            let keys = index.keys_for(value);
            index.check_unique(&keys, pk)?;
            index.insert(keys, pk);
        }
        self.indexes.insert(index.meta.name.clone(), index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> CoreResult<IndexData> {
        self.indexes.remove(name).ok_or_else(|| {
            CoreError::not_found(format!(
                "index '{name}' on store '{}'",
                self.meta.name
            ))
        })
    }

    pub(crate) fn index(&self, name: &str) -> CoreResult<&IndexData> {
        self.indexes.get(name).ok_or_else(|| {
            CoreError::not_found(format!(
                "index '{name}' on store '{}'",
                self.meta.name
            ))
        })
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = &IndexData> {
        self.indexes.values()
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn store(params: StoreParams) -> StoreData {
        StoreData::new(StoreMeta::new("books", params).unwrap())
    }

    fn book(isbn: i64, title: &str) -> Value {
        Value::object([("isbn", Value::from(isbn)), ("title", Value::from(title))])
    }

    fn isbn_index(unique: bool) -> IndexMeta {
        IndexMeta {
            name: "by_isbn".into(),
            key_path: KeyPath::from("isbn"),
            unique,
            multi_entry: false,
        }
    }

    #[test]
    fn explicit_key_conflicts_with_key_path() {
        let mut s = store(StoreParams::new().key_path("isbn"));
        let err = s.derive_key(&mut book(1, "a"), Some(Key::from(1))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn in_line_key_extracted() {
        let mut s = store(StoreParams::new().key_path("isbn"));
        assert_eq!(s.derive_key(&mut book(7, "a"), None).unwrap(), Key::from(7));

        let mut untitled = Value::object([("title", Value::from("x"))]);
        let err = s.derive_key(&mut untitled, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn generated_key_injected_into_value() {
        let mut s = store(StoreParams::new().key_path("meta.id").auto_increment(true));
        let mut value = Value::object([("title", Value::from("Dune"))]);

        let key = s.derive_key(&mut value, None).unwrap();
        assert_eq!(key, Key::from(1));
        assert_eq!(value.get_path("meta.id"), Some(&Value::Integer(1)));
        assert_eq!(s.generator(), Some(2));
    }

    #[test]
    fn explicit_numeric_key_advances_generator() {
        let mut s = store(StoreParams::new().auto_increment(true));
        let mut v = Value::Null;
        assert_eq!(s.derive_key(&mut v, None).unwrap(), Key::from(1));
        assert_eq!(s.derive_key(&mut v, Some(Key::from(10))).unwrap(), Key::from(10));
        assert_eq!(s.derive_key(&mut v, Some(Key::from(5))).unwrap(), Key::from(5));
        assert_eq!(s.derive_key(&mut v, Some(Key::from("x"))).unwrap(), Key::from("x"));
        assert_eq!(s.derive_key(&mut v, None).unwrap(), Key::from(11));
    }

    #[test]
    fn generator_exhaustion() {
        let mut s = store(StoreParams::new().auto_increment(true));
        s.set_generator(Some(MAX_GENERATED_KEY));
        let mut v = Value::Null;
        assert_eq!(
            s.derive_key(&mut v, None).unwrap(),
            Key::from(MAX_GENERATED_KEY)
        );
        let err = s.derive_key(&mut v, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
    }

    #[test]
    fn no_key_source_is_data_error() {
        let mut s = store(StoreParams::new());
        let err = s.derive_key(&mut Value::Null, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn compound_auto_increment_rejected() {
        let params = StoreParams::new().key_path(["a", "b"]).auto_increment(true);
        assert!(StoreMeta::new("s", params).is_err());
    }

    #[test]
    fn write_maintains_indexes() {
        let mut s = store(StoreParams::new());
        s.create_index(isbn_index(false)).unwrap();

        s.write(&Key::from(1), Some(book(100, "a"))).unwrap();
        s.write(&Key::from(1), Some(book(200, "a"))).unwrap();

        let idx = s.index("by_isbn").unwrap();
        assert!(idx.owners(&Key::from(100)).is_none());
        assert!(idx.owners(&Key::from(200)).is_some());

        s.write(&Key::from(1), None).unwrap();
        assert_eq!(s.index("by_isbn").unwrap().len(), 0);
    }

    #[test]
    fn unique_violation_leaves_store_untouched() {
        let mut s = store(StoreParams::new());
        s.create_index(isbn_index(true)).unwrap();
        s.write(&Key::from(1), Some(book(100, "a"))).unwrap();

        let err = s.write(&Key::from(2), Some(book(100, "b"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert_eq!(s.len(), 1);
        assert!(!s.contains(&Key::from(2)));

        // Rewriting the same record with the same unique value is fine.
        s.write(&Key::from(1), Some(book(100, "a2"))).unwrap();
    }

    #[test]
    fn create_index_backfills_and_checks_unique() {
        let mut s = store(StoreParams::new());
        s.write(&Key::from(1), Some(book(100, "a"))).unwrap();
        s.write(&Key::from(2), Some(book(100, "b"))).unwrap();

        let err = s.create_index(isbn_index(true)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert!(s.index("by_isbn").is_err());

        s.create_index(isbn_index(false)).unwrap();
        assert_eq!(s.index("by_isbn").unwrap().len(), 2);
        assert!(s.create_index(isbn_index(false)).is_err());
    }

    #[test]
    fn clear_and_restore() {
        let mut s = store(StoreParams::new());
        s.create_index(isbn_index(false)).unwrap();
        s.write(&Key::from(1), Some(book(100, "a"))).unwrap();

        let taken = s.clear();
        assert_eq!(s.len(), 0);
        assert_eq!(s.index("by_isbn").unwrap().len(), 0);

        s.restore(taken);
        assert_eq!(s.len(), 1);
        assert_eq!(s.index("by_isbn").unwrap().len(), 1);
    }
}
