//! Cursors.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::range::{bounds_of, tighter_lower, tighter_upper, KeyRange};
use crate::store::{ObjectStore, StoreData};
use crate::transaction::Transaction;
use crate::types::Direction;
use shelfdb_codec::Value;
use std::ops::Bound;
use tracing::debug;

/// What a cursor walks over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CursorSource {
    /// Records of a store, by primary key.
    Store { store: String },
    /// Entries of an index, by index key then primary key.
    Index { store: String, index: String },
}

impl CursorSource {
    fn store(&self) -> &str {
        match self {
            Self::Store { store } | Self::Index { store, .. } => store,
        }
    }
}

#[derive(Debug, Clone)]
struct Position {
    key: Key,
    primary_key: Key,
    value: Value,
}

/// Where a seek must land at or beyond, in cursor direction.
#[derive(Clone, Copy)]
struct Target<'a> {
    key: &'a Key,
    primary_key: Option<&'a Key>,
}

/// A position in an ordered walk over a store or index.
///
/// A cursor keeps no snapshot. Each move re-reads the live data from its
/// current position, so records the same transaction writes ahead of the
/// cursor are visible when it gets there. It fails with `InvalidState`
/// once its transaction is no longer active.
///
/// ```
/// use shelfdb_core::{Direction, Engine, StoreParams, TransactionMode, Value};
///
/// let engine = Engine::open_in_memory();
/// let db = engine
///     .open("counts", 1, |txn, _, _| {
///         txn.create_object_store("n", StoreParams::new())?;
///         Ok(())
///     })
///     .unwrap();
/// for i in 0..5 {
///     db.put_with_key("n", Value::from(i), i).unwrap();
/// }
///
/// let txn = db.transaction(["n"], TransactionMode::ReadOnly).unwrap();
/// let store = txn.object_store("n").unwrap();
/// let mut cursor = store.open_cursor(None, Direction::Prev).unwrap();
/// let mut seen = Vec::new();
/// while let Some(value) = cursor.value() {
///     seen.push(value.as_integer().unwrap());
///     cursor.advance().unwrap();
/// }
/// assert_eq!(seen, vec![4, 3, 2, 1, 0]);
/// ```
#[derive(Debug)]
pub struct Cursor<'t> {
    txn: &'t Transaction,
    source: CursorSource,
    range: Option<KeyRange>,
    direction: Direction,
    position: Option<Position>,
}

impl<'t> Cursor<'t> {
    pub(crate) fn open(
        txn: &'t Transaction,
        source: CursorSource,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> CoreResult<Self> {
        let mut cursor = Self {
            txn,
            source,
            range,
            direction,
            position: None,
        };
        cursor.position = cursor.seek(None)?;
        Ok(cursor)
    }

    /// Walk direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current key: the index key on index cursors, the primary key on
    /// store cursors. `None` once exhausted.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.position.as_ref().map(|p| &p.key)
    }

    /// Primary key of the current record.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Key> {
        self.position.as_ref().map(|p| &p.primary_key)
    }

    /// Current record.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.position.as_ref().map(|p| &p.value)
    }

    /// Whether the cursor ran off the end of its range.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.position.is_none()
    }

    /// Moves to the next entry. Returns `false` when the walk is over.
    pub fn advance(&mut self) -> CoreResult<bool> {
        self.step(None)
    }

    /// Moves `count` entries forward in cursor direction.
    ///
    /// # Errors
    ///
    /// `Data` if `count` is zero.
    pub fn advance_by(&mut self, count: usize) -> CoreResult<bool> {
        if count == 0 {
            return Err(CoreError::data("cursor advance count must be positive"));
        }
        for _ in 0..count {
            if !self.step(None)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Moves to the first entry at or beyond `key` in cursor direction.
    ///
    /// # Errors
    ///
    /// `Data` if `key` is not strictly beyond the current key.
    pub fn continue_to(&mut self, key: impl Into<Key>) -> CoreResult<bool> {
        let key = key.into();
        self.txn.ensure_active()?;
        if let Some(current) = self.key() {
            if !self.is_beyond(&key, current) {
                return Err(CoreError::data(format!(
                    "continue target {key} is not beyond current key {current}"
                )));
            }
        }
        self.step(Some(Target {
            key: &key,
            primary_key: None,
        }))
    }

    /// Moves to the first entry at or beyond `(key, primary_key)`.
    /// Index cursors walking `Next` or `Prev` only.
    ///
    /// # Errors
    ///
    /// `InvalidState` on store cursors and unique directions; `Data` if the
    /// target is not beyond the current position.
    pub fn continue_primary_key(&mut self, key: impl Into<Key>, primary_key: impl Into<Key>) -> CoreResult<bool> {
        let (key, primary_key) = (key.into(), primary_key.into());
        self.txn.ensure_active()?;
        if matches!(self.source, CursorSource::Store { .. }) || self.direction.is_unique() {
            return Err(CoreError::invalid_state(
                "continue_primary_key needs an index cursor walking Next or Prev",
            ));
        }
        if let Some(p) = &self.position {
            let target = (&key, &primary_key);
            let current = (&p.key, &p.primary_key);
            let beyond = if self.direction.is_reverse() {
                target < current
            } else {
                target > current
            };
            if !beyond {
                return Err(CoreError::data(format!(
                    "continue target ({key}, {primary_key}) is not beyond the current position"
                )));
            }
        }
        self.step(Some(Target {
            key: &key,
            primary_key: Some(&primary_key),
        }))
    }

    /// Replaces the current record. Needs a read-write transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the cursor is exhausted; `Data` if the store uses
    /// in-line keys and `value` carries a different key.
    pub fn update(&mut self, value: Value) -> CoreResult<()> {
        let Some(position) = &self.position else {
            self.txn.ensure_active()?;
            return Err(CoreError::invalid_state("cursor is exhausted"));
        };
        let store = ObjectStore::new(self.txn, self.source.store());
        store.replace(&position.primary_key, value.clone())?;
        if let Some(p) = &mut self.position {
            p.value = value;
        }
        Ok(())
    }

    /// Deletes the current record. The cursor stays where it is.
    pub fn delete(&mut self) -> CoreResult<()> {
        let Some(position) = &self.position else {
            self.txn.ensure_active()?;
            return Err(CoreError::invalid_state("cursor is exhausted"));
        };
        ObjectStore::new(self.txn, self.source.store()).delete(position.primary_key.clone())
    }

    fn step(&mut self, target: Option<Target<'_>>) -> CoreResult<bool> {
        self.txn.ensure_active()?;
        if self.position.is_none() {
            return Err(CoreError::invalid_state("cursor is exhausted"));
        }
        self.position = self.seek(target)?;
        if self.position.is_none() {
            debug!(txn = %self.txn.id(), "cursor exhausted");
        }
        Ok(self.position.is_some())
    }

    fn is_beyond(&self, key: &Key, current: &Key) -> bool {
        if self.direction.is_reverse() {
            key < current
        } else {
            key > current
        }
    }

    /// Finds the next entry after the current position (or the first one
    /// if there is none yet), honoring range, direction and target.
    fn seek(&self, target: Option<Target<'_>>) -> CoreResult<Option<Position>> {
        let from = self.position.as_ref();
        self.txn.read_store(self.source.store(), |store| match &self.source {
            CursorSource::Store { .. } => Ok(self.seek_store(store, from, target)),
            CursorSource::Index { index, .. } => self.seek_index(store, index, from, target),
        })
    }

    fn seek_store(&self, store: &StoreData, from: Option<&Position>, target: Option<Target<'_>>) -> Option<Position> {
        let (mut lo, mut hi) = bounds_of(self.range.as_ref());
        let found = if self.direction.is_reverse() {
            if let Some(p) = from {
                hi = tighter_upper(hi, Bound::Excluded(&p.key));
            }
            if let Some(t) = target {
                hi = tighter_upper(hi, Bound::Included(t.key));
            }
            store.range(lo, hi).next_back()
        } else {
            if let Some(p) = from {
                lo = tighter_lower(lo, Bound::Excluded(&p.key));
            }
            if let Some(t) = target {
                lo = tighter_lower(lo, Bound::Included(t.key));
            }
            store.range(lo, hi).next()
        };
        found.map(|(k, v)| Position {
            key: k.clone(),
            primary_key: k.clone(),
            value: v.clone(),
        })
    }

    fn seek_index(
        &self,
        store: &StoreData,
        index: &str,
        from: Option<&Position>,
        target: Option<Target<'_>>,
    ) -> CoreResult<Option<Position>> {
        let index = store.index(index)?;
        let unique = self.direction.is_unique();
        let (mut lo, mut hi) = bounds_of(self.range.as_ref());

        let found = if self.direction.is_reverse() {
            if let Some(p) = from {
                hi = tighter_upper(hi, Bound::Included(&p.key));
            }
            if let Some(t) = target {
                hi = tighter_upper(hi, Bound::Included(t.key));
            }
            let hit = index.range(lo, hi).rev().find(|&(k, pk)| {
                let before_position = from.map_or(true, |p| {
                    if unique {
                        k < &p.key
                    } else {
                        (k, pk) < (&p.key, &p.primary_key)
                    }
                });
                let within_target = target.map_or(true, |t| match t.primary_key {
                    Some(tpk) => (k, pk) <= (t.key, tpk),
                    None => k <= t.key,
                });
                before_position && within_target
            });
            // Unique reverse walks report the lowest primary key of a key.
            match hit {
                Some((k, _)) if unique => index
                    .owners(k)
                    .and_then(|owners| owners.first())
                    .map(|pk| (k, pk)),
                other => other,
            }
        } else {
            if let Some(p) = from {
                lo = tighter_lower(lo, Bound::Included(&p.key));
            }
            if let Some(t) = target {
                lo = tighter_lower(lo, Bound::Included(t.key));
            }
            index.range(lo, hi).find(|&(k, pk)| {
                let after_position = from.map_or(true, |p| {
                    if unique {
                        k > &p.key
                    } else {
                        (k, pk) > (&p.key, &p.primary_key)
                    }
                });
                let within_target = target.map_or(true, |t| match t.primary_key {
                    Some(tpk) => (k, pk) >= (t.key, tpk),
                    None => k >= t.key,
                });
                after_position && within_target
            })
        };

        Ok(found.and_then(|(k, pk)| {
            store.get(pk).map(|v| Position {
                key: k.clone(),
                primary_key: pk.clone(),
                value: v.clone(),
            })
        }))
    }
}
