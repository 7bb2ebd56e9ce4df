//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, record values and store operations, and
//! a reference model that tracks what an out-of-line store should hold
//! after a sequence of operations.

use proptest::prelude::*;
use shelfdb_codec::Value;
use shelfdb_core::{CoreResult, ErrorKind, Key, ObjectStore};
use std::collections::BTreeMap;

/// Strategy for generating valid keys, including nested compound keys.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Key::Number),
        "[a-z0-9]{0,8}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..6).prop_map(Key::Bytes),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop::collection::vec(inner, 0..3).prop_map(Key::Array)
    })
}

/// Strategy for generating small integer keys, so operations collide.
pub fn small_key_strategy() -> impl Strategy<Value = Key> {
    (0i64..16).prop_map(Key::Number)
}

/// Strategy for generating record values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[ -~]{0,12}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(Value::object),
        ]
    })
}

/// Strategy for generating valid object store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// One write against an out-of-line store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Insert, failing if the key exists.
    Add {
        /// Record key
        key: Key,
        /// Record value
        value: Value,
    },
    /// Insert or replace.
    Put {
        /// Record key
        key: Key,
        /// Record value
        value: Value,
    },
    /// Delete one key.
    Delete {
        /// Record key
        key: Key,
    },
    /// Delete every record.
    Clear,
}

/// Strategy for generating a single store operation.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        4 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Add { key, value }),
        4 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Put { key, value }),
        2 => small_key_strategy().prop_map(|key| StoreOperation::Delete { key }),
        1 => Just(StoreOperation::Clear),
    ]
}

/// Strategy for generating a sequence of store operations.
pub fn store_operations_strategy(max: usize) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), 0..max)
}

impl StoreOperation {
    /// Runs the operation against a store.
    pub fn apply(&self, store: &ObjectStore<'_>) -> CoreResult<()> {
        match self {
            Self::Add { key, value } => store.add_with_key(value.clone(), key.clone()).map(|_| ()),
            Self::Put { key, value } => store.put_with_key(value.clone(), key.clone()).map(|_| ()),
            Self::Delete { key } => store.delete(key.clone()),
            Self::Clear => store.clear(),
        }
    }
}

/// Expected contents of an out-of-line store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreModel {
    records: BTreeMap<Key, Value>,
}

impl StoreModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an operation. Returns the error kind the engine should
    /// report, if any; a failed operation leaves the model unchanged.
    pub fn apply(&mut self, op: &StoreOperation) -> Option<ErrorKind> {
        match op {
            StoreOperation::Add { key, value } => {
                if self.records.contains_key(key) {
                    return Some(ErrorKind::Constraint);
                }
                self.records.insert(key.clone(), value.clone());
            }
            StoreOperation::Put { key, value } => {
                self.records.insert(key.clone(), value.clone());
            }
            StoreOperation::Delete { key } => {
                self.records.remove(key);
            }
            StoreOperation::Clear => self.records.clear(),
        }
        None
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<Key> {
        self.records.keys().cloned().collect()
    }

    /// Values in key order.
    pub fn values(&self) -> Vec<Value> {
        self.records.values().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the model is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
