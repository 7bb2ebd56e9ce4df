//! Databases: shared state and connection handles.

use crate::error::{CoreError, CoreResult};
use crate::index::IndexMeta;
use crate::key::Key;
use crate::log::{CommitLog, LogOp};
use crate::range::KeyRange;
use crate::store::{StoreData, StoreMeta, StoreParams};
use crate::transaction::{LockManager, Transaction};
use crate::types::{TransactionId, TransactionMode};
use parking_lot::{Mutex, RwLock};
use shelfdb_codec::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Schema and data of one database.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, StoreData>,
    /// Set by `Engine::delete_database`; handles to a deleted database
    /// refuse new transactions.
    pub(crate) deleted: bool,
}

impl DatabaseState {
    pub(crate) fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub(crate) fn store(&self, name: &str) -> CoreResult<&StoreData> {
        self.stores
            .get(name)
            .ok_or_else(|| CoreError::not_found(format!("object store '{name}'")))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> CoreResult<&mut StoreData> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found(format!("object store '{name}'")))
    }

    /// Re-applies one logged operation during recovery.
    pub(crate) fn apply(&mut self, op: &LogOp) -> CoreResult<()> {
        match op {
            LogOp::SetVersion { version } => self.version = *version,
            LogOp::CreateStore {
                name,
                key_path,
                auto_increment,
            } => {
                let params = StoreParams {
                    key_path: key_path.clone(),
                    auto_increment: *auto_increment,
                };
                let meta = StoreMeta::new(name.clone(), params)?;
                self.stores.insert(name.clone(), StoreData::new(meta));
            }
            LogOp::DeleteStore { name } => {
                self.stores.remove(name);
            }
            LogOp::CreateIndex {
                store,
                name,
                key_path,
                unique,
                multi_entry,
            } => self.store_mut(store)?.create_index(IndexMeta {
                name: name.clone(),
                key_path: key_path.clone(),
                unique: *unique,
                multi_entry: *multi_entry,
            })?,
            LogOp::DeleteIndex { store, name } => {
                self.store_mut(store)?.delete_index(name)?;
            }
            LogOp::Put { store, key, value } => {
                self.store_mut(store)?.write(key, Some(value.clone()))?;
            }
            LogOp::Delete { store, key } => {
                self.store_mut(store)?.write(key, None)?;
            }
            LogOp::Clear { store } => {
                self.store_mut(store)?.clear();
            }
            LogOp::Generator { store, next } => self.store_mut(store)?.set_generator(*next),
        }
        Ok(())
    }

    /// Operations that rebuild this state from nothing.
    pub(crate) fn snapshot_ops(&self) -> Vec<LogOp> {
        let mut ops = vec![LogOp::SetVersion {
            version: self.version,
        }];
        for (name, store) in &self.stores {
            ops.push(LogOp::CreateStore {
                name: name.clone(),
                key_path: store.meta.key_path.clone(),
                auto_increment: store.meta.auto_increment,
            });
            for index in store.indexes() {
                ops.push(LogOp::CreateIndex {
                    store: name.clone(),
                    name: index.meta.name.clone(),
                    key_path: index.meta.key_path.clone(),
                    unique: index.meta.unique,
                    multi_entry: index.meta.multi_entry,
                });
            }
            for (key, value) in store.range(std::ops::Bound::Unbounded, std::ops::Bound::Unbounded) {
                ops.push(LogOp::Put {
                    store: name.clone(),
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            if store.meta.auto_increment {
                ops.push(LogOp::Generator {
                    store: name.clone(),
                    next: store.generator(),
                });
            }
        }
        ops
    }
}

/// State shared by every connection to one database.
pub(crate) struct DatabaseShared {
    pub(crate) name: String,
    pub(crate) state: RwLock<DatabaseState>,
    pub(crate) locks: LockManager,
    pub(crate) log: Arc<CommitLog>,
    /// Serializes opens (and deletion) so only one upgrade runs at a time.
    pub(crate) open_gate: Mutex<()>,
    txn_ids: Arc<AtomicU64>,
}

impl DatabaseShared {
    pub(crate) fn new(
        name: String,
        state: DatabaseState,
        log: Arc<CommitLog>,
        txn_ids: Arc<AtomicU64>,
    ) -> Self {
        Self {
            name,
            state: RwLock::new(state),
            locks: LockManager::new(),
            log,
            open_gate: Mutex::new(()),
            txn_ids,
        }
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.txn_ids.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Debug for DatabaseShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseShared")
            .field("name", &self.name)
            .field("version", &self.state.read().version)
            .finish_non_exhaustive()
    }
}

/// A connection to a database, returned by [`crate::Engine::open`].
///
/// All reads and writes happen in transactions. The single-operation
/// helpers (`add`, `get`, ...) each run one implicit transaction.
#[derive(Debug)]
pub struct Database {
    shared: Arc<DatabaseShared>,
    version: u64,
    closed: AtomicBool,
}

impl Database {
    pub(crate) fn new(shared: Arc<DatabaseShared>, version: u64) -> Self {
        Self {
            shared,
            version,
            closed: AtomicBool::new(false),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Version this connection was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Names of the database's object stores, sorted.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.shared.state.read().stores.keys().cloned().collect()
    }

    /// Closes the connection. Running transactions finish normally; new
    /// ones are refused.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`Database::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Begins a transaction over `stores`, blocking until any conflicting
    /// transaction finishes.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the connection is closed, the database was deleted,
    /// the scope is empty or `mode` is `VersionChange`; `NotFound` if a
    /// store does not exist.
    pub fn transaction<I, S>(&self, stores: I, mode: TransactionMode) -> CoreResult<Transaction>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_closed() {
            return Err(CoreError::invalid_state(format!(
                "connection to '{}' is closed",
                self.shared.name
            )));
        }
        if mode == TransactionMode::VersionChange {
            return Err(CoreError::invalid_state(
                "version-change transactions are only started by Engine::open",
            ));
        }

        let mut scope: Vec<String> = stores.into_iter().map(Into::into).collect();
        scope.sort();
        scope.dedup();
        if scope.is_empty() {
            return Err(CoreError::invalid_state("transaction scope is empty"));
        }

        {
            let state = self.shared.state.read();
            if state.deleted {
                return Err(CoreError::invalid_state(format!(
                    "database '{}' has been deleted",
                    self.shared.name
                )));
            }
            for name in &scope {
                state.store(name)?;
            }
        }

        Transaction::begin(Arc::clone(&self.shared), mode, scope)
    }

    /// Runs `f` in a transaction: commits if it returns `Ok`, aborts if it
    /// returns `Err`.
    pub fn run<I, S, F, T>(&self, stores: I, mode: TransactionMode, f: F) -> CoreResult<T>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&Transaction) -> CoreResult<T>,
    {
        let txn = self.transaction(stores, mode)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if !txn.state().is_finished() {
                    txn.abort()?;
                }
                Err(e)
            }
        }
    }

    /// Adds one record in its own transaction.
    pub fn add(&self, store: &str, value: Value) -> CoreResult<Key> {
        self.run([store], TransactionMode::ReadWrite, |txn| {
            txn.object_store(store)?.add(value)
        })
    }

    /// Adds one record under an explicit key in its own transaction.
    pub fn add_with_key(&self, store: &str, value: Value, key: impl Into<Key>) -> CoreResult<Key> {
        self.run([store], TransactionMode::ReadWrite, |txn| {
            txn.object_store(store)?.add_with_key(value, key)
        })
    }

    /// Puts one record in its own transaction.
    pub fn put(&self, store: &str, value: Value) -> CoreResult<Key> {
        self.run([store], TransactionMode::ReadWrite, |txn| {
            txn.object_store(store)?.put(value)
        })
    }

    /// Puts one record under an explicit key in its own transaction.
    pub fn put_with_key(&self, store: &str, value: Value, key: impl Into<Key>) -> CoreResult<Key> {
        self.run([store], TransactionMode::ReadWrite, |txn| {
            txn.object_store(store)?.put_with_key(value, key)
        })
    }

    /// Reads one record.
    pub fn get(&self, store: &str, key: impl Into<KeyRange>) -> CoreResult<Option<Value>> {
        self.run([store], TransactionMode::ReadOnly, |txn| {
            txn.object_store(store)?.get(key)
        })
    }

    /// Reads every record in `range`.
    pub fn get_all(&self, store: &str, range: Option<KeyRange>) -> CoreResult<Vec<Value>> {
        self.run([store], TransactionMode::ReadOnly, |txn| {
            txn.object_store(store)?.get_all(range)
        })
    }

    /// Deletes one record.
    pub fn delete(&self, store: &str, key: impl Into<Key>) -> CoreResult<()> {
        self.run([store], TransactionMode::ReadWrite, |txn| {
            txn.object_store(store)?.delete(key)
        })
    }

    /// Deletes every record of a store.
    pub fn clear(&self, store: &str) -> CoreResult<()> {
        self.run([store], TransactionMode::ReadWrite, |txn| {
            txn.object_store(store)?.clear()
        })
    }

    /// Counts records in `range`.
    pub fn count(&self, store: &str, range: Option<KeyRange>) -> CoreResult<u64> {
        self.run([store], TransactionMode::ReadOnly, |txn| {
            txn.object_store(store)?.count(range)
        })
    }

    /// Reads the first record whose index key matches.
    pub fn get_from_index(
        &self,
        store: &str,
        index: &str,
        key: impl Into<KeyRange>,
    ) -> CoreResult<Option<Value>> {
        self.run([store], TransactionMode::ReadOnly, |txn| {
            txn.object_store(store)?.index(index)?.get(key)
        })
    }

    /// Reads every record whose index key is in `range`.
    pub fn get_all_from_index(
        &self,
        store: &str,
        index: &str,
        range: Option<KeyRange>,
    ) -> CoreResult<Vec<Value>> {
        self.run([store], TransactionMode::ReadOnly, |txn| {
            txn.object_store(store)?.index(index)?.get_all(range)
        })
    }
}
