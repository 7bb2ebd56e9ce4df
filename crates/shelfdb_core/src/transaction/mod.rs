//! Transactions.
//!
//! A transaction is created `Active` over a fixed scope of object stores
//! and ends either `Committed` or `Aborted`:
//!
//! ```text
//! Active ──commit──▶ Committing ──▶ Committed
//!    │
//!    └──failure / abort──▶ Aborted
//! ```
//!
//! Changes are applied to the live stores as operations run and journaled
//! so an abort can reverse them. Isolation comes from the lock each
//! transaction holds for its whole life: shared over its scope for
//! `ReadOnly`, exclusive over its scope for `ReadWrite`, and exclusive over
//! the whole database for `VersionChange`.
//!
//! A transaction that is dropped while still active commits.

mod journal;
mod lock;

pub(crate) use journal::Journal;
pub(crate) use lock::{LockManager, LockRequest};

use crate::database::{DatabaseShared, DatabaseState};
use crate::error::{CoreError, CoreResult};
use crate::log::{LogOp, LogRecord};
use crate::store::{ObjectStore, StoreData, StoreMeta, StoreParams};
use crate::types::{TransactionId, TransactionMode, TransactionState};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Full copy of the schema and data taken when a version change begins.
#[derive(Debug)]
struct Backup {
    version: u64,
    stores: BTreeMap<String, StoreData>,
}

#[derive(Debug)]
struct TxnInner {
    state: TransactionState,
    journal: Journal,
    backup: Option<Backup>,
    abort_reason: Option<String>,
}

/// A unit of work over a set of object stores.
///
/// Obtained from [`crate::Database::transaction`] or, for schema changes,
/// handed to the upgrade handler by [`crate::Engine::open`].
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    mode: TransactionMode,
    /// Sorted store names; empty for version changes, which cover every store.
    scope: Vec<String>,
    db: Arc<DatabaseShared>,
    inner: Mutex<TxnInner>,
}

impl Transaction {
    /// Begins a transaction, blocking until its locks are granted.
    pub(crate) fn begin(
        db: Arc<DatabaseShared>,
        mode: TransactionMode,
        scope: Vec<String>,
    ) -> CoreResult<Self> {
        let id = db.next_transaction_id();
        let request = match mode {
            TransactionMode::ReadOnly => LockRequest::Shared(scope.clone()),
            TransactionMode::ReadWrite => LockRequest::Exclusive(scope.clone()),
            TransactionMode::VersionChange => LockRequest::Database,
        };
        db.locks.acquire(id, request);

        let backup = if mode == TransactionMode::VersionChange {
            let state = db.state.read();
            Some(Backup {
                version: state.version,
                stores: state.stores.clone(),
            })
        } else {
            None
        };

        // The schema may have changed while waiting for the lock.
        let checked = {
            let state = db.state.read();
            if state.deleted {
                Err(CoreError::invalid_state(format!(
                    "database '{}' has been deleted",
                    db.name
                )))
            } else {
                scope
                    .iter()
                    .try_for_each(|name| state.store(name).map(|_| ()))
            }
        };
        if let Err(e) = checked {
            db.locks.release(id);
            return Err(e);
        }

        debug!(txn = %id, %mode, database = %db.name, ?scope, "transaction started");
        Ok(Self {
            id,
            mode,
            scope,
            db,
            inner: Mutex::new(TxnInner {
                state: TransactionState::Active,
                journal: Journal::default(),
                backup,
                abort_reason: None,
            }),
        })
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    /// Name of the database this transaction runs against.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.db.name
    }

    /// Stores this transaction may touch.
    ///
    /// For a version change this is every store currently in the database.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        if self.mode == TransactionMode::VersionChange {
            self.db.state.read().stores.keys().cloned().collect()
        } else {
            self.scope.clone()
        }
    }

    /// Opens a handle to a store in scope.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the transaction is finished or the store is
    /// outside its scope, `NotFound` if the store does not exist.
    pub fn object_store(&self, name: &str) -> CoreResult<ObjectStore<'_>> {
        self.read_store(name, |_| Ok(()))?;
        Ok(ObjectStore::new(self, name))
    }

    /// Creates an object store. Version-change transactions only.
    ///
    /// # Errors
    ///
    /// `Constraint` if the name is taken; `Data` for an auto-increment
    /// store with a compound or empty key path.
    pub fn create_object_store(&self, name: &str, params: StoreParams) -> CoreResult<ObjectStore<'_>> {
        self.write_schema(|state, journal| {
            if state.stores.contains_key(name) {
                return Err(CoreError::constraint(format!(
                    "object store '{name}' already exists"
                )));
            }
            let meta = StoreMeta::new(name, params)?;
            journal.schema(LogOp::CreateStore {
                name: name.to_string(),
                key_path: meta.key_path.clone(),
                auto_increment: meta.auto_increment,
            });
            state.stores.insert(name.to_string(), StoreData::new(meta));
            Ok(())
        })?;
        debug!(txn = %self.id, store = name, "object store created");
        Ok(ObjectStore::new(self, name))
    }

    /// Deletes an object store and its indexes. Version-change
    /// transactions only.
    pub fn delete_object_store(&self, name: &str) -> CoreResult<()> {
        self.write_schema(|state, journal| {
            if state.stores.remove(name).is_none() {
                return Err(CoreError::not_found(format!("object store '{name}'")));
            }
            journal.schema(LogOp::DeleteStore {
                name: name.to_string(),
            });
            Ok(())
        })
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// `Aborted` if an earlier failure already aborted it; the commit log
    /// error if the commit record could not be written (the transaction
    /// is then rolled back).
    pub fn commit(self) -> CoreResult<()> {
        self.finish()
    }

    /// Aborts the transaction, discarding every change it made.
    ///
    /// # Errors
    ///
    /// `InvalidState` if it already finished.
    pub fn abort(self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return Err(CoreError::invalid_state(format!(
                "{} is already {:?}",
                self.id, inner.state
            )));
        }
        self.rollback(&mut inner, "aborted by caller".to_string());
        Ok(())
    }

    fn finish(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            TransactionState::Active => {}
            TransactionState::Aborted => {
                let reason = inner
                    .abort_reason
                    .clone()
                    .unwrap_or_else(|| "transaction aborted".to_string());
                return Err(CoreError::aborted(reason));
            }
            TransactionState::Committing | TransactionState::Committed => {
                return Err(CoreError::invalid_state(format!(
                    "{} is already committed",
                    self.id
                )));
            }
        }

        inner.state = TransactionState::Committing;
        if !inner.journal.is_empty() {
            let ops = inner.journal.take_ops();
            let record = LogRecord::Commit {
                database: self.db.name.clone(),
                ops,
            };
            if let Err(e) = self.db.log.append(&record) {
                self.rollback(&mut inner, format!("commit failed: {e}"));
                return Err(e);
            }
        }
        inner.journal.clear();

        inner.state = TransactionState::Committed;
        inner.backup = None;
        self.db.locks.release(self.id);
        debug!(txn = %self.id, "transaction committed");
        Ok(())
    }

    /// Marks the transaction aborted, reverses its changes and releases
    /// its locks.
    fn rollback(&self, inner: &mut TxnInner, reason: String) {
        {
            let mut state = self.db.state.write();
            match inner.backup.take() {
                Some(backup) => {
                    state.version = backup.version;
                    state.stores = backup.stores;
                    inner.journal.clear();
                }
                None => inner.journal.rollback(&mut state),
            }
        }
        debug!(txn = %self.id, %reason, "transaction aborted");
        inner.state = TransactionState::Aborted;
        inner.abort_reason = Some(reason);
        self.db.locks.release(self.id);
    }

    fn check_active(&self, inner: &TxnInner) -> CoreResult<()> {
        if inner.state == TransactionState::Active {
            Ok(())
        } else {
            Err(CoreError::invalid_state(format!(
                "{} is {:?}, not active",
                self.id, inner.state
            )))
        }
    }

    /// A store that exists but is not in scope is `InvalidState`; one that
    /// does not exist at all is `NotFound`.
    fn check_scope(&self, store: &str) -> CoreResult<()> {
        if self.mode == TransactionMode::VersionChange
            || self.scope.binary_search_by(|s| s.as_str().cmp(store)).is_ok()
        {
            return Ok(());
        }
        if self.db.state.read().stores.contains_key(store) {
            Err(CoreError::invalid_state(format!(
                "object store '{store}' is not in the scope of {}",
                self.id
            )))
        } else {
            Err(CoreError::not_found(format!("object store '{store}'")))
        }
    }

    /// Aborts the transaction if `result` failed in a way that dooms it.
    fn settle<R>(&self, inner: &mut TxnInner, result: CoreResult<R>) -> CoreResult<R> {
        if let Err(e) = &result {
            if e.aborts_transaction() {
                self.rollback(inner, e.to_string());
            }
        }
        result
    }

    /// Fails unless the transaction is still active.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        self.check_active(&self.inner.lock())
    }

    /// Runs a read against one store in scope.
    pub(crate) fn read_store<R>(
        &self,
        name: &str,
        f: impl FnOnce(&StoreData) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut inner = self.inner.lock();
        self.check_active(&inner)?;
        self.check_scope(name)?;
        let result = {
            let state = self.db.state.read();
            state.store(name).and_then(f)
        };
        self.settle(&mut inner, result)
    }

    /// Runs a mutation against one store in scope.
    ///
    /// A failure that dooms the transaction rolls back everything done so
    /// far, including partial effects of `f` that it journaled.
    pub(crate) fn write_store<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut StoreData, &mut Journal) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut inner = self.inner.lock();
        self.check_active(&inner)?;
        if !self.mode.is_writable() {
            return Err(CoreError::invalid_state(format!(
                "{} is read-only",
                self.id
            )));
        }
        self.check_scope(name)?;
        let result = {
            let mut state = self.db.state.write();
            match state.store_mut(name) {
                Ok(store) => f(store, &mut inner.journal),
                Err(e) => Err(e),
            }
        };
        self.settle(&mut inner, result)
    }

    /// Runs a schema change. Version-change transactions only.
    pub(crate) fn write_schema<R>(
        &self,
        f: impl FnOnce(&mut DatabaseState, &mut Journal) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut inner = self.inner.lock();
        self.check_active(&inner)?;
        if self.mode != TransactionMode::VersionChange {
            return Err(CoreError::invalid_state(
                "schema changes require a version-change transaction",
            ));
        }
        let result = {
            let mut state = self.db.state.write();
            f(&mut state, &mut inner.journal)
        };
        self.settle(&mut inner, result)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.inner.get_mut().state == TransactionState::Active {
            if let Err(e) = self.finish() {
                warn!(txn = %self.id, error = %e, "implicit commit failed");
            }
        }
    }
}
