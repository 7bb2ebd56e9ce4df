//! The engine: registry of databases over one commit log.

use crate::config::Config;
use crate::database::{Database, DatabaseShared, DatabaseState};
use crate::error::{CoreError, CoreResult};
use crate::log::{CommitLog, LogOp, LogRecord};
use crate::transaction::{LockRequest, Transaction};
use crate::types::{TransactionId, TransactionMode};
use crate::upgrade::UpgradeHandler;
use parking_lot::Mutex;
use shelfdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one database in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Stored version.
    pub version: u64,
    /// Object store names.
    pub stores: Vec<String>,
}

#[derive(Debug)]
struct EngineInner {
    config: Config,
    log: Arc<CommitLog>,
    databases: Mutex<BTreeMap<String, Arc<DatabaseShared>>>,
    txn_ids: Arc<AtomicU64>,
}

/// Entry point: holds every database and the commit log they share.
///
/// The engine is an ordinary value; clones share the same registry.
///
/// ```
/// use shelfdb_core::{Engine, NoUpgrade};
///
/// let engine = Engine::open_in_memory();
/// let db = engine.open_with_handler("scratch", 1, &NoUpgrade).unwrap();
/// assert_eq!(db.version(), 1);
/// assert_eq!(engine.databases().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine whose log lives in memory.
    #[must_use]
    pub fn open_in_memory() -> Self {
        let config = Config::default().sync_on_commit(false);
        Self::from_parts(config, Box::new(InMemoryBackend::new()), BTreeMap::new())
    }

    /// Opens (or creates) an engine backed by the log file at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens an engine backed by the log file at `path` with `config`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is missing and `create_if_missing` is off;
    /// storage errors (including the file being locked by another engine);
    /// `LogCorruption` if the log cannot be replayed.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let path = path.as_ref();
        let backend = if config.create_if_missing {
            FileBackend::open_with_create_dirs(path)?
        } else {
            if !path.exists() {
                return Err(CoreError::not_found(format!(
                    "commit log {}",
                    path.display()
                )));
            }
            FileBackend::open(path)?
        };
        Self::open_with_backend(config, Box::new(backend))
    }

    /// Opens an engine over an arbitrary backend, replaying its log.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let log = CommitLog::new(backend, config.sync_on_commit, config.max_record_size);
        let scan = log.recover()?;

        let mut states: BTreeMap<String, DatabaseState> = BTreeMap::new();
        for entry in &scan.entries {
            match &entry.record {
                LogRecord::Commit { database, ops } => {
                    let state = states
                        .entry(database.clone())
                        .or_insert_with(|| DatabaseState::new(0));
                    for op in ops {
                        state.apply(op).map_err(|e| {
                            CoreError::log_corruption(
                                entry.offset,
                                format!("cannot replay {} on '{database}': {e}", op.name()),
                            )
                        })?;
                    }
                }
                LogRecord::DeleteDatabase { database } => {
                    states.remove(database);
                }
            }
        }

        info!(
            records = scan.entries.len(),
            databases = states.len(),
            bytes = scan.valid_len,
            "commit log replayed"
        );
        Ok(Self::from_parts_with_log(config, log, states))
    }

    fn from_parts(
        config: Config,
        backend: Box<dyn StorageBackend>,
        states: BTreeMap<String, DatabaseState>,
    ) -> Self {
        let log = CommitLog::new(backend, config.sync_on_commit, config.max_record_size);
        Self::from_parts_with_log(config, log, states)
    }

    fn from_parts_with_log(
        config: Config,
        log: CommitLog,
        states: BTreeMap<String, DatabaseState>,
    ) -> Self {
        let log = Arc::new(log);
        let txn_ids = Arc::new(AtomicU64::new(1));
        let databases = states
            .into_iter()
            .map(|(name, state)| {
                let shared = DatabaseShared::new(
                    name.clone(),
                    state,
                    Arc::clone(&log),
                    Arc::clone(&txn_ids),
                );
                (name, Arc::new(shared))
            })
            .collect();
        Self {
            inner: Arc::new(EngineInner {
                config,
                log,
                databases: Mutex::new(databases),
                txn_ids,
            }),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Registry entry for `name`, replacing one left by a deletion.
    fn shared_for(&self, name: &str) -> Arc<DatabaseShared> {
        let mut databases = self.inner.databases.lock();
        if let Some(existing) = databases.get(name) {
            if !existing.state.read().deleted {
                return Arc::clone(existing);
            }
        }
        let shared = Arc::new(DatabaseShared::new(
            name.to_string(),
            DatabaseState::new(0),
            Arc::clone(&self.inner.log),
            Arc::clone(&self.inner.txn_ids),
        ));
        databases.insert(name.to_string(), Arc::clone(&shared));
        shared
    }

    /// Opens `name` at `version`, upgrading it first if the stored
    /// version is lower.
    ///
    /// Blocks while another open of the same database is upgrading it, and
    /// while any transaction on it is active if an upgrade is needed.
    ///
    /// # Errors
    ///
    /// `Data` if `version` is zero; `Version` if it is lower than the
    /// stored version (the handler is not called); whatever the handler
    /// returned if the upgrade failed, in which case nothing it did is
    /// kept.
    pub fn open<F>(&self, name: &str, version: u64, upgrade: F) -> CoreResult<Database>
    where
        F: FnOnce(&Transaction, u64, u64) -> CoreResult<()>,
    {
        if version == 0 || i64::try_from(version).is_err() {
            return Err(CoreError::data(format!(
                "database version must be between 1 and {}, got {version}",
                i64::MAX
            )));
        }

        loop {
            let shared = self.shared_for(name);
            let _gate = shared.open_gate.lock();
            let stored = {
                let state = shared.state.read();
                if state.deleted {
                    // Deleted while we waited; look the name up again.
                    continue;
                }
                state.version
            };

            if version < stored {
                return Err(CoreError::Version {
                    requested: version,
                    stored,
                });
            }
            if version == stored {
                return Ok(Database::new(Arc::clone(&shared), version));
            }

            if stored == 0 {
                info!(database = name, version, "creating database");
            } else {
                info!(database = name, from = stored, to = version, "upgrading database");
            }

            let txn = Transaction::begin(Arc::clone(&shared), TransactionMode::VersionChange, Vec::new())?;
            txn.write_schema(|state, journal| {
                state.version = version;
                journal.schema(LogOp::SetVersion { version });
                Ok(())
            })?;

            if let Err(e) = upgrade(&txn, stored, version) {
                warn!(database = name, error = %e, "upgrade failed");
                if !txn.state().is_finished() {
                    if let Err(abort) = txn.abort() {
                        warn!(database = name, error = %abort, "could not abort failed upgrade");
                    }
                }
                return Err(e);
            }
            txn.commit()?;
            return Ok(Database::new(Arc::clone(&shared), version));
        }
    }

    /// [`Engine::open`] with an [`UpgradeHandler`], such as an
    /// [`crate::UpgradePlan`].
    pub fn open_with_handler(
        &self,
        name: &str,
        version: u64,
        handler: &dyn UpgradeHandler,
    ) -> CoreResult<Database> {
        self.open(name, version, |txn, old, new| handler.upgrade(txn, old, new))
    }

    /// Databases that completed at least one upgrade.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.inner
            .databases
            .lock()
            .values()
            .filter_map(|db| {
                let state = db.state.read();
                (!state.deleted && state.version > 0).then(|| DatabaseInfo {
                    name: db.name.clone(),
                    version: state.version,
                    stores: state.stores.keys().cloned().collect(),
                })
            })
            .collect()
    }

    /// Deletes a database, waiting for its active transactions to finish.
    ///
    /// Existing connections refuse new transactions afterwards. Deleting a
    /// database that does not exist succeeds.
    pub fn delete_database(&self, name: &str) -> CoreResult<()> {
        let Some(shared) = self.inner.databases.lock().get(name).cloned() else {
            return Ok(());
        };
        {
            let _gate = shared.open_gate.lock();
            if shared.state.read().deleted {
                return Ok(());
            }

            let id = shared.next_transaction_id();
            shared.locks.acquire(id, LockRequest::Database);
            let result = self.inner.log.append(&LogRecord::DeleteDatabase {
                database: name.to_string(),
            });
            if result.is_ok() {
                let mut state = shared.state.write();
                state.deleted = true;
                state.stores.clear();
            }
            shared.locks.release(id);
            result?;
        }

        // Locks are taken registry, gate, database; never the registry
        // while holding either of the others.
        let mut databases = self.inner.databases.lock();
        if databases
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, &shared))
        {
            databases.remove(name);
        }
        info!(database = name, "database deleted");
        Ok(())
    }

    /// Rewrites the commit log as one snapshot record per database.
    ///
    /// Waits until no transaction is active on any database and holds off
    /// new ones while it runs. Opening or listing databases does not wait.
    /// Returns the new log size in bytes.
    ///
    /// # Errors
    ///
    /// Storage errors from writing the snapshot. Committed data is kept
    /// either way.
    pub fn checkpoint(&self) -> CoreResult<u64> {
        loop {
            let dbs: Vec<Arc<DatabaseShared>> =
                self.inner.databases.lock().values().cloned().collect();

            let id = TransactionId::new(self.inner.txn_ids.fetch_add(1, Ordering::SeqCst));
            for db in &dbs {
                db.locks.acquire(id, LockRequest::Database);
            }

            let mut written = 0;
            // Runs under the log lock, so no commit lands in between.
            let result = self.inner.log.rewrite_with(|| {
                let databases = self.inner.databases.lock();
                let unchanged = databases.len() == dbs.len()
                    && databases.values().zip(&dbs).all(|(a, b)| Arc::ptr_eq(a, b));
                if !unchanged {
                    return None;
                }
                let records: Vec<LogRecord> = dbs
                    .iter()
                    .filter_map(|db| {
                        let state = db.state.read();
                        (!state.deleted && state.version > 0).then(|| LogRecord::Commit {
                            database: db.name.clone(),
                            ops: state.snapshot_ops(),
                        })
                    })
                    .collect();
                written = records.len();
                Some(records)
            });

            for db in &dbs {
                db.locks.release(id);
            }
            match result? {
                Some(bytes) => {
                    info!(databases = written, bytes, "checkpoint written");
                    return Ok(bytes);
                }
                None => debug!("databases changed during checkpoint, retrying"),
            }
        }
    }

    /// Current size of the commit log in bytes.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.inner.log.size()
    }
}
