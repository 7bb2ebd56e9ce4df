//! Per-transaction record of changes.

use crate::database::DatabaseState;
use crate::key::Key;
use crate::log::LogOp;
use crate::store::StoreData;
use shelfdb_codec::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// How to reverse one applied change.
#[derive(Debug)]
pub(crate) enum Undo {
    /// Put back `previous` (or remove the record if `None`).
    Record {
        store: String,
        key: Key,
        previous: Option<Value>,
    },
    /// Restore records removed by a clear.
    Cleared {
        store: String,
        records: BTreeMap<Key, Value>,
    },
    /// Reset the key generator.
    Generator { store: String, previous: Option<i64> },
}

/// Undo entries plus the log operations a commit will write.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    undo: Vec<Undo>,
    ops: Vec<LogOp>,
}

impl Journal {
    pub(crate) fn record(&mut self, store: &str, key: Key, previous: Option<Value>, new: Option<Value>) {
        self.ops.push(match new {
            Some(value) => LogOp::Put {
                store: store.to_string(),
                key: key.clone(),
                value,
            },
            None => LogOp::Delete {
                store: store.to_string(),
                key: key.clone(),
            },
        });
        self.undo.push(Undo::Record {
            store: store.to_string(),
            key,
            previous,
        });
    }

    pub(crate) fn cleared(&mut self, store: &str, records: BTreeMap<Key, Value>) {
        self.ops.push(LogOp::Clear {
            store: store.to_string(),
        });
        self.undo.push(Undo::Cleared {
            store: store.to_string(),
            records,
        });
    }

    /// Notes a generator move if `store` advanced past `before`.
    pub(crate) fn generator(&mut self, store: &StoreData, before: Option<i64>) {
        let after = store.generator();
        if after != before {
            self.ops.push(LogOp::Generator {
                store: store.meta.name.clone(),
                next: after,
            });
            self.undo.push(Undo::Generator {
                store: store.meta.name.clone(),
                previous: before,
            });
        }
    }

    /// Schema change; reversed by restoring the version-change backup.
    pub(crate) fn schema(&mut self, op: LogOp) {
        self.ops.push(op);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Hands over the log operations. Undo entries stay until
    /// [`Journal::clear`] so a failed append can still roll back.
    pub(crate) fn take_ops(&mut self) -> Vec<LogOp> {
        std::mem::take(&mut self.ops)
    }

    pub(crate) fn clear(&mut self) {
        self.undo.clear();
        self.ops.clear();
    }

    /// Reverses every recorded change, newest first.
    pub(crate) fn rollback(&mut self, state: &mut DatabaseState) {
        self.ops.clear();
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Record {
                    store,
                    key,
                    previous,
                } => {
                    if let Ok(data) = state.store_mut(&store) {
                        if let Err(e) = data.write(&key, previous) {
                            warn!(%store, %key, error = %e, "failed to undo record change");
                        }
                    }
                }
                Undo::Cleared { store, records } => {
                    if let Ok(data) = state.store_mut(&store) {
                        data.restore(records);
                    }
                }
                Undo::Generator { store, previous } => {
                    if let Ok(data) = state.store_mut(&store) {
                        data.set_generator(previous);
                    }
                }
            }
        }
    }
}
