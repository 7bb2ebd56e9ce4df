//! Store-level lock manager.
//!
//! # Compatibility
//!
//! ```text
//!              │ Shared │ Exclusive │ Database │
//! ─────────────┼────────┼───────────┼──────────┤
//!    Shared    │   ✓    │  overlap  │    ✗     │
//!    Exclusive │overlap │  overlap  │    ✗     │
//!    Database  │   ✗    │     ✗     │    ✗     │
//! ```
//!
//! "overlap" means the two requests conflict only if their store scopes
//! intersect. Requests are granted in arrival order: a request also waits
//! for every earlier queued request it conflicts with, so a queued writer
//! or version change is not starved by a stream of readers.

use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use tracing::debug;

/// What a transaction locks for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LockRequest {
    /// Read lock over a set of stores.
    Shared(Vec<String>),
    /// Write lock over a set of stores.
    Exclusive(Vec<String>),
    /// Every store of the database, including ones not yet created.
    Database,
}

impl LockRequest {
    fn conflicts_with(&self, other: &LockRequest) -> bool {
        match (self, other) {
            (LockRequest::Database, _) | (_, LockRequest::Database) => true,
            (LockRequest::Shared(_), LockRequest::Shared(_)) => false,
            (
                LockRequest::Shared(a) | LockRequest::Exclusive(a),
                LockRequest::Shared(b) | LockRequest::Exclusive(b),
            ) => a.iter().any(|store| b.contains(store)),
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    held: HashMap<TransactionId, LockRequest>,
    /// Waiting requests by ticket, oldest first.
    queue: Vec<(u64, LockRequest)>,
    next_ticket: u64,
}

impl LockTable {
    fn grantable(&self, ticket: u64, request: &LockRequest) -> bool {
        self.held.values().all(|h| !h.conflicts_with(request))
            && self
                .queue
                .iter()
                .take_while(|(t, _)| *t < ticket)
                .all(|(_, q)| !q.conflicts_with(request))
    }
}

/// Blocking lock manager for one database.
#[derive(Debug, Default)]
pub(crate) struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl LockManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Blocks until `request` is compatible with every held lock and every
    /// earlier waiter, then records it as held by `txn`.
    pub(crate) fn acquire(&self, txn: TransactionId, request: LockRequest) {
        let mut table = self.table.lock();
        let ticket = table.next_ticket;
        table.next_ticket += 1;

        if !table.grantable(ticket, &request) {
            debug!(%txn, ?request, "waiting for lock");
            table.queue.push((ticket, request.clone()));
            while !table.grantable(ticket, &request) {
                self.released.wait(&mut table);
            }
            table.queue.retain(|(t, _)| *t != ticket);
            // Later waiters may have been blocked on this ticket alone.
            self.released.notify_all();
        }
        table.held.insert(txn, request);
    }

    /// Drops whatever `txn` holds and wakes waiters.
    pub(crate) fn release(&self, txn: TransactionId) {
        let mut table = self.table.lock();
        if table.held.remove(&txn).is_some() {
            self.released.notify_all();
        }
    }

    #[cfg(test)]
    pub(crate) fn held_count(&self) -> usize {
        self.table.lock().held.len()
    }
}
