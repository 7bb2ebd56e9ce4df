//! Core type definitions for ShelfDB.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing within one engine and
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Shared access to the scoped stores; no mutations.
    ReadOnly,
    /// Exclusive access to the scoped stores.
    ReadWrite,
    /// Exclusive access to the whole database, schema changes allowed.
    /// Only started by [`Engine::open`](crate::Engine::open).
    VersionChange,
}

impl TransactionMode {
    /// Whether records may be mutated in this mode.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
            Self::VersionChange => "versionchange",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations.
    Active,
    /// Writing its changes to the commit log.
    Committing,
    /// Changes are durable and visible.
    Committed,
    /// Every change has been rolled back.
    Aborted,
}

impl TransactionState {
    /// Whether the transaction reached a terminal state.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Iteration order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Ascending, visiting only the first record of each distinct key.
    NextUnique,
    /// Descending key order.
    Prev,
    /// Descending, visiting only the first record of each distinct key.
    PrevUnique,
}

impl Direction {
    /// Whether keys are visited in descending order.
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Self::Prev | Self::PrevUnique)
    }

    /// Whether duplicate keys are skipped.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Self::NextUnique | Self::PrevUnique)
    }
}
