//! Error types for the ShelfDB engine.

use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ShelfDB engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] shelfdb_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] shelfdb_codec::CodecError),

    /// Requested version is lower than the stored one.
    #[error("requested version {requested} is lower than stored version {stored}")]
    Version {
        /// Version passed to `open`.
        requested: u64,
        /// Version currently stored.
        stored: u64,
    },

    /// Primary key or unique index violation.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// No derivable key, a value that is not a valid key, or a malformed range.
    #[error("data error: {message}")]
    Data {
        /// Description of the problem.
        message: String,
    },

    /// Operation issued against a closed handle, a finished transaction,
    /// an exhausted cursor, or in the wrong transaction mode.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is not allowed.
        message: String,
    },

    /// Named database, object store or index does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// Transaction ended in the aborted state.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// Commit log could not be replayed.
    #[error("commit log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },
}

/// Coarse classification of [`CoreError`]s, mirroring the DOM exception
/// names callers of an IndexedDB-style API expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `VersionError`
    Version,
    /// `ConstraintError`
    Constraint,
    /// `DataError`
    Data,
    /// `InvalidStateError`
    InvalidState,
    /// `NotFoundError`
    NotFound,
    /// `AbortError`
    Abort,
    /// Failure below the engine (storage, codec, corrupt log).
    Internal,
}

impl CoreError {
    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a commit log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Version { .. } => ErrorKind::Version,
            Self::Constraint { .. } => ErrorKind::Constraint,
            Self::Data { .. } => ErrorKind::Data,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Aborted { .. } => ErrorKind::Abort,
            Self::Storage(_) | Self::Codec(_) | Self::LogCorruption { .. } => ErrorKind::Internal,
        }
    }

    /// Whether a failure of this kind, raised while an operation runs,
    /// aborts the enclosing transaction.
    ///
    /// Misuse errors (wrong mode, unknown store, finished transaction) are
    /// reported to the caller and leave the transaction as it was.
    #[must_use]
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Constraint | ErrorKind::Data | ErrorKind::Internal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_variants() {
        assert_eq!(CoreError::constraint("dup").kind(), ErrorKind::Constraint);
        assert_eq!(
            CoreError::Version {
                requested: 1,
                stored: 2
            }
            .kind(),
            ErrorKind::Version
        );
        assert_eq!(
            CoreError::log_corruption(0, "bad").kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn only_execution_failures_abort() {
        assert!(CoreError::constraint("dup").aborts_transaction());
        assert!(CoreError::data("no key").aborts_transaction());
        assert!(!CoreError::invalid_state("read-only").aborts_transaction());
        assert!(!CoreError::not_found("store").aborts_transaction());
    }

    #[test]
    fn messages_render() {
        let err = CoreError::Version {
            requested: 1,
            stored: 3,
        };
        assert_eq!(
            err.to_string(),
            "requested version 1 is lower than stored version 3"
        );
    }
}
