//! CLI error type.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for command implementations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The commit log does not exist.
    #[error("no commit log at {}", .0.display())]
    MissingLog(PathBuf),

    /// An unknown `--format` value.
    #[error("unsupported output format '{0}' (expected text or json)")]
    Format(String),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerifyFailed(usize),

    /// Engine failure.
    #[error(transparent)]
    Core(#[from] shelfdb_core::CoreError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] shelfdb_storage::StorageError),

    /// JSON output failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
