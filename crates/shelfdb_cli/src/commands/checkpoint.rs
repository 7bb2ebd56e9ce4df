//! Checkpoint command implementation.

use super::open_engine;
use crate::error::CliResult;
use std::path::Path;
use tracing::debug;

/// Log sizes around a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointOutcome {
    /// Size before the rewrite.
    pub before: u64,
    /// Size after; `None` for a dry run.
    pub after: Option<u64>,
}

/// Runs the checkpoint command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    let outcome = checkpoint(path, dry_run)?;
    match outcome.after {
        None => {
            println!("Dry run: commit log at {}", path.display());
            println!("  Current size: {} bytes", outcome.before);
        }
        Some(after) => {
            println!("✓ Checkpoint written to {}", path.display());
            println!("  Before: {} bytes", outcome.before);
            println!("  After:  {after} bytes");
        }
    }
    Ok(())
}

pub(crate) fn checkpoint(path: &Path, dry_run: bool) -> CliResult<CheckpointOutcome> {
    let engine = open_engine(path)?;
    let before = engine.log_size()?;
    debug!(before, dry_run, "checkpoint requested");
    let after = if dry_run {
        None
    } else {
        Some(engine.checkpoint()?)
    };
    Ok(CheckpointOutcome { before, after })
}
