//! Upgrade handlers and multi-step upgrade plans.
//!
//! Opening a database at a higher version than the stored one runs an
//! upgrade inside a single version-change transaction. The handler gets
//! that transaction plus the old and new versions. It may create and delete
//! stores and indexes and read or write records. Returning an error aborts
//! the upgrade and the open; the stored version stays where it was.
//!
//! ## Plans
//!
//! An [`UpgradePlan`] lists steps keyed by the version they upgrade *from*.
//! Upgrading `old → new` runs every step with `old <= from < new` in
//! ascending order, so a fresh database (old = 0) and one that went through
//! each version in turn end up with the same schema.
//!
//! ```
//! use shelfdb_core::{Engine, IndexParams, StoreParams, UpgradePlan};
//!
//! let plan = UpgradePlan::new()
//!     .step(0, "create_books", |txn| {
//!         txn.create_object_store("books", StoreParams::new().key_path("isbn"))?;
//!         Ok(())
//!     })
//!     .step(1, "index_authors", |txn| {
//!         txn.object_store("books")?
//!             .create_index("by_author", "author", IndexParams::new())?;
//!         Ok(())
//!     });
//!
//! let engine = Engine::open_in_memory();
//! let db = engine.open_with_handler("library", plan.target_version(), &plan).unwrap();
//! assert_eq!(db.version(), 2);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use std::collections::BTreeMap;
use tracing::debug;

/// Runs the upgrade of a database from `old` to `new`.
pub trait UpgradeHandler {
    /// Performs the upgrade through `txn`.
    fn upgrade(&self, txn: &Transaction, old: u64, new: u64) -> CoreResult<()>;
}

impl<F> UpgradeHandler for F
where
    F: Fn(&Transaction, u64, u64) -> CoreResult<()>,
{
    fn upgrade(&self, txn: &Transaction, old: u64, new: u64) -> CoreResult<()> {
        self(txn, old, new)
    }
}

/// Handler for databases that need no schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpgrade;

impl UpgradeHandler for NoUpgrade {
    fn upgrade(&self, _txn: &Transaction, _old: u64, _new: u64) -> CoreResult<()> {
        Ok(())
    }
}

/// One step of an [`UpgradePlan`].
pub trait UpgradeStep: Send + Sync {
    /// Version this step upgrades from.
    fn from_version(&self) -> u64;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Applies the step.
    fn apply(&self, txn: &Transaction) -> CoreResult<()>;
}

struct FnStep<F> {
    from_version: u64,
    name: String,
    f: F,
}

impl<F> UpgradeStep for FnStep<F>
where
    F: Fn(&Transaction) -> CoreResult<()> + Send + Sync,
{
    fn from_version(&self) -> u64 {
        self.from_version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, txn: &Transaction) -> CoreResult<()> {
        (self.f)(txn)
    }
}

/// Description of a registered step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeStepInfo {
    /// Version the step upgrades from.
    pub from_version: u64,
    /// Step name.
    pub name: String,
}

/// Ordered upgrade steps.
#[derive(Default)]
pub struct UpgradePlan {
    steps: BTreeMap<u64, Box<dyn UpgradeStep>>,
}

impl UpgradePlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a closure step. A later step for the same version replaces the
    /// earlier one.
    #[must_use]
    pub fn step<F>(mut self, from_version: u64, name: &str, f: F) -> Self
    where
        F: Fn(&Transaction) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.steps.insert(
            from_version,
            Box::new(FnStep {
                from_version,
                name: name.to_string(),
                f,
            }),
        );
        self
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// `Constraint` if a step for the same version is already registered.
    pub fn register(&mut self, step: Box<dyn UpgradeStep>) -> CoreResult<()> {
        let version = step.from_version();
        if self.steps.contains_key(&version) {
            return Err(CoreError::constraint(format!(
                "upgrade step from version {version} already registered"
            )));
        }
        self.steps.insert(version, step);
        Ok(())
    }

    /// Every registered step, in order.
    #[must_use]
    pub fn list(&self) -> Vec<UpgradeStepInfo> {
        self.steps.values().map(|s| info(s.as_ref())).collect()
    }

    /// Steps an upgrade from `old` to `new` would run.
    #[must_use]
    pub fn pending(&self, old: u64, new: u64) -> Vec<UpgradeStepInfo> {
        if old >= new {
            return Vec::new();
        }
        self.steps
            .range(old..new)
            .map(|(_, s)| info(s.as_ref()))
            .collect()
    }

    /// Version reached after the last step, or 1 for an empty plan.
    #[must_use]
    pub fn target_version(&self) -> u64 {
        self.steps.keys().next_back().map_or(1, |v| v + 1)
    }
}

fn info(step: &dyn UpgradeStep) -> UpgradeStepInfo {
    UpgradeStepInfo {
        from_version: step.from_version(),
        name: step.name().to_string(),
    }
}

impl UpgradeHandler for UpgradePlan {
    fn upgrade(&self, txn: &Transaction, old: u64, new: u64) -> CoreResult<()> {
        if old >= new {
            return Ok(());
        }
        for (from, step) in self.steps.range(old..new) {
            debug!(from, step = step.name(), "running upgrade step");
            step.apply(txn)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for UpgradePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradePlan")
            .field("steps", &self.list())
            .finish()
    }
}
