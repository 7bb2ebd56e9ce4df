//! # ShelfDB Core
//!
//! An embedded, versioned object-store engine.
//!
//! - An [`Engine`] holds named databases over one commit log.
//! - A [`Database`] has a version and a set of object stores. Raising the
//!   version runs an upgrade in a version-change transaction, the only
//!   place stores and indexes can be created or removed.
//! - An [`ObjectStore`] maps ordered [`Key`]s to [`Value`] records and owns
//!   its [`Index`]es, which are kept in step with every write.
//! - All access goes through a [`Transaction`]; any failure aborts it and
//!   undoes everything it did.
//! - A [`Cursor`] walks a store or index in either direction over an
//!   optional [`KeyRange`].
//!
//! ```
//! use shelfdb_core::{Engine, IndexParams, KeyRange, StoreParams, TransactionMode, Value};
//!
//! let engine = Engine::open_in_memory();
//! let db = engine
//!     .open("library", 1, |txn, _old, _new| {
//!         let books = txn.create_object_store("books", StoreParams::new().key_path("isbn"))?;
//!         books.create_index("by_year", "year", IndexParams::new())?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! for (isbn, year) in [(1, 1965), (2, 1951), (3, 1985)] {
//!     db.add("books", Value::object([("isbn", Value::from(isbn)), ("year", Value::from(year))]))
//!         .unwrap();
//! }
//!
//! let modern = db
//!     .get_all_from_index("books", "by_year", Some(KeyRange::lower_bound(1960, false)))
//!     .unwrap();
//! assert_eq!(modern.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod database;
mod engine;
mod error;
mod index;
mod key;
pub mod log;
mod range;
mod store;
mod transaction;
mod types;
mod upgrade;

pub use config::Config;
pub use cursor::Cursor;
pub use database::Database;
pub use engine::{DatabaseInfo, Engine};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use index::{Index, IndexParams};
pub use key::{Key, KeyPath};
pub use range::KeyRange;
pub use shelfdb_codec::Value;
pub use store::{ObjectStore, StoreParams};
pub use transaction::Transaction;
pub use types::{Direction, TransactionId, TransactionMode, TransactionState};
pub use upgrade::{NoUpgrade, UpgradeHandler, UpgradePlan, UpgradeStep, UpgradeStepInfo};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
