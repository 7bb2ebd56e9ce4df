//! # ShelfDB Testkit
//!
//! Test utilities for ShelfDB.
//!
//! This crate provides:
//! - Engine fixtures over memory and temporary files, with restart support
//! - Property-based generators and a reference model for store operations
//! - Crash simulation for the commit log
//! - Stress runners for concurrent transactions
//! - Commit log test vectors
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_testkit::prelude::*;
//!
//! let fixture = TestEngine::memory();
//! let db = scenarios::populated_library(&fixture, 3);
//! assert_eq!(db.count("books", None).unwrap(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
