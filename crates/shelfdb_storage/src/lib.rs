//! # ShelfDB Storage
//!
//! Byte-level backends underneath the ShelfDB commit log.
//!
//! A backend is an opaque, append-only byte store. It knows nothing about
//! databases, object stores or log framing; `shelfdb_core` owns every byte
//! of interpretation.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral; clones share one buffer so an engine can
//!   be "restarted" over the same bytes in tests
//! - [`FileBackend`] - a single file, exclusively locked by one process
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
