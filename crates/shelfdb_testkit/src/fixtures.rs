//! Test fixtures and engine helpers.
//!
//! Provides engines over memory or a temporary file that can be
//! restarted over the same commit log, plus a small library schema used
//! across tests and benchmarks.

use shelfdb_core::{Config, Database, Engine};
use shelfdb_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

enum Storage {
    Memory(InMemoryBackend),
    File { path: PathBuf, _dir: TempDir },
}

/// A test engine with automatic cleanup.
pub struct TestEngine {
    engine: Engine,
    storage: Storage,
}

impl TestEngine {
    /// Creates an engine over an in-memory commit log.
    pub fn memory() -> Self {
        let backend = InMemoryBackend::new();
        Self {
            engine: open_memory(&backend),
            storage: Storage::Memory(backend),
        }
    }

    /// Creates an engine over a commit log in a temporary directory.
    pub fn file() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("test.shelf");
        Self {
            engine: Engine::open_path(&path).expect("Failed to open file engine"),
            storage: Storage::File { path, _dir: dir },
        }
    }

    /// The engine under test.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns the commit log path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Memory(_) => None,
            Storage::File { path, .. } => Some(path),
        }
    }

    /// Current commit log contents.
    pub fn log_bytes(&self) -> Vec<u8> {
        match &self.storage {
            Storage::Memory(backend) => backend.data(),
            Storage::File { path, .. } => std::fs::read(path).expect("Failed to read commit log"),
        }
    }

    /// Closes the engine and opens a new one over the same commit log.
    ///
    /// File engines need every [`Database`] handle dropped first, or the
    /// log is still locked.
    pub fn restart(self) -> Self {
        let Self { engine, storage } = self;
        drop(engine);
        let engine = match &storage {
            Storage::Memory(backend) => open_memory(backend),
            Storage::File { path, .. } => {
                Engine::open_path(path).expect("Failed to reopen file engine")
            }
        };
        Self { engine, storage }
    }
}

fn open_memory(backend: &InMemoryBackend) -> Engine {
    Engine::open_with_backend(
        Config::default().sync_on_commit(false),
        Box::new(backend.clone()),
    )
    .expect("Failed to open in-memory engine")
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with a temporary in-memory engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let fixture = TestEngine::memory();
    f(&fixture)
}

/// Runs a test with a temporary file-based engine.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine, &Path) -> R,
{
    let fixture = TestEngine::file();
    let path = fixture
        .path()
        .expect("File engine should have a path")
        .to_path_buf();
    f(&fixture, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use shelfdb_codec::Value;
    use shelfdb_core::{IndexParams, StoreParams, UpgradePlan};

    /// Name of the library database.
    pub const LIBRARY: &str = "library";

    /// The library schema as an upgrade plan, currently at version 3.
    pub fn library_plan() -> UpgradePlan {
        UpgradePlan::new()
            .step(0, "create_books", |txn| {
                let books = txn.create_object_store("books", StoreParams::new().key_path("isbn"))?;
                books.create_index("by_author", "author", IndexParams::new())?;
                Ok(())
            })
            .step(1, "index_years", |txn| {
                txn.object_store("books")?
                    .create_index("by_year", "year", IndexParams::new())?;
                Ok(())
            })
            .step(2, "create_loans", |txn| {
                let loans = txn.create_object_store(
                    "loans",
                    StoreParams::new().key_path("id").auto_increment(true),
                )?;
                loans.create_index("by_isbn", "isbn", IndexParams::new())?;
                Ok(())
            })
    }

    /// A book record.
    pub fn book(isbn: i64, title: &str, author: &str, year: i64) -> Value {
        Value::object([
            ("isbn", Value::from(isbn)),
            ("title", Value::from(title)),
            ("author", Value::from(author)),
            ("year", Value::from(year)),
        ])
    }

    /// Opens the library at the plan's latest version.
    pub fn open_library(engine: &Engine) -> Database {
        let plan = library_plan();
        engine
            .open_with_handler(LIBRARY, plan.target_version(), &plan)
            .expect("Failed to open library")
    }

    /// Opens the library and adds `count` books, one transaction each.
    ///
    /// Books get ISBNs `1..=count`, one of five authors, and years
    /// starting at 1950.
    pub fn populated_library(engine: &Engine, count: usize) -> Database {
        let db = open_library(engine);
        for i in 1..=count as i64 {
            let author = AUTHORS[(i as usize) % AUTHORS.len()];
            db.add("books", book(i, &format!("Book {i}"), author, 1950 + i))
                .expect("Failed to add book");
        }
        db
    }

    /// Authors cycled through by [`populated_library`].
    pub const AUTHORS: [&str; 5] = ["Austen", "Butler", "Herbert", "Le Guin", "Tolkien"];
}
