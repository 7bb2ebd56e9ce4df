//! CLI command implementations.

pub mod checkpoint;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use crate::error::{CliError, CliResult};
use serde::Serialize;
use shelfdb_core::{Config, Engine};
use std::path::Path;

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn parse(s: &str) -> CliResult<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::Format(other.to_string())),
        }
    }
}

/// Prints `report` as pretty JSON, or through `text` otherwise.
pub fn emit<T: Serialize>(report: &T, format: Format, text: impl FnOnce(&T)) -> CliResult<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Text => text(report),
    }
    Ok(())
}

/// Opens an engine over an existing log.
pub fn open_engine(path: &Path) -> CliResult<Engine> {
    if !path.exists() {
        return Err(CliError::MissingLog(path.to_path_buf()));
    }
    Ok(Engine::open_with_config(
        path,
        Config::default().create_if_missing(false),
    )?)
}

/// Reads the raw log bytes without replaying or repairing them.
pub fn read_log(path: &Path) -> CliResult<Vec<u8>> {
    use shelfdb_storage::{FileBackend, StorageBackend};

    if !path.exists() {
        return Err(CliError::MissingLog(path.to_path_buf()));
    }
    let backend = FileBackend::open(path)?;
    Ok(backend.read_all()?)
}

#[cfg(test)]
pub(crate) mod testing {
    use shelfdb_core::{Engine, IndexParams, StoreParams, Value};
    use std::path::Path;

    /// Writes a small library log at `path`.
    pub fn write_library(path: &Path) {
        let engine = Engine::open_path(path).unwrap();
        let db = engine
            .open("library", 2, |txn, _, _| {
                let books = txn.create_object_store("books", StoreParams::new().key_path("isbn"))?;
                books.create_index("by_author", "author", IndexParams::new())?;
                txn.create_object_store("notes", StoreParams::new().auto_increment(true))?;
                Ok(())
            })
            .unwrap();
        for isbn in 1..=3 {
            let book = Value::object([("isbn", Value::from(isbn)), ("author", Value::from("Herbert"))]);
            db.put("books", book.clone()).unwrap();
            db.put("books", book).unwrap();
        }
        db.add("notes", Value::from("remember")).unwrap();
    }
}
