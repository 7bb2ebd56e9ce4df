//! Inspect command implementation.

use super::{emit, open_engine, Format};
use crate::error::CliResult;
use serde::Serialize;
use shelfdb_core::{Engine, TransactionMode};
use std::path::Path;

/// Log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log size in bytes.
    pub log_size: u64,
    /// Live databases.
    pub databases: Vec<DatabaseStats>,
}

/// Statistics for a single database.
#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    /// Database name.
    pub name: String,
    /// Schema version.
    pub version: u64,
    /// Store names, or full details when requested.
    pub stores: Vec<StoreStats>,
}

/// Statistics for a single object store.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    /// Store name.
    pub name: String,
    /// Number of records (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<u64>,
    /// In-line key path, if any (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// Whether keys are generated (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
    /// Index names (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<String>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_stores: bool, format: &str) -> CliResult<()> {
    let format = Format::parse(format)?;
    let engine = open_engine(path)?;
    let result = inspect(&engine, path, show_stores)?;
    emit(&result, format, print_text_output)
}

pub(crate) fn inspect(engine: &Engine, path: &Path, show_stores: bool) -> CliResult<InspectResult> {
    let mut databases = Vec::new();
    for info in engine.databases() {
        let stores = if show_stores && !info.stores.is_empty() {
            let db = engine.open(&info.name, info.version, |_, _, _| Ok(()))?;
            db.run(info.stores.clone(), TransactionMode::ReadOnly, |txn| {
                info.stores
                    .iter()
                    .map(|name| {
                        let store = txn.object_store(name)?;
                        Ok(StoreStats {
                            name: name.clone(),
                            records: Some(store.count(None)?),
                            key_path: store.key_path()?.map(|p| p.to_string()),
                            auto_increment: Some(store.auto_increment()?),
                            indexes: Some(store.index_names()?),
                        })
                    })
                    .collect::<shelfdb_core::CoreResult<Vec<_>>>()
            })?
        } else {
            info.stores
                .iter()
                .map(|name| StoreStats {
                    name: name.clone(),
                    records: None,
                    key_path: None,
                    auto_increment: None,
                    indexes: None,
                })
                .collect()
        };
        databases.push(DatabaseStats {
            name: info.name,
            version: info.version,
            stores,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: engine.log_size()?,
        databases,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("ShelfDB Log Inspection");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!("Log size: {} bytes", result.log_size);
    println!("Databases: {}", result.databases.len());

    for db in &result.databases {
        println!();
        println!("{} (version {})", db.name, db.version);
        for store in &db.stores {
            match store.records {
                Some(records) => {
                    let key = store.key_path.as_deref().unwrap_or("<out-of-line>");
                    let generated = if store.auto_increment == Some(true) {
                        ", auto-increment"
                    } else {
                        ""
                    };
                    println!("  {}: {} records, key {}{}", store.name, records, key, generated);
                    for index in store.indexes.iter().flatten() {
                        println!("    index {index}");
                    }
                }
                None => println!("  {}", store.name),
            }
        }
    }
}
