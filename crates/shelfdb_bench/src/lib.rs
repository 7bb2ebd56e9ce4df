//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;
use shelfdb_core::{CoreResult, Database, Engine, IndexParams, StoreParams, Value};

/// Store every benchmark database uses.
pub const STORE: &str = "items";

/// Index over the `group` field of [`STORE`].
pub const BY_GROUP: &str = "by_group";

const TAGS: [&str; 6] = ["red", "green", "blue", "cyan", "magenta", "yellow"];

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a record with in-line key `id` and a payload of `payload` bytes.
pub fn record(id: i64, payload: usize) -> Value {
    let mut rng = rand::thread_rng();
    let tags: Vec<Value> = TAGS
        .choose_multiple(&mut rng, 2)
        .map(|t| Value::from(*t))
        .collect();
    Value::object([
        ("id", Value::from(id)),
        ("group", Value::from(rng.gen_range(0..100_i64))),
        ("tags", Value::from(tags)),
        ("payload", Value::from(random_data(payload))),
    ])
}

/// Opens the benchmark database on `engine`: one store keyed by `id`
/// with a plain index on `group` and a multi-entry index on `tags`.
pub fn open_bench_db(engine: &Engine) -> CoreResult<Database> {
    engine.open("bench", 1, |txn, _, _| {
        let store = txn.create_object_store(STORE, StoreParams::new().key_path("id"))?;
        store.create_index(BY_GROUP, "group", IndexParams::new())?;
        store.create_index("by_tag", "tags", IndexParams::new().multi_entry(true))?;
        Ok(())
    })
}

/// Fills [`STORE`] with `count` records in one transaction.
pub fn populate(db: &Database, count: i64, payload: usize) -> CoreResult<()> {
    db.run([STORE], shelfdb_core::TransactionMode::ReadWrite, |txn| {
        let store = txn.object_store(STORE)?;
        for id in 0..count {
            store.put(record(id, payload))?;
        }
        Ok(())
    })
}
