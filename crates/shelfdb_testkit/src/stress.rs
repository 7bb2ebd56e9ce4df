//! Stress runners for ShelfDB.
//!
//! These drive many transactions, sequentially or from several threads,
//! against one database and report throughput and failures.

use crate::fixtures::scenarios;
use serde::Serialize;
use shelfdb_core::{Database, Direction, TransactionMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// The result as one line of JSON, for collecting runs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Failed to serialize stress result")
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of distinct books written.
    pub book_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            book_count: 1_000,
        }
    }
}

fn isbn_for(op: usize, config: &StressConfig) -> i64 {
    (op % config.book_count.max(1)) as i64 + 1
}

fn author_for(isbn: i64) -> &'static str {
    scenarios::AUTHORS[(isbn as usize) % scenarios::AUTHORS.len()]
}

/// Puts books one transaction at a time. `db` must have the library schema.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut ok = 0;
    let mut failed = 0;
    for op in 0..config.operations {
        let isbn = isbn_for(op, config);
        let book = scenarios::book(isbn, &format!("rev{op}"), author_for(isbn), 1900 + isbn);
        match db.put("books", book) {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
    }
    StressTestResult::new(ok, failed, start.elapsed())
}

/// Reads through the author index with cursors, counting each walk as
/// one operation.
pub fn stress_index_scans(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut ok = 0;
    let mut failed = 0;
    for op in 0..config.operations {
        let author = scenarios::AUTHORS[op % scenarios::AUTHORS.len()];
        let walked = db.run(["books"], TransactionMode::ReadOnly, |txn| {
            let index = txn.object_store("books")?.index("by_author")?;
            let mut cursor = index.open_cursor(Some(author.into()), Direction::Next)?;
            let mut seen = 0usize;
            while !cursor.is_exhausted() {
                seen += 1;
                cursor.advance()?;
            }
            Ok(seen)
        });
        match walked {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
    }
    StressTestResult::new(ok, failed, start.elapsed())
}

/// Runs writers and readers on several threads at once.
///
/// Each thread does `operations / threads` transactions; even threads
/// write books, odd threads count them.
pub fn stress_concurrent_mixed(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let ok = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let per_thread = config.operations / config.threads.max(1);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let ok = Arc::clone(&ok);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            thread::spawn(move || {
                for i in 0..per_thread {
                    let result = if t % 2 == 0 {
                        let isbn = isbn_for(t * per_thread + i, &config);
                        db.put("books", scenarios::book(isbn, "t", author_for(isbn), 2000))
                            .map(|_| ())
                    } else {
                        db.count("books", None).map(|_| ())
                    };
                    let counter = if result.is_ok() { &ok } else { &failed };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(per_thread, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        ok.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Starts transactions that write and then abort. Every abort that goes
/// through counts as a success.
pub fn stress_transaction_aborts(db: &Database, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut ok = 0;
    let mut failed = 0;
    for op in 0..config.operations {
        let outcome = db
            .transaction(["books"], TransactionMode::ReadWrite)
            .and_then(|txn| {
                let isbn = isbn_for(op, config);
                txn.object_store("books")?
                    .put(scenarios::book(isbn, "aborted", "nobody", 0))?;
                txn.abort()
            });
        match outcome {
            Ok(()) => ok += 1,
            Err(_) => failed += 1,
        }
    }
    StressTestResult::new(ok, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestEngine;
    use shelfdb_codec::Value;

    fn small() -> StressConfig {
        StressConfig {
            operations: 200,
            threads: 4,
            book_count: 50,
        }
    }

    #[test]
    fn sequential_writes_all_succeed() {
        let fixture = TestEngine::memory();
        let db = scenarios::open_library(&fixture);
        let result = stress_sequential_writes(&db, &small());
        assert_eq!(result.successful_ops, 200);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(db.count("books", None).unwrap(), 50);
    }

    #[test]
    fn index_scans_all_succeed() {
        let fixture = TestEngine::memory();
        let db = scenarios::populated_library(&fixture, 25);
        let result = stress_index_scans(&db, &small());
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn concurrent_mixed_keeps_index_consistent() {
        let fixture = TestEngine::memory();
        let db = Arc::new(scenarios::open_library(&fixture));
        let result = stress_concurrent_mixed(Arc::clone(&db), &small());
        assert_eq!(result.total_ops, 200);
        assert_eq!(result.failed_ops, 0);

        let by_index: usize = scenarios::AUTHORS
            .iter()
            .map(|a| {
                db.get_all_from_index("books", "by_author", Some((*a).into()))
                    .unwrap()
                    .len()
            })
            .sum();
        assert_eq!(by_index as u64, db.count("books", None).unwrap());
    }

    #[test]
    fn aborts_leave_no_trace() {
        let fixture = TestEngine::memory();
        let db = scenarios::populated_library(&fixture, 5);
        let before = fixture.log_bytes().len();
        let result = stress_transaction_aborts(&db, &small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(fixture.log_bytes().len(), before);
        let titles: Vec<Value> = db
            .get_all("books", None)
            .unwrap()
            .iter()
            .filter_map(|b| b.get_path("title").cloned())
            .collect();
        assert!(!titles.contains(&Value::from("aborted")));
    }

    #[test]
    fn result_serializes() {
        let result = StressTestResult::new(3, 1, Duration::from_millis(20));
        let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(json["total_ops"], 4);
        assert_eq!(json["duration"], 20);
    }
}
