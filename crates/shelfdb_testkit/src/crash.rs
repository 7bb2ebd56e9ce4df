//! Crash simulation for the commit log.
//!
//! [`CrashableBackend`] wraps an in-memory log and can be armed to fail a
//! write part-way through, leaving a torn record behind exactly as a power
//! cut would. [`CrashRecoveryHarness`] drives the library schema through
//! such crashes and checks what a restarted engine sees.
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! harness.run_all_tests();
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::scenarios;
use shelfdb_core::{Config, CoreResult, Database, Engine};
use shelfdb_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash before any byte of the commit record is written.
    BeforeWrite,
    /// Crash after part of the commit record is written.
    DuringWrite,
    /// Crash after the record is written but before it is synced.
    BeforeSync,
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected books after recovery.
    pub expected_books: u64,
    /// Actual books after recovery.
    pub actual_books: u64,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, books: u64) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_books: books,
            actual_books: books,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: u64, actual: u64, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_books: expected,
            actual_books: actual,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug)]
struct CrashState {
    /// Bytes still allowed before the crash; `usize::MAX` when disarmed.
    budget: AtomicUsize,
    fail_on_sync: AtomicBool,
    crashed: AtomicBool,
    /// Log length at the last successful sync.
    synced: AtomicU64,
    /// Whether the crash lost everything written since that sync.
    lost_unsynced: AtomicBool,
}

/// A storage backend that can simulate crashes.
///
/// Clones share both the bytes and the crash switch, so a test can keep
/// one handle while the engine owns another.
#[derive(Debug, Clone)]
pub struct CrashableBackend {
    inner: InMemoryBackend,
    state: Arc<CrashState>,
}

impl Default for CrashableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashableBackend {
    /// Creates a new, disarmed backend.
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            state: Arc::new(CrashState {
                budget: AtomicUsize::new(usize::MAX),
                fail_on_sync: AtomicBool::new(false),
                crashed: AtomicBool::new(false),
                synced: AtomicU64::new(0),
                lost_unsynced: AtomicBool::new(false),
            }),
        }
    }

    /// Arms the backend to crash at `point` on the next write.
    ///
    /// `DuringWrite` keeps `partial` bytes of the record.
    pub fn arm(&self, point: CrashPoint, partial: usize) {
        match point {
            CrashPoint::BeforeWrite => self.state.budget.store(0, Ordering::SeqCst),
            CrashPoint::DuringWrite => self.state.budget.store(partial, Ordering::SeqCst),
            CrashPoint::BeforeSync => self.state.fail_on_sync.store(true, Ordering::SeqCst),
        }
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// The bytes that reached storage.
    pub fn data(&self) -> Vec<u8> {
        self.inner.data()
    }

    /// A plain backend over the surviving bytes, as seen after reboot.
    ///
    /// A crash at sync time loses every byte written since the last
    /// successful sync; other crashes keep what was written.
    pub fn survivor(&self) -> InMemoryBackend {
        let mut data = self.inner.data();
        if self.state.lost_unsynced.load(Ordering::SeqCst) {
            let synced = self.state.synced.load(Ordering::SeqCst);
            data.truncate(usize::try_from(synced).unwrap_or(usize::MAX));
        }
        InMemoryBackend::with_data(data)
    }

    fn crash(&self, what: &str) -> StorageError {
        self.state.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::other(format!("simulated crash {what}")))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.has_crashed() {
            return Err(self.crash("after an earlier crash"));
        }
        let budget = self.state.budget.load(Ordering::SeqCst);
        if data.len() > budget {
            if budget > 0 {
                // The partial write lands, then the machine stops.
                let mut raw = self.inner.clone();
                let _ = raw.append(&data[..budget]);
            }
            return Err(self.crash("during write"));
        }
        if budget != usize::MAX {
            self.state.budget.store(budget - data.len(), Ordering::SeqCst);
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.sync()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(self.crash("after an earlier crash"));
        }
        if self.state.fail_on_sync.load(Ordering::SeqCst) {
            self.state.lost_unsynced.store(true, Ordering::SeqCst);
            return Err(self.crash("before sync"));
        }
        self.inner.sync()?;
        self.state.synced.store(self.inner.size()?, Ordering::SeqCst);
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        // A crashed machine cannot clean up after itself.
        if self.has_crashed() {
            return Err(self.crash("during truncate"));
        }
        self.inner.truncate(new_size)?;
        self.state.synced.fetch_min(new_size, Ordering::SeqCst);
        Ok(())
    }
}

/// Test harness for crash recovery scenarios.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness with no results.
    pub fn new() -> Self {
        Self::default()
    }

    fn engine_on(backend: Box<dyn StorageBackend>) -> CoreResult<Engine> {
        Engine::open_with_backend(Config::default(), backend)
    }

    fn count_books(db: &Database) -> CoreResult<u64> {
        db.count("books", None)
    }

    /// Commits `committed` books, crashes while committing one more at
    /// `point`, restarts, and expects exactly the committed books.
    pub fn test_crash_during_commit(&mut self, point: CrashPoint, committed: u64) -> CrashRecoveryResult {
        let description = format!("crash {point:?} after {committed} commits");
        let result = self.crash_during_commit(point, committed, &description);
        self.results.push(result.clone());
        result
    }

    fn crash_during_commit(&self, point: CrashPoint, committed: u64, description: &str) -> CrashRecoveryResult {
        let backend = CrashableBackend::new();
        let engine = match Self::engine_on(Box::new(backend.clone())) {
            Ok(engine) => engine,
            Err(e) => return CrashRecoveryResult::fail(description, committed, 0, &e.to_string()),
        };
        let db = scenarios::open_library(&engine);
        for isbn in 1..=committed as i64 {
            if let Err(e) = db.add("books", scenarios::book(isbn, "t", "a", 2000)) {
                return CrashRecoveryResult::fail(description, committed, 0, &e.to_string());
            }
        }

        backend.arm(point, 7);
        let doomed = db.add("books", scenarios::book(-1, "doomed", "a", 2000));
        if doomed.is_ok() {
            return CrashRecoveryResult::fail(description, committed, committed + 1, "write did not crash");
        }
        match Self::count_books(&db) {
            Ok(n) if n == committed => {}
            Ok(n) => return CrashRecoveryResult::fail(description, committed, n, "failed commit left data in memory"),
            Err(e) => return CrashRecoveryResult::fail(description, committed, 0, &e.to_string()),
        }
        drop(db);
        drop(engine);

        self.verify_restart(backend.survivor(), committed, description)
    }

    /// Aborted and uncommitted work never reaches the log.
    pub fn test_uncommitted_discarded(&mut self) -> CrashRecoveryResult {
        let description = "aborted transaction not persisted";
        let backend = InMemoryBackend::new();
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let engine = Self::engine_on(Box::new(backend.clone()))?;
            let db = scenarios::open_library(&engine);
            db.add("books", scenarios::book(1, "kept", "a", 2000))?;
            let txn = db.transaction(["books"], shelfdb_core::TransactionMode::ReadWrite)?;
            txn.object_store("books")?
                .add(scenarios::book(2, "lost", "a", 2000))?;
            txn.abort()?;
            Ok(self.verify_restart(backend.clone(), 1, description))
        })();
        let result = result.unwrap_or_else(|e| CrashRecoveryResult::fail(description, 1, 0, &e.to_string()));
        self.results.push(result.clone());
        result
    }

    /// A crash while writing the first record after a checkpoint keeps
    /// the checkpointed state.
    pub fn test_crash_after_checkpoint(&mut self) -> CrashRecoveryResult {
        let description = "crash after checkpoint";
        let backend = CrashableBackend::new();
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let engine = Self::engine_on(Box::new(backend.clone()))?;
            let db = scenarios::open_library(&engine);
            for round in 0..3 {
                for isbn in 1..=4 {
                    db.put("books", scenarios::book(isbn, &format!("rev{round}"), "a", 2000))?;
                }
            }
            engine.checkpoint()?;
            backend.arm(CrashPoint::DuringWrite, 3);
            let _ = db.delete("books", 1);
            Ok(self.verify_restart(backend.survivor(), 4, description))
        })();
        let result = result.unwrap_or_else(|e| CrashRecoveryResult::fail(description, 4, 0, &e.to_string()));
        self.results.push(result.clone());
        result
    }

    fn verify_restart(&self, backend: InMemoryBackend, expected: u64, description: &str) -> CrashRecoveryResult {
        let engine = match Self::engine_on(Box::new(backend)) {
            Ok(engine) => engine,
            Err(e) => return CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        };
        let db = scenarios::open_library(&engine);
        match Self::count_books(&db) {
            Ok(n) if n == expected => CrashRecoveryResult::pass(description, n),
            Ok(n) => CrashRecoveryResult::fail(description, expected, n, "unexpected book count"),
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        }
    }

    /// Runs every scenario.
    pub fn run_all_tests(&mut self) -> Vec<CrashRecoveryResult> {
        let mut results = Vec::new();
        for point in [CrashPoint::BeforeWrite, CrashPoint::DuringWrite, CrashPoint::BeforeSync] {
            results.push(self.test_crash_during_commit(point, 3));
        }
        results.push(self.test_uncommitted_discarded());
        results.push(self.test_crash_after_checkpoint());
        results
    }

    /// One line per result.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for r in &self.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("[{status}] {}", r.description));
            if let Some(e) = &r.error {
                out.push_str(&format!(": {e} (expected {}, got {})", r.expected_books, r.actual_books));
            }
            out.push('\n');
        }
        out
    }

    /// Whether every recorded test passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}
