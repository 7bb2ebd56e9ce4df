//! Commit log writer.

use crate::error::{CoreError, CoreResult};
use crate::log::reader::{scan_log, LogScan};
use crate::log::record::LogRecord;
use parking_lot::Mutex;
use shelfdb_storage::StorageBackend;
use tracing::{debug, warn};

/// Appends committed transactions to a storage backend.
pub(crate) struct CommitLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
    max_record_size: usize,
}

impl CommitLog {
    pub(crate) fn new(
        backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
        max_record_size: usize,
    ) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
            max_record_size,
        }
    }

    /// Appends one record. Returns the offset it was written at.
    pub(crate) fn append(&self, record: &LogRecord) -> CoreResult<u64> {
        let data = record.frame()?;
        if data.len() > self.max_record_size {
            return Err(CoreError::data(format!(
                "commit record of {} bytes exceeds the limit of {} bytes",
                data.len(),
                self.max_record_size
            )));
        }

        let mut backend = self.backend.lock();
        let start = backend.size()?;
        match write_frame(&mut **backend, &data, self.sync_on_commit) {
            Ok(offset) => {
                debug!(offset, bytes = data.len(), "appended commit record");
                Ok(offset)
            }
            Err(e) => {
                // Drop any partial frame so later commits stay readable.
                if let Err(undo) = backend.truncate(start) {
                    warn!(error = %undo, size = start, "could not trim failed commit record");
                }
                Err(e.into())
            }
        }
    }

    /// Reads every valid record, cutting off a torn tail.
    pub(crate) fn recover(&self) -> CoreResult<LogScan> {
        let mut backend = self.backend.lock();
        let bytes = backend.read_all()?;
        let scan = scan_log(&bytes)?;
        if scan.has_torn_tail() {
            warn!(
                valid_len = scan.valid_len,
                total_len = scan.total_len,
                "truncating incomplete record at end of commit log"
            );
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }
        Ok(scan)
    }

    /// Replaces the whole log with the records `snapshot` builds, one
    /// snapshot commit per database.
    ///
    /// `snapshot` runs under the log lock; returning `None` leaves the log
    /// alone and yields `Ok(None)`. The snapshot is first appended after
    /// the live tail, each database reset just before its commit, and
    /// synced. The log then replays to the same state whether or not the
    /// compaction that follows lands. A failed compaction leaves the old
    /// records plus that tail.
    pub(crate) fn rewrite_with<F>(&self, snapshot: F) -> CoreResult<Option<u64>>
    where
        F: FnOnce() -> Option<Vec<LogRecord>>,
    {
        let mut backend = self.backend.lock();
        let Some(records) = snapshot() else {
            return Ok(None);
        };

        let mut compacted = Vec::new();
        let mut staged = Vec::new();
        for record in records {
            let frame = record.frame()?;
            if let LogRecord::Commit { database, .. } = record {
                staged.extend(LogRecord::DeleteDatabase { database }.frame()?);
            }
            staged.extend_from_slice(&frame);
            compacted.extend(frame);
        }

        let start = backend.size()?;
        if let Err(e) = write_frame(&mut **backend, &staged, true) {
            if let Err(undo) = backend.truncate(start) {
                warn!(error = %undo, size = start, "could not trim failed snapshot");
            }
            return Err(e.into());
        }
        debug!(offset = start, bytes = staged.len(), "snapshot staged");

        if let Err(e) = backend.replace(&compacted) {
            warn!(error = %e, "log compaction failed; staged snapshot kept");
            return Err(e.into());
        }
        Ok(Some(backend.size()?))
    }

    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

fn write_frame(
    backend: &mut dyn StorageBackend,
    data: &[u8],
    sync: bool,
) -> shelfdb_storage::StorageResult<u64> {
    let offset = backend.append(data)?;
    if sync {
        backend.sync()?;
    } else {
        backend.flush()?;
    }
    Ok(offset)
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .field("max_record_size", &self.max_record_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::LogOp;
    use shelfdb_storage::{InMemoryBackend, StorageError, StorageResult};

    fn commit(version: u64) -> LogRecord {
        LogRecord::Commit {
            database: "db".into(),
            ops: vec![LogOp::SetVersion { version }],
        }
    }

    #[test]
    fn append_then_recover() {
        let backend = InMemoryBackend::new();
        let log = CommitLog::new(Box::new(backend.clone()), true, 1024);
        assert_eq!(log.append(&commit(1)).unwrap(), 0);
        log.append(&commit(2)).unwrap();

        let reopened = CommitLog::new(Box::new(backend), true, 1024);
        let scan = reopened.recover().unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.entries[1].record, commit(2));
    }

    #[test]
    fn recover_truncates_torn_tail() {
        let backend = InMemoryBackend::new();
        let log = CommitLog::new(Box::new(backend.clone()), false, 1024);
        log.append(&commit(1)).unwrap();
        let good = log.size().unwrap();

        let mut torn = backend.data();
        torn.extend_from_slice(&commit(2).frame().unwrap()[..9]);
        let damaged = InMemoryBackend::with_data(torn);

        let log = CommitLog::new(Box::new(damaged.clone()), false, 1024);
        let scan = log.recover().unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(damaged.data().len() as u64, good);
    }

    #[test]
    fn oversized_record_rejected() {
        let log = CommitLog::new(Box::new(InMemoryBackend::new()), false, 8);
        let err = log.append(&commit(1)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Data);
        assert_eq!(log.size().unwrap(), 0);
    }

    /// Accepts `appends_left` appends, then refuses every write.
    struct FailingBackend {
        inner: InMemoryBackend,
        appends_left: std::sync::Arc<std::sync::atomic::AtomicUsize>,
        fail_replace: bool,
    }

    impl StorageBackend for FailingBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            use std::sync::atomic::Ordering;
            if self.appends_left.load(Ordering::SeqCst) == 0 {
                return Err(StorageError::Io(std::io::Error::other("no space left")));
            }
            self.appends_left.fetch_sub(1, Ordering::SeqCst);
            self.inner.append(data)
        }

        fn flush(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }

        fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
            if self.fail_replace {
                return Err(StorageError::Io(std::io::Error::other("rename failed")));
            }
            self.inner.replace(data)
        }
    }

    fn failing(appends: usize, fail_replace: bool) -> (FailingBackend, InMemoryBackend) {
        let inner = InMemoryBackend::new();
        let backend = FailingBackend {
            inner: inner.clone(),
            appends_left: std::sync::Arc::new(appends.into()),
            fail_replace,
        };
        (backend, inner)
    }

    fn replayed_versions(bytes: &[u8]) -> Vec<Option<u64>> {
        let mut version = None;
        let mut seen = Vec::new();
        for entry in scan_log(bytes).unwrap().entries {
            match entry.record {
                LogRecord::DeleteDatabase { .. } => version = None,
                LogRecord::Commit { ops, .. } => {
                    for op in ops {
                        if let LogOp::SetVersion { version: v } = op {
                            version = Some(v);
                        }
                    }
                }
            }
            seen.push(version);
        }
        seen
    }

    #[test]
    fn rewrite_that_cannot_stage_keeps_log() {
        let (backend, inner) = failing(2, false);
        let log = CommitLog::new(Box::new(backend), true, 1024);
        log.append(&commit(1)).unwrap();
        log.append(&commit(2)).unwrap();
        let before = inner.data();

        assert!(log.rewrite_with(|| Some(vec![commit(2)])).is_err());
        assert_eq!(inner.data(), before);
    }

    #[test]
    fn failed_compaction_leaves_replayable_tail() {
        let (backend, inner) = failing(usize::MAX, true);
        let log = CommitLog::new(Box::new(backend), true, 1024);
        log.append(&commit(1)).unwrap();
        log.append(&commit(2)).unwrap();

        assert!(log.rewrite_with(|| Some(vec![commit(2)])).is_err());
        let versions = replayed_versions(&inner.data());
        assert_eq!(versions, vec![Some(1), Some(2), None, Some(2)]);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let log = CommitLog::new(Box::new(InMemoryBackend::new()), false, 1024);
        for v in 1..=5 {
            log.append(&commit(v)).unwrap();
        }
        let size = log.rewrite_with(|| Some(vec![commit(5)])).unwrap();
        assert_eq!(size, Some(log.size().unwrap()));
        let scan = log.recover().unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.entries[0].record, commit(5));
    }

    #[test]
    fn declined_snapshot_leaves_log() {
        let log = CommitLog::new(Box::new(InMemoryBackend::new()), false, 1024);
        log.append(&commit(1)).unwrap();
        let size = log.size().unwrap();
        assert_eq!(log.rewrite_with(|| None).unwrap(), None);
        assert_eq!(log.size().unwrap(), size);
    }
}
