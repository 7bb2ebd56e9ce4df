//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// # Invariants
///
/// - `append` returns the offset at which `data` begins
/// - `read_at` returns exactly the bytes previously appended at that range
/// - after `sync` returns, everything appended so far survives a restart
/// - `truncate` only ever shrinks the store
/// - a failed `replace` leaves the previous contents intact
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// fully inside the store.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset where it was written.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to durable media.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// Used to cut off a torn trailing record during recovery.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Replaces the whole store with `data` and syncs it.
    ///
    /// On error the previous contents are still in place. The provided
    /// version rewrites in place and puts the old bytes back if a write
    /// fails; backends that can swap contents atomically override it.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let previous = self.read_all()?;
        let written = self
            .truncate(0)
            .and_then(|()| self.append(data))
            .and_then(|_| self.sync());
        if let Err(e) = written {
            self.truncate(0)?;
            self.append(&previous)?;
            self.sync()?;
            return Err(e);
        }
        Ok(())
    }

    /// Reads the whole store.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| crate::StorageError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }
}
