//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend.
///
/// Storage backends are **opaque byte stores**. They provide positioned
/// reads and writes, appends, truncation and flushing. The table engine owns
/// all file format interpretation; backends do not understand headers,
/// records or index nodes.
///
/// # Invariants
///
/// - `write_at` past the current end extends the store, zero-filling any gap
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `size` reflects writes made through *any* handle on the same file, so a
///   handle can observe growth caused by another process
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the storage when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seek or the write fails.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size()?;
        self.write_at(offset, data)?;
        Ok(offset)
    }

    /// Flushes all pending writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// Used by pack and zap to drop trailing records and by reindex to
    /// reset an index file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than current size
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads block `block_no` of `block_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the block lies beyond the end of the storage.
    fn read_block(&self, block_no: u32, block_size: usize) -> StorageResult<Vec<u8>> {
        self.read_at(u64::from(block_no) * block_size as u64, block_size)
    }

    /// Writes one full block at `block_no`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_block(&mut self, block_no: u32, block_size: usize, data: &[u8]) -> StorageResult<()> {
        debug_assert_eq!(data.len(), block_size);
        self.write_at(u64::from(block_no) * block_size as u64, data)
    }
}
