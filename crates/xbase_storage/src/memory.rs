//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests of node and header layouts
/// - Scratch files that never need to reach disk
///
/// # Example
///
/// ```rust
/// use xbase_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.size().unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let offset_usize = offset as usize;
        let end = offset_usize.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset_usize..end].to_vec())
    }

    fn write_at(&mut self, offset: u64, new_data: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let start = offset as usize;
        let end = start + new_data.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(new_data);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, current_size
                ),
            )));
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn write_then_overwrite() {
        let mut backend = InMemoryBackend::new();
        backend.write_at(0, b"aaaa").unwrap();
        backend.write_at(1, b"bb").unwrap();
        assert_eq!(backend.data(), b"abba");
    }

    #[test]
    fn block_helpers_address_by_block_size() {
        let mut backend = InMemoryBackend::new();
        backend.write_block(2, 4, b"wxyz").unwrap();
        assert_eq!(backend.size().unwrap(), 12);
        assert_eq!(backend.read_block(2, 4).unwrap(), b"wxyz");
        assert_eq!(backend.read_block(0, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn read_past_end_fails() {
        let backend = InMemoryBackend::with_data(vec![1, 2, 3]);
        assert!(matches!(
            backend.read_at(2, 2),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
    }

    #[test]
    fn truncate_rejects_growth() {
        let mut backend = InMemoryBackend::with_data(vec![0; 8]);
        backend.truncate(2).unwrap();
        assert_eq!(backend.size().unwrap(), 2);
        assert!(backend.truncate(3).is_err());
    }

    proptest! {
        #[test]
        fn positioned_writes_read_back(offset in 0u64..2048, payload in prop::collection::vec(any::<u8>(), 1..256)) {
            let mut backend = InMemoryBackend::new();
            backend.write_at(offset, &payload).unwrap();
            prop_assert_eq!(backend.size().unwrap(), offset + payload.len() as u64);
            prop_assert_eq!(backend.read_at(offset, payload.len()).unwrap(), payload);
        }
    }
}
