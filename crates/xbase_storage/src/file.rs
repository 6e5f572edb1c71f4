//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A file-based storage backend.
///
/// The size is always taken from the file metadata rather than cached, so a
/// handle sees records appended by another handle or process as soon as the
/// other side has written them.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use xbase_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::create(Path::new("CUSTOMER.DBF"), true).unwrap();
/// backend.write_at(0, &[0x03]).unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
}

impl FileBackend {
    /// Opens an existing file for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] if the file does not exist, or
    /// an I/O error if it cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => StorageError::FileNotFound {
                    path: path.to_path_buf(),
                },
                _ => StorageError::Io(e),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
        })
    }

    /// Creates a new empty file.
    ///
    /// With `overlay` set an existing file is truncated; otherwise an
    /// existing file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileExists`] when the file exists and
    /// `overlay` is false.
    pub fn create(path: &Path, overlay: bool) -> StorageResult<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if overlay {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let file = options.open(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => StorageError::FileExists {
                path: path.to_path_buf(),
            },
            _ => StorageError::Io(e),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
        })
    }

    /// Opens or creates a file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last modification time reported by the file system.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the metadata cannot be read or the platform
    /// does not record modification times.
    pub fn modified(&self) -> StorageResult<SystemTime> {
        Ok(self.file.read().metadata()?.modified()?)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut file = self.file.write();
        let size = file.metadata()?.len();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|source| StorageError::Seek { offset, source })?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)
            .map_err(|source| StorageError::Read {
                offset,
                len,
                source,
            })?;

        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| StorageError::Seek { offset, source })?;
        file.write_all(data).map_err(|source| StorageError::Write {
            offset,
            len: data.len(),
            source,
        })?;

        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.file.read().metadata()?.len())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.write();
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let size = file.metadata()?.len();

        if new_size > size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, size
                ),
            )));
        }

        file.set_len(new_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TEST.DBF");

        let backend = FileBackend::create(&path, false).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn create_without_overlay_fails_on_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TEST.DBF");
        FileBackend::create(&path, false).unwrap();

        let result = FileBackend::create(&path, false);
        assert!(matches!(result, Err(StorageError::FileExists { .. })));
    }

    #[test]
    fn create_with_overlay_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("TEST.DBF");
        let mut backend = FileBackend::create(&path, false).unwrap();
        backend.append(b"old contents").unwrap();
        drop(backend);

        let backend = FileBackend::create(&path, true).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = FileBackend::open(&dir.path().join("MISSING.DBF"));
        assert!(matches!(result, Err(StorageError::FileNotFound { .. })));
    }

    #[test]
    fn write_at_extends_with_zero_fill() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.ndx");

        let mut backend = FileBackend::create(&path, false).unwrap();
        backend.write_at(510, b"ok").unwrap();
        assert_eq!(backend.size().unwrap(), 512);

        let block = backend.read_block(0, 512).unwrap();
        assert!(block[..510].iter().all(|&b| b == 0));
        assert_eq!(&block[510..], b"ok");
    }

    #[test]
    fn append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::create(&path, false).unwrap();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);

        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::create(&path, false).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn second_handle_sees_growth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.dbf");

        let mut writer = FileBackend::create(&path, false).unwrap();
        let reader = FileBackend::open(&path).unwrap();
        assert_eq!(reader.size().unwrap(), 0);

        writer.append(b"record").unwrap();
        writer.flush().unwrap();
        assert_eq!(reader.size().unwrap(), 6);
        assert_eq!(reader.read_at(0, 6).unwrap(), b"record");
    }

    #[test]
    fn modified_time_does_not_go_backwards() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamp.ndx");

        let mut backend = FileBackend::create(&path, false).unwrap();
        let before = backend.modified().unwrap();
        backend.write_at(0, b"x").unwrap();
        backend.flush().unwrap();
        assert!(backend.modified().unwrap() >= before);
    }

    #[test]
    fn truncate_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::create(&path, false).unwrap();
        backend.append(b"0123456789").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.size().unwrap(), 4);
        assert!(backend.truncate(8).is_err());
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.bin");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.path(), path);
    }
}
