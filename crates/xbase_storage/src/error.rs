//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred outside a positioned read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Positioning the file cursor failed.
    #[error("seek to offset {offset} failed: {source}")]
    Seek {
        /// The requested offset.
        offset: u64,
        /// Underlying error.
        source: io::Error,
    },

    /// A positioned read failed.
    #[error("read of {len} bytes at offset {offset} failed: {source}")]
    Read {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// Underlying error.
        source: io::Error,
    },

    /// A positioned write failed.
    #[error("write of {len} bytes at offset {offset} failed: {source}")]
    Write {
        /// The requested write offset.
        offset: u64,
        /// The requested write length.
        len: usize,
        /// Underlying error.
        source: io::Error,
    },

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The file to be created already exists.
    #[error("file already exists: {}", path.display())]
    FileExists {
        /// Path of the existing file.
        path: PathBuf,
    },

    /// The file to be opened does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// A rename failed.
    #[error("rename of {} to {} failed: {source}", from.display(), to.display())]
    Rename {
        /// Source path.
        from: PathBuf,
        /// Target path.
        to: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}
