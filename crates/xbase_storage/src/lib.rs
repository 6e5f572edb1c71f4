//! # xbase storage
//!
//! File access layer for the xbase-rs table engine.
//!
//! This crate is the I/O leaf of the workspace. Backends are **opaque byte
//! stores** addressed by absolute offset; they know nothing about DBF headers,
//! index nodes or memo blocks.
//!
//! ## Design Principles
//!
//! - Fixed-offset reads and writes, plus block-aligned helpers for index and memo files
//! - Little-endian integer and double encoding in [`endian`]
//! - File create/rename/delete helpers in [`fsops`]
//! - The core crate owns all format interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and scratch files
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use xbase_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(4, b"dbf").unwrap();
//! assert_eq!(backend.size().unwrap(), 7);
//! assert_eq!(backend.read_at(4, 3).unwrap(), b"dbf");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
pub mod endian;
mod error;
mod file;
pub mod fsops;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
