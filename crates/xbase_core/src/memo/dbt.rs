//! DBT memo files.
//!
//! Block 0 is a 512-byte header whose first four bytes hold the next free
//! block. Version 3 memos are raw text closed by two `0x1A` bytes; version 4
//! memos start with `FF FF 08 00` and a u32 length that counts the 8-byte
//! prefix. New memos always go at the end of the file; space held by
//! replaced memos is reclaimed by pack.

use super::{MemoStore, MemoVersion};
use crate::error::{from_storage, XbError, XbResult};
use std::path::{Path, PathBuf};
use tracing::debug;
use xbase_storage::endian::{get_u16, get_u32, put_u16, put_u32};
use xbase_storage::{FileBackend, StorageBackend};

/// Size of the DBT header and of version 3 blocks.
pub const DBT_HEADER_LEN: usize = 512;

const V3_TERMINATOR: [u8; 2] = [0x1A, 0x1A];
const V4_PREFIX: [u8; 4] = [0xFF, 0xFF, 0x08, 0x00];
const V4_PREFIX_LEN: usize = 8;

/// An open DBT file.
#[derive(Debug)]
pub struct DbtFile {
    backend: FileBackend,
    version: MemoVersion,
    block_size: usize,
    next_free: u32,
}

impl DbtFile {
    /// Creates an empty memo file for the table stem `stem`.
    ///
    /// # Errors
    ///
    /// Returns `FileExists` if the file exists and `overlay` is false.
    pub fn create(path: &Path, stem: &str, version: MemoVersion, overlay: bool) -> XbResult<Self> {
        let backend = FileBackend::create(path, overlay).map_err(from_storage)?;
        let mut dbt = Self {
            backend,
            version,
            block_size: DBT_HEADER_LEN,
            next_free: 1,
        };
        dbt.write_header(stem)?;
        debug!(path = %path.display(), ?version, "memo file created");
        Ok(dbt)
    }

    /// Opens an existing memo file.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the file is missing and `InvalidBlockSize`
    /// for a version 4 header with an unusable block size.
    pub fn open(path: &Path, version: MemoVersion) -> XbResult<Self> {
        let backend = FileBackend::open(path).map_err(from_storage)?;
        let header = backend.read_at(0, DBT_HEADER_LEN)?;
        let block_size = match version {
            MemoVersion::V3 => DBT_HEADER_LEN,
            MemoVersion::V4 => {
                let size = usize::from(get_u16(&header, 20));
                if size == 0 || size % 64 != 0 {
                    return Err(XbError::InvalidBlockSize(size));
                }
                size
            }
        };
        Ok(Self {
            backend,
            version,
            block_size,
            next_free: get_u32(&header, 0),
        })
    }

    fn write_header(&mut self, stem: &str) -> XbResult<()> {
        let mut header = vec![0u8; DBT_HEADER_LEN];
        put_u32(&mut header, 0, self.next_free);
        match self.version {
            MemoVersion::V3 => header[16] = 0x03,
            MemoVersion::V4 => {
                let name = stem.as_bytes();
                let n = name.len().min(8);
                header[8..8 + n].copy_from_slice(&name[..n]);
                put_u16(&mut header, 20, self.block_size as u16);
            }
        }
        self.backend.write_at(0, &header)?;
        Ok(())
    }

    fn store_next_free(&mut self) -> XbResult<()> {
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, self.next_free);
        self.backend.write_at(0, &buf)?;
        Ok(())
    }

    fn block_offset(&self, block: u32) -> u64 {
        u64::from(block) * self.block_size as u64
    }

    fn check_block(&self, block: u32) -> XbResult<()> {
        if block == 0 || block >= self.next_free {
            return Err(XbError::InvalidBlockNo(block));
        }
        Ok(())
    }
}

impl MemoStore for DbtFile {
    fn path(&self) -> &Path {
        self.backend.path()
    }

    fn version(&self) -> MemoVersion {
        self.version
    }

    fn refresh(&mut self) -> XbResult<()> {
        self.next_free = get_u32(&self.backend.read_at(0, 4)?, 0);
        Ok(())
    }

    fn read(&mut self, block: u32) -> XbResult<String> {
        self.check_block(block)?;
        let start = self.block_offset(block);
        let size = self.backend.size()?;

        let data = match self.version {
            MemoVersion::V3 => {
                let mut data = Vec::new();
                let mut at = start;
                loop {
                    if at >= size {
                        break;
                    }
                    let len = (size - at).min(DBT_HEADER_LEN as u64) as usize;
                    data.extend_from_slice(&self.backend.read_at(at, len)?);
                    if let Some(end) = data.windows(2).position(|w| w == V3_TERMINATOR) {
                        data.truncate(end);
                        break;
                    }
                    at += len as u64;
                }
                data
            }
            MemoVersion::V4 => {
                let prefix = self.backend.read_at(start, V4_PREFIX_LEN)?;
                if prefix[..4] != V4_PREFIX {
                    return Err(XbError::InvalidBlockNo(block));
                }
                let total = get_u32(&prefix, 4) as usize;
                let len = total.saturating_sub(V4_PREFIX_LEN);
                self.backend.read_at(start + V4_PREFIX_LEN as u64, len)?
            }
        };
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn write(&mut self, text: &str) -> XbResult<u32> {
        self.refresh()?;
        let mut data = Vec::with_capacity(text.len() + V4_PREFIX_LEN);
        match self.version {
            MemoVersion::V3 => {
                data.extend_from_slice(text.as_bytes());
                data.extend_from_slice(&V3_TERMINATOR);
            }
            MemoVersion::V4 => {
                data.extend_from_slice(&V4_PREFIX);
                let mut len = [0u8; 4];
                put_u32(&mut len, 0, (text.len() + V4_PREFIX_LEN) as u32);
                data.extend_from_slice(&len);
                data.extend_from_slice(text.as_bytes());
            }
        }
        let blocks = data.len().div_ceil(self.block_size);
        data.resize(blocks * self.block_size, 0);

        let block = self.next_free;
        let offset = self.block_offset(block);
        self.backend.write_at(offset, &data)?;
        self.next_free = block + blocks as u32;
        self.store_next_free()?;
        debug!(block, blocks, "memo written");
        Ok(block)
    }

    fn zap(&mut self) -> XbResult<()> {
        self.next_free = 1;
        self.backend.truncate(DBT_HEADER_LEN as u64)?;
        self.store_next_free()
    }

    fn flush(&mut self) -> XbResult<()> {
        self.backend.flush()?;
        Ok(())
    }
}

/// Memo file path that pairs with the table at `table_path`.
#[must_use]
pub fn memo_path(table_path: &Path) -> PathBuf {
    xbase_storage::fsops::sibling_with_extension(table_path, "DBT")
}
