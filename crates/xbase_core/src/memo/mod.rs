//! Memo storage.
//!
//! Memo text lives in a companion DBT file; the record only holds the
//! starting block number. Writes are held as pending until the record is
//! committed, so an aborted edit never touches the memo file.

mod dbt;

pub use dbt::{memo_path, DbtFile, DBT_HEADER_LEN};

use crate::error::{XbError, XbResult};
use crate::schema::{FieldDesc, FieldType};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// On-disk memo layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoVersion {
    /// `0x1A 0x1A` terminated text in 512-byte blocks.
    V3,
    /// Length-prefixed blocks.
    V4,
}

/// Block-level access to a memo file.
pub trait MemoStore: fmt::Debug + Send {
    /// Path of the memo file.
    fn path(&self) -> &Path;

    /// Layout of the file.
    fn version(&self) -> MemoVersion;

    /// Re-reads the header after another handle may have written.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    fn refresh(&mut self) -> XbResult<()>;

    /// Reads the memo starting at `block`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockNo` for a block outside the used area.
    fn read(&mut self, block: u32) -> XbResult<String>;

    /// Stores `text` and returns its starting block.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write(&mut self, text: &str) -> XbResult<u32>;

    /// Drops every memo.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be truncated.
    fn zap(&mut self) -> XbResult<()>;

    /// Flushes buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> XbResult<()>;
}

/// Parses the block reference stored in a memo field; blank means none.
#[must_use]
pub fn block_of_field(raw: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(raw);
    text.trim().parse::<u32>().ok().filter(|&b| b > 0)
}

/// Formats a block reference right-justified in the field width.
#[must_use]
pub fn field_of_block(block: Option<u32>, len: usize) -> Vec<u8> {
    match block {
        Some(b) => format!("{b:>len$}").into_bytes(),
        None => vec![b' '; len],
    }
}

/// Memo file plus the edits of the current record.
#[derive(Debug)]
pub struct MemoManager {
    store: Box<dyn MemoStore>,
    pending: BTreeMap<usize, String>,
}

impl MemoManager {
    /// Wraps an open memo store.
    #[must_use]
    pub fn new(store: Box<dyn MemoStore>) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
        }
    }

    /// Path of the memo file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Whether any memo edit awaits commit.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Memo text of field `no`, preferring an uncommitted edit.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMemoField` if the field is not a memo field.
    pub fn get(&mut self, fields: &[FieldDesc], no: usize, record: &[u8]) -> XbResult<String> {
        let desc = memo_field(fields, no)?;
        if let Some(text) = self.pending.get(&no) {
            return Ok(text.clone());
        }
        match block_of_field(&record[desc.range()]) {
            Some(block) => {
                self.store.refresh()?;
                self.store.read(block)
            }
            None => Ok(String::new()),
        }
    }

    /// Byte length of the memo in field `no`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMemoField` if the field is not a memo field.
    pub fn len(&mut self, fields: &[FieldDesc], no: usize, record: &[u8]) -> XbResult<usize> {
        Ok(self.get(fields, no, record)?.len())
    }

    /// Queues new text for field `no`. An empty string clears the memo.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMemoField` if the field is not a memo field.
    pub fn put(&mut self, fields: &[FieldDesc], no: usize, text: &str) -> XbResult<()> {
        memo_field(fields, no)?;
        self.pending.insert(no, text.to_string());
        Ok(())
    }

    /// Writes pending memos and stores their block numbers in `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memo file cannot be written.
    pub fn commit(&mut self, fields: &[FieldDesc], record: &mut [u8]) -> XbResult<()> {
        for (no, text) in std::mem::take(&mut self.pending) {
            let desc = &fields[no];
            let block = if text.is_empty() {
                None
            } else {
                Some(self.store.write(&text)?)
            };
            record[desc.range()].copy_from_slice(&field_of_block(block, desc.len));
        }
        self.store.flush()
    }

    /// Drops pending memo edits.
    pub fn abort(&mut self) {
        self.pending.clear();
    }

    /// Reads the memo referenced by field bytes, for pack.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockNo` for a dangling reference.
    pub fn read_raw(&mut self, raw: &[u8]) -> XbResult<Option<String>> {
        match block_of_field(raw) {
            Some(block) => Ok(Some(self.store.read(block)?)),
            None => Ok(None),
        }
    }

    /// Stores memo text directly, for pack.
    ///
    /// # Errors
    ///
    /// Returns an error if the memo file cannot be written.
    pub fn write_raw(&mut self, text: &str) -> XbResult<u32> {
        self.store.write(text)
    }

    /// Releases every memo block.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be truncated.
    pub fn zap(&mut self) -> XbResult<()> {
        self.pending.clear();
        self.store.zap()
    }

    /// Flushes the memo file.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> XbResult<()> {
        self.store.flush()
    }
}

fn memo_field(fields: &[FieldDesc], no: usize) -> XbResult<&FieldDesc> {
    let desc = fields.get(no).ok_or(XbError::InvalidFieldNo(no))?;
    if desc.field_type != FieldType::Memo {
        return Err(XbError::InvalidMemoField(desc.name.clone()));
    }
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{layout, FieldSpec};
    use tempfile::tempdir;

    #[test]
    fn block_references_are_right_justified() {
        assert_eq!(field_of_block(Some(12), 10), b"        12".to_vec());
        assert_eq!(block_of_field(b"        12"), Some(12));
        assert_eq!(block_of_field(b"          "), None);
        assert_eq!(field_of_block(None, 10), vec![b' '; 10]);
    }

    #[test]
    fn pending_edits_apply_on_commit_only() {
        let dir = tempdir().unwrap();
        let (fields, reclen) = layout(&[FieldSpec::char("NAME", 4), FieldSpec::memo("NOTES")]);
        let store = DbtFile::create(&dir.path().join("T.DBT"), "T", MemoVersion::V3, false).unwrap();
        let mut memo = MemoManager::new(Box::new(store));
        let mut record = vec![b' '; reclen];

        memo.put(&fields, 1, "first draft").unwrap();
        assert!(memo.has_pending());
        assert_eq!(memo.get(&fields, 1, &record).unwrap(), "first draft");
        memo.abort();
        assert_eq!(memo.get(&fields, 1, &record).unwrap(), "");

        memo.put(&fields, 1, "kept").unwrap();
        memo.commit(&fields, &mut record).unwrap();
        assert_eq!(block_of_field(&record[fields[1].range()]), Some(1));
        assert_eq!(memo.get(&fields, 1, &record).unwrap(), "kept");
        assert_eq!(memo.len(&fields, 1, &record).unwrap(), 4);
    }

    #[test]
    fn non_memo_fields_are_rejected() {
        let dir = tempdir().unwrap();
        let (fields, _) = layout(&[FieldSpec::char("NAME", 4)]);
        let store = DbtFile::create(&dir.path().join("T.DBT"), "T", MemoVersion::V3, false).unwrap();
        let mut memo = MemoManager::new(Box::new(store));
        assert!(matches!(
            memo.put(&fields, 0, "x"),
            Err(XbError::InvalidMemoField(_))
        ));
    }
}
