//! Whole-table maintenance: pack, zap and bulk delete flags.

use super::header::update_stamp;
use super::{DeleteAllOption, Table, TableStatus, EOF_MARKER};
use crate::date::Date;
use crate::error::XbResult;
use crate::index::IndexId;
use crate::memo::field_of_block;
use crate::schema::FieldType;
use tracing::{debug, info};
use xbase_storage::StorageBackend;

impl Table {
    /// Removes deleted records, moves the rest down to close the gaps,
    /// rewrites the memo file with only the memos still referenced and
    /// rebuilds every open index. Returns the number of records removed.
    ///
    /// The table lock is taken for the duration when locking is on and the
    /// handle does not hold it already.
    ///
    /// Pack is not crash-safe. Records are moved down inside the data file
    /// and the memo file is emptied and written again in place, so a crash
    /// part way through can lose records and memo text. Copy the table,
    /// memo and index files aside first when that matters.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another handle holds any lock on the table.
    pub fn pack(&mut self) -> XbResult<u32> {
        self.ensure_open()?;
        self.settle_pending()?;
        let taken = self.acquire_table()?;
        let packed = self.pack_locked();
        let released = self.release_table(taken);
        let removed = packed?;
        released?;
        info!(path = %self.path.display(), removed, records = self.header.record_count, "pack complete");
        Ok(removed)
    }

    fn pack_locked(&mut self) -> XbResult<u32> {
        self.refresh_header()?;
        let total = self.header.record_count;
        let memo_fields: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.field_type == FieldType::Memo)
            .map(|(no, _)| no)
            .collect();

        let mut kept = 0u32;
        let mut memos: Vec<(u32, Vec<(usize, String)>)> = Vec::new();
        for recno in 1..=total {
            let buf = self.read_record_at(recno)?;
            if buf.first() == Some(&b'*') {
                continue;
            }
            kept += 1;
            if let Some(memo) = self.memo.as_mut() {
                let mut texts = Vec::new();
                for &no in &memo_fields {
                    if let Some(text) = memo.read_raw(&buf[self.fields[no].range()])? {
                        texts.push((no, text));
                    }
                }
                if !texts.is_empty() {
                    memos.push((kept, texts));
                }
            }
            if kept != recno {
                self.write_record_at(kept, &buf)?;
            }
        }

        self.header.record_count = kept;
        self.header.updated = update_stamp(Date::today());
        self.write_prolog()?;
        self.truncate_records()?;

        if let Some(memo) = self.memo.as_mut() {
            memo.zap()?;
            for (recno, texts) in memos {
                let at = self.header.record_offset(recno);
                let mut buf = self.backend.read_at(at, usize::from(self.header.record_len))?;
                for (no, text) in texts {
                    let block = memo.write_raw(&text)?;
                    let desc = &self.fields[no];
                    buf[desc.range()].copy_from_slice(&field_of_block(Some(block), desc.len));
                }
                self.backend.write_at(at, &buf)?;
            }
            memo.flush()?;
        }

        self.rebuild_all()?;
        self.reset_position();
        Ok(total - kept)
    }

    /// Removes every record, empties the memo file and every open index.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another handle holds any lock on the table.
    pub fn zap(&mut self) -> XbResult<()> {
        self.ensure_open()?;
        self.settle_pending()?;
        let taken = self.acquire_table()?;
        let zapped = self.zap_locked();
        let released = self.release_table(taken);
        zapped?;
        released?;
        info!(path = %self.path.display(), "zap complete");
        Ok(())
    }

    fn zap_locked(&mut self) -> XbResult<()> {
        self.refresh_header()?;
        self.header.record_count = 0;
        self.header.updated = update_stamp(Date::today());
        self.write_prolog()?;
        self.truncate_records()?;
        if let Some(memo) = self.memo.as_mut() {
            memo.zap()?;
        }
        self.rebuild_all()?;
        self.reset_position();
        Ok(())
    }

    /// Cuts the file after the last record and writes the EOF marker.
    fn truncate_records(&mut self) -> XbResult<()> {
        let end = self.header.record_offset(self.header.record_count + 1);
        self.backend.truncate(end)?;
        self.backend.write_at(end, &[EOF_MARKER])?;
        self.backend.flush()?;
        debug!(path = %self.path.display(), bytes = end + 1, "data file truncated");
        Ok(())
    }

    fn rebuild_all(&mut self) -> XbResult<()> {
        let ids: Vec<IndexId> = self.indices.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.rebuild_index(id)?;
        }
        Ok(())
    }

    fn reset_position(&mut self) {
        self.cur_rec = 0;
        self.current.fill(b' ');
        self.original.fill(b' ');
        self.status = TableStatus::Open;
    }

    /// Sets or clears the delete flag on every record, committing each
    /// change through the normal update path. Returns the number of
    /// records changed.
    ///
    /// # Errors
    ///
    /// Returns the first failed record update.
    pub fn delete_all(&mut self, option: DeleteAllOption) -> XbResult<u32> {
        self.ensure_open()?;
        self.settle_pending()?;
        self.refresh_header()?;
        let mut changed = 0;
        for recno in 1..=self.header.record_count {
            self.get_record(recno)?;
            let flagged = self.is_deleted();
            match option {
                DeleteAllOption::Delete if !flagged => self.delete_record()?,
                DeleteAllOption::Undelete if flagged => self.undelete_record()?,
                _ => continue,
            }
            self.put_record(None)?;
            changed += 1;
        }
        debug!(path = %self.path.display(), ?option, changed, "delete flags updated");
        Ok(changed)
    }
}
