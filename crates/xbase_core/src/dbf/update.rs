//! The update protocol: append, put, commit, abort.
//!
//! Appends and puts take their locks in the order header, append or record,
//! indices and release them in reverse. Keys are added before the data file
//! is touched; if a later step fails the removed keys are put back and the
//! added keys removed again, so a failed update leaves every tag as it
//! found it.

use super::header::update_stamp;
use super::{Table, TableStatus};
use crate::config::IndexMode;
use crate::date::Date;
use crate::error::{XbError, XbResult};
use crate::index::btree;
use crate::index::TagHandle;
use crate::lock::LockOption;
use tracing::{debug, error, warn};

/// Key changes one record update makes to one tag.
#[derive(Debug)]
struct KeyEdit {
    handle: TagHandle,
    old: Option<Vec<u8>>,
    new: Option<Vec<u8>>,
    /// Unique tag already holds the new key and the mode keeps the first.
    skip_add: bool,
}

impl KeyEdit {
    fn changed(&self) -> bool {
        self.old != self.new
    }
}

/// Locks and keys an update has taken so far, for cleanup on failure.
#[derive(Debug, Default)]
struct Progress {
    header: bool,
    append: bool,
    record: Option<u32>,
    indices: bool,
    added: Vec<(TagHandle, Vec<u8>)>,
    removed: Vec<(TagHandle, Vec<u8>)>,
    recno: u32,
    header_written: bool,
}

fn log_failure(op: &str, recno: u32, e: &XbError) {
    if !e.is_key_not_unique() && !e.is_lock_failed() {
        error!(op, recno, error = %e, "update failed");
    }
}

impl Table {
    /// Keys of `new` (and `old`, when given) for every open tag.
    fn key_edits(&self, old: Option<&[u8]>, new: &[u8]) -> XbResult<Vec<KeyEdit>> {
        let mode = self.config.index_mode;
        let mut edits = Vec::new();
        for handle in self.indices.handles() {
            let tag = self.indices.tag(handle)?;
            let key_of = |buf: &[u8]| -> XbResult<Option<Vec<u8>>> {
                let view = self.view(buf);
                if tag.includes(&view, mode)? {
                    Ok(Some(tag.key_for(&view)?))
                } else {
                    Ok(None)
                }
            };
            let new_key = key_of(new)?;
            let old_key = match old {
                Some(buf) => key_of(buf)?,
                None => None,
            };
            edits.push(KeyEdit {
                handle,
                old: old_key,
                new: new_key,
                skip_add: false,
            });
        }
        Ok(edits)
    }

    /// Whether a unique tag already holds the new key of `edit` for a
    /// record other than `except`.
    fn is_dup(&mut self, edit: &KeyEdit, except: u32) -> XbResult<bool> {
        let Some(key) = edit.new.as_ref() else {
            return Ok(false);
        };
        if !edit.changed() || !self.indices.tag(edit.handle)?.is_unique() {
            return Ok(false);
        }
        let mut store = self.tag_store(edit.handle)?;
        btree::contains_other(&mut *store, key, except)
    }

    fn check_dups(&mut self, edits: &mut [KeyEdit], except: u32) -> XbResult<()> {
        for edit in edits.iter_mut() {
            if !self.is_dup(edit, except)? {
                continue;
            }
            let tag = self.indices.tag(edit.handle)?.name().to_string();
            match self.config.index_mode {
                IndexMode::HaltOnDupKey => return Err(XbError::KeyNotUnique { tag }),
                IndexMode::EmulateDbase => {
                    debug!(tag = %tag, "duplicate key left out of unique tag");
                    edit.skip_add = true;
                }
            }
        }
        Ok(())
    }

    fn add_keys(&mut self, edits: &[KeyEdit], recno: u32, progress: &mut Progress) -> XbResult<()> {
        for edit in edits {
            if edit.skip_add || !edit.changed() {
                continue;
            }
            if let Some(key) = &edit.new {
                let mut store = self.tag_store(edit.handle)?;
                btree::insert(&mut *store, key, recno)?;
                progress.added.push((edit.handle, key.clone()));
            }
        }
        Ok(())
    }

    fn remove_old_keys(&mut self, edits: &[KeyEdit], recno: u32, progress: &mut Progress) -> XbResult<()> {
        for edit in edits {
            if !edit.changed() {
                continue;
            }
            if let Some(key) = &edit.old {
                let mut store = self.tag_store(edit.handle)?;
                if btree::delete(&mut *store, key, recno)? {
                    progress.removed.push((edit.handle, key.clone()));
                }
            }
        }
        Ok(())
    }

    /// Reverses the key changes of a failed update, newest first.
    fn undo_keys(&mut self, progress: &Progress) {
        if progress.added.is_empty() && progress.removed.is_empty() {
            return;
        }
        let recno = progress.recno;
        for (handle, key) in progress.removed.iter().rev() {
            let restored = self
                .tag_store(*handle)
                .and_then(|mut store| btree::insert(&mut *store, key, recno));
            if let Err(e) = restored {
                error!(recno, error = %e, "could not restore key after failed update");
            }
        }
        for (handle, key) in progress.added.iter().rev() {
            let undone = self
                .tag_store(*handle)
                .and_then(|mut store| btree::delete(&mut *store, key, recno));
            if let Err(e) = undone {
                error!(recno, error = %e, "could not remove key after failed update");
            }
        }
        warn!(
            recno,
            added = progress.added.len(),
            removed = progress.removed.len(),
            "key changes reversed after failed update"
        );
    }

    /// Releases whatever `progress` still holds, newest first.
    fn release(&mut self, progress: &mut Progress) -> XbResult<()> {
        let mut first_err = None;
        let mut note = |r: XbResult<()>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };
        if std::mem::take(&mut progress.indices) {
            note(self.locks.lock_indices(LockOption::Unlock, &[]));
        }
        if let Some(recno) = progress.record.take() {
            note(self.locks.lock_record(LockOption::Unlock, recno));
        }
        if std::mem::take(&mut progress.header) {
            note(self.locks.lock_header(LockOption::Unlock));
        }
        if std::mem::take(&mut progress.append) {
            note(self.locks.lock_append(LockOption::Unlock, 0));
        }
        first_err.map_or(Ok(()), Err)
    }

    fn lock_indices_for_update(&mut self, progress: &mut Progress) -> XbResult<()> {
        let paths = self.indices.paths();
        if !paths.is_empty() {
            self.locks.lock_indices(LockOption::Lock, &paths)?;
            progress.indices = true;
        }
        Ok(())
    }

    /// Writes pending memo text and stores the block numbers in the
    /// current buffer.
    fn commit_memo(&mut self, auto: bool) -> XbResult<()> {
        let path = match self.memo.as_ref() {
            Some(memo) if memo.has_pending() => memo.path().to_path_buf(),
            _ => return Ok(()),
        };
        if auto {
            self.locks.lock_memo(LockOption::Lock, &path)?;
        }
        let result = match self.memo.as_mut() {
            Some(memo) => memo.commit(&self.fields, &mut self.current),
            None => Ok(()),
        };
        if auto {
            self.locks.lock_memo(LockOption::Unlock, &path)?;
        }
        result
    }

    /// Appends the current buffer as a new record and adds its keys to
    /// every open tag. Returns the new record number, which becomes the
    /// current record.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotUnique` in [`IndexMode::HaltOnDupKey`] when a unique
    /// tag already holds the key, `LockFailed` if another handle holds a
    /// needed lock. Either way the table and its tags are unchanged.
    pub fn append_record(&mut self) -> XbResult<u32> {
        self.ensure_open()?;
        let mut edits = self.key_edits(None, &self.current)?;
        let auto = self.auto_locks();
        let mut progress = Progress::default();

        let result = self.append_steps(&mut edits, auto, &mut progress);
        if let Err(e) = result {
            self.undo_keys(&progress);
            if progress.recno != 0 {
                self.header.record_count = progress.recno - 1;
                if progress.header_written {
                    if let Err(e) = self.write_prolog() {
                        error!(error = %e, "could not restore record count");
                    }
                }
            }
            if let Err(e) = self.release(&mut progress) {
                warn!(error = %e, "lock release failed");
            }
            log_failure("append", progress.recno, &e);
            return Err(e);
        }
        self.release(&mut progress)?;

        let recno = progress.recno;
        self.cur_rec = recno;
        self.original.clone_from(&self.current);
        self.status = TableStatus::Open;
        debug!(recno, "record appended");
        Ok(recno)
    }

    fn append_steps(&mut self, edits: &mut [KeyEdit], auto: bool, progress: &mut Progress) -> XbResult<()> {
        if auto {
            self.locks.lock_header(LockOption::Lock)?;
            progress.header = true;
            let next = self.stored_record_count()? + 1;
            self.locks.lock_append(LockOption::Lock, next)?;
            progress.append = true;
            self.lock_indices_for_update(progress)?;
        }
        self.refresh_header()?;
        self.refresh_tags()?;
        self.check_dups(edits, 0)?;

        self.header.updated = update_stamp(Date::today());
        self.header.record_count += 1;
        progress.recno = self.header.record_count;
        self.add_keys(edits, progress.recno, progress)?;

        if std::mem::take(&mut progress.indices) {
            self.locks.lock_indices(LockOption::Unlock, &[])?;
        }
        self.write_prolog()?;
        progress.header_written = true;
        if std::mem::take(&mut progress.header) {
            self.locks.lock_header(LockOption::Unlock)?;
        }

        self.commit_memo(auto)?;
        let buf = self.current.clone();
        self.write_record_at(progress.recno, &buf)?;
        self.write_eof()?;
        if std::mem::take(&mut progress.append) {
            self.locks.lock_append(LockOption::Unlock, 0)?;
        }
        Ok(())
    }

    /// Writes the current buffer over record `recno`, or over the current
    /// record when `None`, and moves its keys in every open tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` for a record number outside the table,
    /// `KeyNotUnique` and `LockFailed` as for [`Table::append_record`].
    pub fn put_record(&mut self, recno: Option<u32>) -> XbResult<()> {
        self.ensure_open()?;
        let recno = recno.unwrap_or(self.cur_rec);
        if recno == 0 {
            return Err(XbError::InvalidRecord {
                recno,
                count: self.header.record_count,
            });
        }
        let auto = self.auto_locks();
        let mut progress = Progress {
            recno,
            ..Progress::default()
        };

        let result = self.put_steps(recno, auto, &mut progress);
        if let Err(e) = &result {
            self.undo_keys(&progress);
            log_failure("put", recno, e);
        }
        let released = self.release(&mut progress);
        result.and(released)
    }

    fn put_steps(&mut self, recno: u32, auto: bool, progress: &mut Progress) -> XbResult<()> {
        if auto {
            self.locks.lock_header(LockOption::Lock)?;
            progress.header = true;
        }
        self.refresh_header()?;
        self.check_recno(recno)?;
        if auto {
            self.locks.lock_record(LockOption::Lock, recno)?;
            progress.record = Some(recno);
            self.lock_indices_for_update(progress)?;
        }
        self.refresh_tags()?;

        let stored = self.read_record_at(recno)?;
        let mut edits = self.key_edits(Some(&stored), &self.current)?;
        self.check_dups(&mut edits, recno)?;
        self.add_keys(&edits, recno, progress)?;
        self.remove_old_keys(&edits, recno, progress)?;

        let today = update_stamp(Date::today());
        if self.header.updated != today {
            self.header.updated = today;
            self.write_prolog()?;
        }
        self.commit_memo(auto)?;
        let buf = self.current.clone();
        self.write_record_at(recno, &buf)?;

        self.cur_rec = recno;
        self.original = buf;
        self.status = TableStatus::Open;
        Ok(())
    }

    /// Flushes pending edits: appends a new record when no record is
    /// current, puts the current record otherwise. Does nothing when there
    /// is nothing pending.
    ///
    /// # Errors
    ///
    /// See [`Table::append_record`] and [`Table::put_record`].
    pub fn commit(&mut self) -> XbResult<()> {
        self.ensure_open()?;
        if self.status != TableStatus::Updated {
            return Ok(());
        }
        if self.cur_rec == 0 {
            self.append_record().map(|_| ())
        } else {
            self.put_record(Some(self.cur_rec))
        }
    }

    /// Discards pending edits, memo text included.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` for a closed table.
    pub fn abort(&mut self) -> XbResult<()> {
        self.ensure_open()?;
        if self.status == TableStatus::Updated {
            self.current.clone_from(&self.original);
            if let Some(memo) = self.memo.as_mut() {
                memo.abort();
            }
            self.status = TableStatus::Open;
        }
        Ok(())
    }

    /// Commits or aborts pending edits per the effective auto-commit.
    pub(crate) fn settle_pending(&mut self) -> XbResult<()> {
        if self.status != TableStatus::Updated {
            return Ok(());
        }
        if self.auto_commit(true) {
            self.commit()
        } else {
            self.abort()
        }
    }

    /// Resets the current buffer to blanks with no current record, ready
    /// for a new record. Pending edits are settled first.
    ///
    /// # Errors
    ///
    /// Returns the commit error if pending edits cannot be written.
    pub fn blank_record(&mut self) -> XbResult<()> {
        self.ensure_open()?;
        self.settle_pending()?;
        self.cur_rec = 0;
        self.current.fill(b' ');
        self.original.fill(b' ');
        Ok(())
    }

    fn set_delete_flag(&mut self, flag: u8) -> XbResult<()> {
        self.ensure_open()?;
        if self.cur_rec == 0 {
            return Err(XbError::InvalidRecord {
                recno: 0,
                count: self.header.record_count,
            });
        }
        if self.current[0] != flag {
            self.begin_edit();
            self.current[0] = flag;
        }
        Ok(())
    }

    /// Sets the delete flag of the current record. The change is written
    /// on commit.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` when no record is current.
    pub fn delete_record(&mut self) -> XbResult<()> {
        self.set_delete_flag(b'*')
    }

    /// Clears the delete flag of the current record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` when no record is current.
    pub fn undelete_record(&mut self) -> XbResult<()> {
        self.set_delete_flag(b' ')
    }

    /// The first tag that would reject the current buffer as a duplicate
    /// if it were committed now.
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be computed or a node read.
    pub fn check_for_dup_key(&mut self) -> XbResult<Option<TagHandle>> {
        self.ensure_open()?;
        self.refresh_tags()?;
        let stored = if self.cur_rec == 0 {
            None
        } else {
            Some(self.read_record_at(self.cur_rec)?)
        };
        let edits = self.key_edits(stored.as_deref(), &self.current)?;
        for edit in &edits {
            if self.is_dup(edit, self.cur_rec)? {
                return Ok(Some(edit.handle));
            }
        }
        Ok(None)
    }
}
