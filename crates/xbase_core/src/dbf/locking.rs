//! Explicit lock calls on a table handle.
//!
//! Updates take the locks they need on their own. These calls let a caller
//! hold locks across several operations; a handle holding the table lock
//! skips the per-update locking altogether.

use super::Table;
use crate::error::{XbError, XbResult};
use crate::lock::{LockOption, LockResource};

impl Table {
    /// Locks or unlocks the whole table.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another handle holds any lock on the table.
    pub fn lock_table(&mut self, option: LockOption) -> XbResult<()> {
        self.ensure_open()?;
        self.locks.lock_table(option)
    }

    /// Locks or unlocks the table header.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the header is locked elsewhere.
    pub fn lock_header(&mut self, option: LockOption) -> XbResult<()> {
        self.ensure_open()?;
        self.locks.lock_header(option)
    }

    /// Locks or unlocks the append bytes for the next record number.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another handle is appending.
    pub fn lock_append(&mut self, option: LockOption) -> XbResult<()> {
        self.ensure_open()?;
        let next = match option {
            LockOption::Lock => self.stored_record_count()? + 1,
            LockOption::Unlock => 0,
        };
        self.locks.lock_append(option, next)
    }

    /// Locks or unlocks one record; `None` means the current record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` without a current record and `LockFailed` if
    /// the record is locked elsewhere.
    pub fn lock_record(&mut self, option: LockOption, recno: Option<u32>) -> XbResult<()> {
        self.ensure_open()?;
        let recno = recno.unwrap_or(self.cur_rec);
        if recno == 0 {
            return Err(XbError::InvalidRecord {
                recno,
                count: self.header.record_count,
            });
        }
        self.locks.lock_record(option, recno)
    }

    /// Locks or unlocks the memo file. Tables without memo fields have
    /// nothing to lock.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the memo file is locked elsewhere.
    pub fn lock_memo(&mut self, option: LockOption) -> XbResult<()> {
        self.ensure_open()?;
        let Some(path) = self.memo.as_ref().map(|m| m.path().to_path_buf()) else {
            return Ok(());
        };
        self.locks.lock_memo(option, &path)
    }

    /// Locks or unlocks every open index file.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if any index is locked elsewhere.
    pub fn lock_indices(&mut self, option: LockOption) -> XbResult<()> {
        self.ensure_open()?;
        let paths = self.indices.paths();
        self.locks.lock_indices(option, &paths)
    }

    /// Whether this handle holds `resource`.
    #[must_use]
    pub fn holds_lock(&self, resource: LockResource) -> bool {
        self.locks.holds(resource)
    }

    /// Takes the table lock for a whole-file operation unless locking is
    /// off or the lock is already held. Returns whether it was taken.
    pub(crate) fn acquire_table(&mut self) -> XbResult<bool> {
        if !self.auto_locks() {
            return Ok(false);
        }
        self.locks.lock_table(LockOption::Lock)?;
        Ok(true)
    }

    pub(crate) fn release_table(&mut self, taken: bool) -> XbResult<()> {
        if taken {
            self.locks.lock_table(LockOption::Unlock)?;
        }
        Ok(())
    }

    pub(crate) fn acquire_header(&mut self) -> XbResult<bool> {
        if !self.auto_locks() || self.locks.holds(LockResource::Header) {
            return Ok(false);
        }
        self.locks.lock_header(LockOption::Lock)?;
        Ok(true)
    }

    pub(crate) fn release_header(&mut self, taken: bool) -> XbResult<()> {
        if taken {
            self.locks.lock_header(LockOption::Unlock)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::dbf::{Table, TableVersion};
    use crate::lock::{LockOption, LockResource};
    use crate::schema::FieldSpec;
    use tempfile::{tempdir, TempDir};

    fn shared_pair() -> (TempDir, Table, Table) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("S.DBF");
        let mut a = Table::create(&path, &[FieldSpec::char("C", 3)], TableVersion::V3, false, Config::default())
            .unwrap();
        a.blank_record().unwrap();
        a.put_char("C", "ONE").unwrap();
        a.append_record().unwrap();
        let b = Table::open(&path, Config::default()).unwrap();
        (dir, a, b)
    }

    #[test]
    fn table_lock_blocks_other_handle_updates() {
        let (_dir, mut a, mut b) = shared_pair();
        a.lock_table(LockOption::Lock).unwrap();
        assert!(a.holds_lock(LockResource::Table));

        b.blank_record().unwrap();
        b.put_char("C", "TWO").unwrap();
        assert!(b.append_record().unwrap_err().is_lock_failed());
        assert_eq!(b.record_count(), 1);

        a.lock_table(LockOption::Unlock).unwrap();
        assert_eq!(b.append_record().unwrap(), 2);
    }

    #[test]
    fn record_lock_is_per_record() {
        let (_dir, mut a, mut b) = shared_pair();
        a.get_record(1).unwrap();
        a.lock_record(LockOption::Lock, None).unwrap();

        b.get_record(1).unwrap();
        assert!(b.lock_record(LockOption::Lock, Some(1)).unwrap_err().is_lock_failed());
        b.put_char("C", "NEW").unwrap();
        assert!(b.put_record(None).unwrap_err().is_lock_failed());

        a.lock_record(LockOption::Unlock, None).unwrap();
        b.put_record(None).unwrap();
        a.get_record(1).unwrap();
        assert_eq!(a.get_char("C").unwrap(), "NEW");
    }

    #[test]
    fn appends_from_two_handles_interleave() {
        let (_dir, mut a, mut b) = shared_pair();
        b.blank_record().unwrap();
        b.put_char("C", "B").unwrap();
        assert_eq!(b.append_record().unwrap(), 2);
        a.blank_record().unwrap();
        a.put_char("C", "A").unwrap();
        assert_eq!(a.append_record().unwrap(), 3);
        assert_eq!(b.get_next_record(crate::dbf::Scope::All).unwrap().recno(), Some(3));
    }

    #[test]
    fn single_user_never_locks() {
        let dir = tempdir().unwrap();
        let mut t = Table::create(
            &dir.path().join("U.DBF"),
            &[FieldSpec::char("C", 1)],
            TableVersion::V3,
            false,
            Config::default().single_user(true),
        )
        .unwrap();
        t.lock_table(LockOption::Lock).unwrap();
        assert!(!t.holds_lock(LockResource::Table));
        assert!(!dir.path().join("U.DBF.lck").exists());
    }

    #[test]
    fn lock_record_needs_a_position() {
        let (_dir, _a, mut b) = shared_pair();
        assert!(b.lock_record(LockOption::Lock, None).is_err());
    }
}
