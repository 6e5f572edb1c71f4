//! Multi-user lock manager.
//!
//! Locks are advisory OS file locks on slot files kept in a sidecar
//! directory (`<file><lock_dir_suffix>`). Every resource other than the
//! table itself also takes a shared "table intent" lock, so a whole-table
//! lock (exclusive intent) conflicts with any other handle's header,
//! append, record, memo or index lock.
//!
//! The data, index and memo files themselves are never locked. Only
//! handles of this library exclude each other; a dBASE program sharing the
//! files locks byte ranges and sees none of these locks.
//!
//! No call waits or retries: a busy resource is reported as
//! [`XbError::LockFailed`] straight away. With locking disabled
//! (single-user mode or auto-lock off) every call succeeds without touching
//! the file system.
//!
//! [`XbError::LockFailed`]: crate::XbError::LockFailed

mod flavor;
mod slot;

pub use flavor::{LockFlavor, LockOption, DBASE_LOCK_BASE};

use crate::error::XbResult;
use slot::{slot_dir, SlotLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A lockable resource of an open table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockResource {
    /// The whole table.
    Table,
    /// The table header.
    Header,
    /// The append bytes.
    Append,
    /// One record.
    Record(u32),
    /// The memo file.
    Memo,
    /// The open index files.
    Index,
}

/// Locks held by one table handle.
#[derive(Debug)]
pub struct LockManager {
    enabled: bool,
    flavor: LockFlavor,
    suffix: &'static str,
    table_dir: PathBuf,
    intent: Option<SlotLock>,
    table: bool,
    header: Option<SlotLock>,
    append: Option<(SlotLock, SlotLock)>,
    records: BTreeMap<u32, SlotLock>,
    memo: Option<SlotLock>,
    indices: Vec<SlotLock>,
}

impl LockManager {
    /// Creates a manager for the table at `table_path`.
    #[must_use]
    pub fn new(table_path: &Path, enabled: bool, flavor: LockFlavor, suffix: &'static str) -> Self {
        Self {
            enabled,
            flavor,
            suffix,
            table_dir: slot_dir(table_path, suffix),
            intent: None,
            table: false,
            header: None,
            append: None,
            records: BTreeMap::new(),
            memo: None,
            indices: Vec::new(),
        }
    }

    /// Whether lock calls do anything.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this handle holds `resource`.
    #[must_use]
    pub fn holds(&self, resource: LockResource) -> bool {
        match resource {
            LockResource::Table => self.table,
            LockResource::Header => self.header.is_some(),
            LockResource::Append => self.append.is_some(),
            LockResource::Record(n) => self.records.contains_key(&n),
            LockResource::Memo => self.memo.is_some(),
            LockResource::Index => !self.indices.is_empty(),
        }
    }

    fn holds_slots(&self) -> bool {
        self.header.is_some()
            || self.append.is_some()
            || !self.records.is_empty()
            || self.memo.is_some()
            || !self.indices.is_empty()
    }

    fn enter(&mut self) -> XbResult<()> {
        if self.table || self.intent.is_some() {
            return Ok(());
        }
        self.intent = Some(SlotLock::shared(&self.table_dir, self.flavor.table_slot())?);
        Ok(())
    }

    fn leave(&mut self) -> XbResult<()> {
        if self.table || self.holds_slots() {
            return Ok(());
        }
        if let Some(intent) = self.intent.take() {
            intent.release()?;
        }
        Ok(())
    }

    /// Locks or unlocks the whole table.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another handle holds any lock on the table.
    pub fn lock_table(&mut self, option: LockOption) -> XbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match option {
            LockOption::Lock => {
                if self.table {
                    return Ok(());
                }
                match self.intent.as_mut() {
                    Some(intent) => intent.upgrade()?,
                    None => {
                        self.intent =
                            Some(SlotLock::exclusive(&self.table_dir, self.flavor.table_slot())?);
                    }
                }
                self.table = true;
                debug!(dir = %self.table_dir.display(), "table locked");
            }
            LockOption::Unlock => {
                if !self.table {
                    return Ok(());
                }
                self.table = false;
                if self.holds_slots() {
                    if let Some(intent) = self.intent.as_mut() {
                        intent.downgrade()?;
                    }
                } else if let Some(mut intent) = self.intent.take() {
                    // The intent slot is shared by every handle; keep the file.
                    intent.downgrade()?;
                    intent.release()?;
                }
                debug!(dir = %self.table_dir.display(), "table unlocked");
            }
        }
        Ok(())
    }

    /// Locks or unlocks the table header.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the header is locked elsewhere.
    pub fn lock_header(&mut self, option: LockOption) -> XbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match option {
            LockOption::Lock if self.header.is_none() => {
                self.enter()?;
                match SlotLock::exclusive(&self.table_dir, self.flavor.header_slot()) {
                    Ok(lock) => self.header = Some(lock),
                    Err(e) => {
                        self.leave()?;
                        return Err(e);
                    }
                }
            }
            LockOption::Unlock => {
                if let Some(lock) = self.header.take() {
                    lock.release()?;
                    self.leave()?;
                }
            }
            LockOption::Lock => {}
        }
        Ok(())
    }

    /// Locks or unlocks the append bytes. Locking also reserves the slot
    /// of record `next_recno`, the record about to be appended.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if another handle is appending.
    pub fn lock_append(&mut self, option: LockOption, next_recno: u32) -> XbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match option {
            LockOption::Lock if self.append.is_none() => {
                self.enter()?;
                let taken = SlotLock::exclusive(&self.table_dir, self.flavor.append_slot())
                    .and_then(|append| {
                        let record = SlotLock::exclusive(
                            &self.table_dir,
                            self.flavor.record_slot(next_recno),
                        );
                        match record {
                            Ok(record) => Ok((append, record)),
                            Err(e) => {
                                append.release()?;
                                Err(e)
                            }
                        }
                    });
                match taken {
                    Ok(pair) => self.append = Some(pair),
                    Err(e) => {
                        self.leave()?;
                        return Err(e);
                    }
                }
            }
            LockOption::Unlock => {
                if let Some((append, record)) = self.append.take() {
                    record.release()?;
                    append.release()?;
                    self.leave()?;
                }
            }
            LockOption::Lock => {}
        }
        Ok(())
    }

    /// Locks or unlocks record `recno`.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the record is locked elsewhere.
    pub fn lock_record(&mut self, option: LockOption, recno: u32) -> XbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match option {
            LockOption::Lock if !self.records.contains_key(&recno) => {
                self.enter()?;
                match SlotLock::exclusive(&self.table_dir, self.flavor.record_slot(recno)) {
                    Ok(lock) => {
                        self.records.insert(recno, lock);
                    }
                    Err(e) => {
                        self.leave()?;
                        return Err(e);
                    }
                }
            }
            LockOption::Unlock => {
                if let Some(lock) = self.records.remove(&recno) {
                    lock.release()?;
                    self.leave()?;
                }
            }
            LockOption::Lock => {}
        }
        Ok(())
    }

    /// Locks or unlocks the memo file at `memo_path`.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the memo file is locked elsewhere.
    pub fn lock_memo(&mut self, option: LockOption, memo_path: &Path) -> XbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match option {
            LockOption::Lock if self.memo.is_none() => {
                self.enter()?;
                let dir = slot_dir(memo_path, self.suffix);
                match SlotLock::exclusive(&dir, self.flavor.header_slot()) {
                    Ok(lock) => self.memo = Some(lock),
                    Err(e) => {
                        self.leave()?;
                        return Err(e);
                    }
                }
            }
            LockOption::Unlock => {
                if let Some(lock) = self.memo.take() {
                    lock.release()?;
                    self.leave()?;
                }
            }
            LockOption::Lock => {}
        }
        Ok(())
    }

    /// Locks or unlocks every index file in `paths`, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if any index is locked elsewhere; locks taken
    /// before the failure are released.
    pub fn lock_indices(&mut self, option: LockOption, paths: &[PathBuf]) -> XbResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match option {
            LockOption::Lock if self.indices.is_empty() && !paths.is_empty() => {
                self.enter()?;
                let mut taken = Vec::with_capacity(paths.len());
                for path in paths {
                    let dir = slot_dir(path, self.suffix);
                    match SlotLock::exclusive(&dir, self.flavor.header_slot()) {
                        Ok(lock) => taken.push(lock),
                        Err(e) => {
                            for lock in taken.into_iter().rev() {
                                lock.release()?;
                            }
                            self.leave()?;
                            return Err(e);
                        }
                    }
                }
                self.indices = taken;
            }
            LockOption::Unlock => {
                if !self.indices.is_empty() {
                    for lock in std::mem::take(&mut self.indices).into_iter().rev() {
                        lock.release()?;
                    }
                    self.leave()?;
                }
            }
            LockOption::Lock => {}
        }
        Ok(())
    }

    /// Releases everything this handle holds, in reverse acquisition order.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error met; later locks are still released.
    pub fn release_all(&mut self) -> XbResult<()> {
        let mut first_err = None;
        let mut note = |r: XbResult<()>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };

        for lock in std::mem::take(&mut self.indices).into_iter().rev() {
            note(lock.release());
        }
        if let Some(lock) = self.memo.take() {
            note(lock.release());
        }
        for (_, lock) in std::mem::take(&mut self.records) {
            note(lock.release());
        }
        if let Some((append, record)) = self.append.take() {
            note(record.release());
            note(append.release());
        }
        if let Some(lock) = self.header.take() {
            note(lock.release());
        }
        self.table = false;
        if let Some(mut intent) = self.intent.take() {
            note(intent.downgrade());
            note(intent.release());
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> LockManager {
        LockManager::new(&dir.join("T.DBF"), true, LockFlavor::DbaseSlotFiles, ".lck")
    }

    #[test]
    fn table_lock_excludes_other_handles() {
        let dir = tempdir().unwrap();
        let mut a = manager(dir.path());
        let mut b = manager(dir.path());

        a.lock_table(LockOption::Lock).unwrap();
        assert!(b.lock_table(LockOption::Lock).unwrap_err().is_lock_failed());
        assert!(b.lock_header(LockOption::Lock).unwrap_err().is_lock_failed());

        a.lock_table(LockOption::Unlock).unwrap();
        b.lock_table(LockOption::Lock).unwrap();
        assert!(b.holds(LockResource::Table));
    }

    #[test]
    fn record_locks_are_per_record() {
        let dir = tempdir().unwrap();
        let mut a = manager(dir.path());
        let mut b = manager(dir.path());

        a.lock_record(LockOption::Lock, 1).unwrap();
        assert!(b.lock_record(LockOption::Lock, 1).is_err());
        b.lock_record(LockOption::Lock, 2).unwrap();

        // Any held lock blocks the table lock of another handle.
        assert!(a.lock_table(LockOption::Lock).is_err());
        b.release_all().unwrap();
        a.lock_table(LockOption::Lock).unwrap();
        assert!(a.holds(LockResource::Record(1)));
    }

    #[test]
    fn append_reserves_next_record() {
        let dir = tempdir().unwrap();
        let mut a = manager(dir.path());
        let mut b = manager(dir.path());

        a.lock_append(LockOption::Lock, 4).unwrap();
        assert!(b.lock_record(LockOption::Lock, 4).is_err());
        assert!(b.lock_append(LockOption::Lock, 4).is_err());
        a.lock_append(LockOption::Unlock, 4).unwrap();
        b.lock_record(LockOption::Lock, 4).unwrap();
    }

    #[test]
    fn index_locks_are_all_or_nothing() {
        let dir = tempdir().unwrap();
        let one = dir.path().join("A.NDX");
        let two = dir.path().join("B.NDX");
        let mut a = manager(dir.path());
        let mut b = manager(dir.path());

        a.lock_indices(LockOption::Lock, &[two.clone()]).unwrap();
        assert!(b.lock_indices(LockOption::Lock, &[one.clone(), two.clone()]).is_err());
        assert!(!b.holds(LockResource::Index));

        a.lock_indices(LockOption::Unlock, &[]).unwrap();
        b.lock_indices(LockOption::Lock, &[one, two]).unwrap();
    }

    #[test]
    fn slot_locks_leave_the_table_file_unlocked() {
        use fs2::FileExt;

        let dir = tempdir().unwrap();
        let table = dir.path().join("T.DBF");
        std::fs::write(&table, b"table").unwrap();
        let mut a = manager(dir.path());
        a.lock_table(LockOption::Lock).unwrap();
        a.lock_record(LockOption::Lock, 1).unwrap();

        let file = std::fs::File::open(&table).unwrap();
        FileExt::try_lock_exclusive(&file).unwrap();
        FileExt::unlock(&file).unwrap();
        assert!(dir.path().join("T.DBF.lck").is_dir());
    }

    #[test]
    fn disabled_manager_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut a = LockManager::new(&dir.path().join("T.DBF"), false, LockFlavor::DbaseSlotFiles, ".lck");
        let mut b = LockManager::new(&dir.path().join("T.DBF"), false, LockFlavor::DbaseSlotFiles, ".lck");
        a.lock_table(LockOption::Lock).unwrap();
        b.lock_table(LockOption::Lock).unwrap();
        assert!(!a.holds(LockResource::Table));
        assert!(!dir.path().join("T.DBF.lck").exists());
    }
}
