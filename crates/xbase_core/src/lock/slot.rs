//! Advisory lock slot files.
//!
//! Each lockable resource maps to one file in a sidecar directory next to
//! the table, index or memo file. Holding an `fs2` lock on that file is
//! holding the resource. Nothing is locked inside the data, index or memo
//! files themselves, so only handles using the same sidecar directory
//! exclude each other.
//!
//! `fs2` methods are called through the trait: newer toolchains give
//! `File` inherent lock methods of the same names.

use crate::error::{XbError, XbResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar directory holding the slot files of `file`.
pub(crate) fn slot_dir(file: &Path, suffix: &str) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// A held lock on one slot file.
#[derive(Debug)]
pub(crate) struct SlotLock {
    path: PathBuf,
    file: File,
    exclusive: bool,
}

impl SlotLock {
    /// Takes an exclusive lock on slot `slot` in `dir` without waiting.
    pub(crate) fn exclusive(dir: &Path, slot: u64) -> XbResult<Self> {
        Self::acquire(dir, slot, true)
    }

    /// Takes a shared lock on slot `slot` in `dir` without waiting.
    pub(crate) fn shared(dir: &Path, slot: u64) -> XbResult<Self> {
        Self::acquire(dir, slot, false)
    }

    fn acquire(dir: &Path, slot: u64, exclusive: bool) -> XbResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(slot.to_string());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let taken = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        if taken.is_err() {
            debug!(path = %path.display(), exclusive, "lock busy");
            return Err(XbError::lock_failed(path.display().to_string()));
        }

        let lock = Self {
            path,
            file,
            exclusive,
        };
        // The previous holder may have unlinked the file between our open
        // and our lock.
        if !lock.still_linked() {
            let _ = FileExt::unlock(&lock.file);
            return Err(XbError::lock_failed(lock.path.display().to_string()));
        }
        debug!(path = %lock.path.display(), exclusive, "lock acquired");
        Ok(lock)
    }

    #[cfg(unix)]
    fn still_linked(&self) -> bool {
        use std::os::unix::fs::MetadataExt;
        match (self.file.metadata(), fs::metadata(&self.path)) {
            (Ok(held), Ok(named)) => held.dev() == named.dev() && held.ino() == named.ino(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn still_linked(&self) -> bool {
        self.path.exists()
    }

    /// Whether the lock is exclusive.
    pub(crate) fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Converts the held lock to exclusive without waiting.
    ///
    /// On failure the lock is shared again, or released if even that is no
    /// longer possible.
    pub(crate) fn upgrade(&mut self) -> XbResult<()> {
        if self.exclusive {
            return Ok(());
        }
        if FileExt::try_lock_exclusive(&self.file).is_ok() {
            self.exclusive = true;
            return Ok(());
        }
        // Conversion is not atomic on every platform; make sure we still
        // hold what we had.
        FileExt::try_lock_shared(&self.file).map_err(|_| {
            XbError::lock_failed(format!("{} (shared lock lost)", self.path.display()))
        })?;
        Err(XbError::lock_failed(self.path.display().to_string()))
    }

    /// Converts a held exclusive lock back to shared.
    pub(crate) fn downgrade(&mut self) -> XbResult<()> {
        if self.exclusive {
            FileExt::lock_shared(&self.file)?;
            self.exclusive = false;
        }
        Ok(())
    }

    /// Releases the lock. Exclusive slots are unlinked first, while still
    /// held, so the next holder always works on a fresh file.
    pub(crate) fn release(self) -> XbResult<()> {
        if self.exclusive {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        FileExt::unlock(&self.file)?;
        debug!(path = %self.path.display(), "lock released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exclusive_slots_conflict() {
        let dir = tempdir().unwrap();
        let first = SlotLock::exclusive(dir.path(), 7).unwrap();
        assert!(SlotLock::exclusive(dir.path(), 7).unwrap_err().is_lock_failed());
        assert!(SlotLock::exclusive(dir.path(), 8).is_ok());

        first.release().unwrap();
        assert!(!dir.path().join("7").exists());
        assert!(SlotLock::exclusive(dir.path(), 7).is_ok());
    }

    #[test]
    fn shared_slots_coexist() {
        let dir = tempdir().unwrap();
        let a = SlotLock::shared(dir.path(), 1).unwrap();
        let mut b = SlotLock::shared(dir.path(), 1).unwrap();
        assert!(SlotLock::exclusive(dir.path(), 1).is_err());
        assert!(b.upgrade().is_err());
        assert!(!b.is_exclusive());

        a.release().unwrap();
        b.upgrade().unwrap();
        assert!(b.is_exclusive());
        b.downgrade().unwrap();
        assert!(SlotLock::shared(dir.path(), 1).is_ok());
    }

    #[test]
    fn sidecar_dir_appends_suffix() {
        assert_eq!(
            slot_dir(Path::new("/data/ORDERS.DBF"), ".lck"),
            PathBuf::from("/data/ORDERS.DBF.lck")
        );
    }
}
