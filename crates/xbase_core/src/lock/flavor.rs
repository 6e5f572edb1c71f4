//! Lock flavors and lock options.

use crate::error::{XbError, XbResult};

/// Byte offset dBASE uses for header, index and memo locks.
pub const DBASE_LOCK_BASE: u64 = 4_026_531_838;

/// Width of the dBASE table lock range below [`DBASE_LOCK_BASE`].
const DBASE_TABLE_SPAN: u64 = 1_000_000_000;

/// Naming convention for lock slots.
///
/// Slot files are named after the byte offset dBASE would lock, but the
/// lock is taken on the slot file, not on that byte range of the table.
/// Handles of this library exclude each other; a dBASE or other xBase
/// process locking byte ranges in the same files is not excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockFlavor {
    /// Sidecar slot files named after dBASE offsets counted down from
    /// 4026531838.
    #[default]
    DbaseSlotFiles,
}

impl LockFlavor {
    /// Slot of the whole-table intent lock.
    #[must_use]
    pub const fn table_slot(self) -> u64 {
        match self {
            Self::DbaseSlotFiles => DBASE_LOCK_BASE - DBASE_TABLE_SPAN,
        }
    }

    /// Slot of the table header lock. Also used for index and memo files,
    /// which carry their own slot directory.
    #[must_use]
    pub const fn header_slot(self) -> u64 {
        match self {
            Self::DbaseSlotFiles => DBASE_LOCK_BASE,
        }
    }

    /// Slot of the append-bytes lock.
    #[must_use]
    pub const fn append_slot(self) -> u64 {
        match self {
            Self::DbaseSlotFiles => DBASE_LOCK_BASE + 1,
        }
    }

    /// Slot of record `recno`.
    #[must_use]
    pub const fn record_slot(self, recno: u32) -> u64 {
        match self {
            Self::DbaseSlotFiles => DBASE_LOCK_BASE - recno as u64,
        }
    }
}

impl TryFrom<i16> for LockFlavor {
    type Error = XbError;

    fn try_from(value: i16) -> XbResult<Self> {
        match value {
            1 => Ok(Self::DbaseSlotFiles),
            other => Err(XbError::InvalidLockOption(other)),
        }
    }
}

/// Lock or unlock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOption {
    /// Acquire without waiting.
    Lock,
    /// Release.
    Unlock,
}

impl TryFrom<i16> for LockOption {
    type Error = XbError;

    fn try_from(value: i16) -> XbResult<Self> {
        match value {
            0 => Ok(Self::Lock),
            1 => Ok(Self::Unlock),
            other => Err(XbError::InvalidLockOption(other)),
        }
    }
}
