//! Table configuration.
//!
//! A [`Config`] is handed to [`crate::Table::create`] and [`crate::Table::open`]
//! and stays with the handle for its lifetime. There is no process-wide
//! mutable state; `Config::default()` carries the classic defaults.

use crate::error::{XbError, XbResult};
use crate::lock::LockFlavor;

/// Smallest MDX block size accepted.
pub const MIN_MDX_BLOCK_SIZE: usize = 1024;
/// Largest MDX block size accepted.
pub const MAX_MDX_BLOCK_SIZE: usize = 32 * 1024;

/// Duplicate-key and deleted-record policy for index maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// dBASE compatibility: a duplicate on a unique tag is accepted into the
    /// table but only the first record's key is indexed; deleted records
    /// stay indexed.
    #[default]
    EmulateDbase,
    /// Unique tags reject duplicates with `KeyNotUnique`; deleted records are
    /// removed from every index.
    HaltOnDupKey,
}

impl IndexMode {
    /// Label printed by the maintenance tools.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::EmulateDbase => "XB_IX_DBASE_MODE",
            Self::HaltOnDupKey => "XB_IX_XBASE_MODE",
        }
    }

    /// Whether deleted records carry index keys under this mode.
    #[must_use]
    pub const fn indexes_deleted(self) -> bool {
        matches!(self, Self::EmulateDbase)
    }
}

impl TryFrom<i16> for IndexMode {
    type Error = XbError;

    fn try_from(value: i16) -> XbResult<Self> {
        match value {
            0 => Ok(Self::EmulateDbase),
            1 => Ok(Self::HaltOnDupKey),
            other => Err(XbError::InvalidOption(format!("index mode {other}"))),
        }
    }
}

/// What happens to an index node once its last key is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodePolicy {
    /// Emptied nodes go onto the file's free-page chain and are reused by
    /// later splits (MDX/TDX).
    #[default]
    ReuseEmptyNodes,
    /// Emptied nodes are unlinked from the tree and left in place.
    LeaveStranded,
}

/// Configuration for opening or creating a table.
#[derive(Debug, Clone)]
pub struct Config {
    /// Skip all locking. Unsafe if the files are shared.
    pub single_user: bool,

    /// Take header/append/record/index locks implicitly around updates.
    pub auto_lock: bool,

    /// Default auto-commit behavior for tables left at `AutoCommit::UseDefault`.
    pub auto_commit: bool,

    /// Duplicate-key policy for index maintenance.
    pub index_mode: IndexMode,

    /// Byte-range convention used for locks.
    pub lock_flavor: LockFlavor,

    /// Block size for new MDX/TDX files, a multiple of 512.
    pub mdx_block_size: usize,

    /// Reuse policy for emptied index nodes.
    pub node_policy: NodePolicy,

    /// Suffix of the sidecar directory holding lock slot files.
    pub lock_dir_suffix: &'static str,

    /// Number of decoded index nodes kept per tag before the cache is flushed.
    pub node_cache_capacity: usize,

    /// Create an empty production MDX alongside new tables.
    pub create_production_index: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            single_user: false,
            auto_lock: true,
            auto_commit: true,
            index_mode: IndexMode::EmulateDbase,
            lock_flavor: LockFlavor::DbaseSlotFiles,
            mdx_block_size: 1024,
            node_policy: NodePolicy::ReuseEmptyNodes,
            lock_dir_suffix: ".lck",
            node_cache_capacity: 256,
            create_production_index: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets single-user mode.
    #[must_use]
    pub const fn single_user(mut self, value: bool) -> Self {
        self.single_user = value;
        self
    }

    /// Sets implicit locking around updates.
    #[must_use]
    pub const fn auto_lock(mut self, value: bool) -> Self {
        self.auto_lock = value;
        self
    }

    /// Sets the default auto-commit behavior.
    #[must_use]
    pub const fn auto_commit(mut self, value: bool) -> Self {
        self.auto_commit = value;
        self
    }

    /// Sets the index duplicate-key mode.
    #[must_use]
    pub const fn index_mode(mut self, mode: IndexMode) -> Self {
        self.index_mode = mode;
        self
    }

    /// Sets the lock flavor.
    #[must_use]
    pub const fn lock_flavor(mut self, flavor: LockFlavor) -> Self {
        self.lock_flavor = flavor;
        self
    }

    /// Sets the MDX/TDX block size for new index files.
    #[must_use]
    pub const fn mdx_block_size(mut self, size: usize) -> Self {
        self.mdx_block_size = size;
        self
    }

    /// Sets the emptied-node policy.
    #[must_use]
    pub const fn node_policy(mut self, policy: NodePolicy) -> Self {
        self.node_policy = policy;
        self
    }

    /// Sets the node cache capacity per tag.
    #[must_use]
    pub const fn node_cache_capacity(mut self, nodes: usize) -> Self {
        self.node_cache_capacity = nodes;
        self
    }

    /// Sets whether [`crate::Table::create`] adds a production MDX.
    #[must_use]
    pub const fn create_production_index(mut self, value: bool) -> Self {
        self.create_production_index = value;
        self
    }

    /// Checks option combinations that cannot be expressed by the types.
    ///
    /// # Errors
    ///
    /// Returns [`XbError::InvalidBlockSize`] for an MDX block size that is not
    /// a multiple of 512 in `1024..=32768`.
    pub fn validate(&self) -> XbResult<()> {
        let size = self.mdx_block_size;
        if size % 512 != 0 || !(MIN_MDX_BLOCK_SIZE..=MAX_MDX_BLOCK_SIZE).contains(&size) {
            return Err(XbError::InvalidBlockSize(size));
        }
        Ok(())
    }

    /// Whether locks are actually taken.
    #[must_use]
    pub const fn locking_enabled(&self) -> bool {
        !self.single_user && self.auto_lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(!config.single_user);
        assert!(config.auto_lock);
        assert!(config.auto_commit);
        assert_eq!(config.index_mode, IndexMode::EmulateDbase);
        assert_eq!(config.mdx_block_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .single_user(true)
            .index_mode(IndexMode::HaltOnDupKey)
            .mdx_block_size(2048);

        assert!(config.single_user);
        assert!(!config.locking_enabled());
        assert_eq!(config.index_mode, IndexMode::HaltOnDupKey);
        assert_eq!(config.mdx_block_size, 2048);
    }

    #[test]
    fn block_size_must_be_page_multiple() {
        assert!(matches!(
            Config::new().mdx_block_size(1000).validate(),
            Err(XbError::InvalidBlockSize(1000))
        ));
        assert!(Config::new().mdx_block_size(512).validate().is_err());
        assert!(Config::new().mdx_block_size(65536).validate().is_err());
    }

    #[test]
    fn index_mode_from_code() {
        assert_eq!(IndexMode::try_from(1).unwrap(), IndexMode::HaltOnDupKey);
        assert!(IndexMode::try_from(7).is_err());
        assert_eq!(IndexMode::EmulateDbase.label(), "XB_IX_DBASE_MODE");
    }
}
