//! DBF tables: the record manager.
//!
//! A [`Table`] owns the data file, its memo file, the open indices and the
//! lock manager of one handle. Every record mutation goes through the
//! commit protocol in `update.rs`, which keeps every open tag in step with
//! the data file.
//!
//! # Record buffers
//!
//! Each handle keeps two buffers: the *current* buffer, which field puts
//! edit, and the *original* buffer, the record as last read or written.
//! Index maintenance compares the keys of the two to decide what to add
//! and what to remove.
//!
//! # Example
//!
//! ```rust,ignore
//! use xbase_core::{Config, FieldSpec, Table, TableVersion};
//!
//! let fields = [FieldSpec::char("NAME", 20), FieldSpec::numeric("AMOUNT", 9, 2)];
//! let mut table = Table::create(path, &fields, TableVersion::V4, false, Config::default())?;
//! table.blank_record()?;
//! table.put_char("NAME", "Alice")?;
//! table.put_double("AMOUNT", 12.5)?;
//! table.append_record()?;
//! table.close()?;
//! ```

mod fields;
mod format;
mod header;
mod indexing;
mod locking;
mod maintain;
mod navigate;
mod update;

pub use fields::FieldRef;
pub use format::{Dbase3, Dbase4, TableFormat, TableVersion, MAX_CHAR_LEN, MAX_NUMERIC_LEN};
pub use header::{
    decode_fields, encode_fields, update_stamp, TableHeader, DESCRIPTOR_LEN, EOF_MARKER,
    HEADER_TERMINATOR,
};

use crate::config::Config;
use crate::error::{from_storage, ErrorCode, XbError, XbResult};
use crate::expr::{ExpressionProvider, RecordView, SimpleExpressions};
use crate::index::mdx::MdxOptions;
use crate::index::{Index, IndexRegistry, MdxFile, NdxFile, TagHandle};
use crate::inf;
use crate::lock::{LockManager, LockOption};
use crate::memo::{memo_path, DbtFile, MemoManager};
use crate::schema::{layout, FieldDesc, FieldSpec};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xbase_storage::fsops::{remove_file_if_exists, sibling_with_extension, stem_upper};
use xbase_storage::{FileBackend, StorageBackend};

/// Lifecycle state of a table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Closed; every operation fails with `NotOpen`.
    Closed,
    /// Open with no pending edits.
    Open,
    /// The current buffer differs from the original.
    Updated,
}

/// Outcome of a navigation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    /// Positioned on this record.
    Record(u32),
    /// Walked past the last record or key.
    Eof,
    /// Walked before the first record or key.
    Bof,
    /// Nothing to walk.
    Empty,
}

impl Nav {
    /// The record reached, if any.
    #[must_use]
    pub const fn recno(self) -> Option<u32> {
        match self {
            Self::Record(n) => Some(n),
            _ => None,
        }
    }

    /// Classic return code of the outcome.
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::Record(_) => ErrorCode::NoError,
            Self::Eof => ErrorCode::Eof,
            Self::Bof => ErrorCode::Bof,
            Self::Empty => ErrorCode::Empty,
        }
    }
}

/// Which records sequential navigation visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Every record.
    #[default]
    All,
    /// Records without the delete flag.
    ActiveOnly,
    /// Records with the delete flag.
    DeletedOnly,
}

impl Scope {
    /// Whether a record with the given delete flag is in scope.
    #[must_use]
    pub const fn admits(self, deleted: bool) -> bool {
        match self {
            Self::All => true,
            Self::ActiveOnly => !deleted,
            Self::DeletedOnly => deleted,
        }
    }
}

/// Per-table auto-commit setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoCommit {
    /// Follow [`Config::auto_commit`].
    #[default]
    UseDefault,
    /// Discard pending edits when repositioning.
    Off,
    /// Commit pending edits when repositioning.
    On,
}

impl TryFrom<i16> for AutoCommit {
    type Error = XbError;

    fn try_from(value: i16) -> XbResult<Self> {
        match value {
            -1 => Ok(Self::UseDefault),
            0 => Ok(Self::Off),
            1 => Ok(Self::On),
            other => Err(XbError::InvalidOption(format!("auto commit {other}"))),
        }
    }
}

/// What [`Table::delete_all`] does to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAllOption {
    /// Set the delete flag.
    Delete,
    /// Clear the delete flag.
    Undelete,
}

/// An open DBF table.
#[derive(Debug)]
pub struct Table {
    path: PathBuf,
    config: Config,
    backend: FileBackend,
    header: TableHeader,
    fields: Vec<FieldDesc>,
    status: TableStatus,
    cur_rec: u32,
    current: Vec<u8>,
    original: Vec<u8>,
    auto_commit: AutoCommit,
    locks: LockManager,
    indices: IndexRegistry,
    current_tag: Option<TagHandle>,
    memo: Option<MemoManager>,
    provider: Box<dyn ExpressionProvider>,
}

impl Table {
    /// Creates a table with the built-in expression provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldName`, `InvalidFieldType` or `InvalidFieldLen`
    /// for a bad field, `AlreadyDefined` for a repeated name and
    /// `FileExists` if the file exists and `overlay` is false.
    pub fn create(
        path: &Path,
        specs: &[FieldSpec],
        version: TableVersion,
        overlay: bool,
        config: Config,
    ) -> XbResult<Self> {
        Self::create_with_provider(path, specs, version, overlay, config, Box::new(SimpleExpressions))
    }

    /// Creates a table whose tags compile through `provider`.
    ///
    /// Writes the header and field descriptors, creates the memo file when
    /// a memo field is present and an empty production MDX when
    /// [`Config::create_production_index`] is set.
    ///
    /// # Errors
    ///
    /// See [`Table::create`].
    pub fn create_with_provider(
        path: &Path,
        specs: &[FieldSpec],
        version: TableVersion,
        overlay: bool,
        config: Config,
        provider: Box<dyn ExpressionProvider>,
    ) -> XbResult<Self> {
        config.validate()?;
        if specs.is_empty() {
            return Err(XbError::InvalidFieldNo(0));
        }
        let format = version.format();
        let checked = specs
            .iter()
            .map(|spec| format.check_field(spec))
            .collect::<XbResult<Vec<_>>>()?;
        for (i, spec) in checked.iter().enumerate() {
            if checked[..i].iter().any(|s| s.name.eq_ignore_ascii_case(&spec.name)) {
                return Err(XbError::AlreadyDefined(spec.name.to_ascii_uppercase()));
            }
        }
        let (fields, record_len) = layout(&checked);
        if record_len > usize::from(u16::MAX) {
            return Err(XbError::InvalidFieldLen {
                field: "*".into(),
                len: record_len,
                decimals: 0,
            });
        }

        let mut header = TableHeader::new(version, &fields, record_len);
        header.production_mdx = config.create_production_index;
        let mut backend = FileBackend::create(path, overlay).map_err(from_storage)?;
        let mut image = header.encode().to_vec();
        image.extend_from_slice(&encode_fields(&fields));
        image.push(EOF_MARKER);
        backend.write_at(0, &image)?;

        let stem = stem_upper(path);
        if overlay {
            remove_file_if_exists(&inf::inf_path(path))?;
            if !header.production_mdx {
                remove_file_if_exists(&sibling_with_extension(path, "MDX"))?;
            }
        }
        let memo = if header.has_memo {
            let dbt = DbtFile::create(&memo_path(path), &stem, format.memo_version(), overlay)?;
            Some(MemoManager::new(Box::new(dbt)))
        } else {
            None
        };

        let mut table = Self::assemble(path, config, backend, header, fields, memo, provider);
        if table.header.production_mdx {
            let options = table.mdx_options(true, false);
            let mdx = MdxFile::create(&sibling_with_extension(path, "MDX"), &stem, options, overlay)?;
            table.indices.add(Index::Mdx(mdx));
        }
        debug!(path = %path.display(), fields = table.fields.len(), record_len, "table created");
        Ok(table)
    }

    /// Opens a table with the built-in expression provider.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the table, its memo file or an index it
    /// lists is missing, `LockFailed` if the header is locked elsewhere.
    pub fn open(path: &Path, config: Config) -> XbResult<Self> {
        Self::open_with_provider(path, config, Box::new(SimpleExpressions))
    }

    /// Opens a table whose tags compile through `provider`.
    ///
    /// Reads the header under the header lock, then opens the memo file,
    /// the production MDX when the header flags one and every NDX listed
    /// in the table's INF file. The first open tag becomes current.
    ///
    /// # Errors
    ///
    /// See [`Table::open`].
    pub fn open_with_provider(
        path: &Path,
        config: Config,
        provider: Box<dyn ExpressionProvider>,
    ) -> XbResult<Self> {
        config.validate()?;
        let backend = FileBackend::open(path).map_err(from_storage)?;
        let mut locks = LockManager::new(
            path,
            config.locking_enabled(),
            config.lock_flavor,
            config.lock_dir_suffix,
        );
        locks.lock_header(LockOption::Lock)?;
        let loaded = read_schema(&backend);
        locks.lock_header(LockOption::Unlock)?;
        let (header, fields) = loaded?;

        let memo = if header.has_memo {
            let dbt = DbtFile::open(&memo_path(path), header.version.format().memo_version())?;
            Some(MemoManager::new(Box::new(dbt)))
        } else {
            None
        };
        let mut table = Self::assemble(path, config, backend, header, fields, memo, provider);
        table.locks = locks;

        if table.header.production_mdx {
            let mdx = MdxFile::open(
                &sibling_with_extension(path, "MDX"),
                &table.fields,
                table.provider.as_ref(),
                table.config.node_policy,
                table.config.node_cache_capacity,
            )?;
            table.indices.add(Index::Mdx(mdx));
        }
        for entry in inf::load(path)? {
            let ndx = NdxFile::open(
                &inf::resolve(path, &entry),
                &table.fields,
                table.provider.as_ref(),
                table.config.node_cache_capacity,
            )?;
            table.indices.add(Index::Ndx(ndx));
        }
        table.current_tag = table.indices.handles().first().copied();
        debug!(
            path = %path.display(),
            records = table.header.record_count,
            indices = table.indices.len(),
            "table opened"
        );
        Ok(table)
    }

    fn assemble(
        path: &Path,
        config: Config,
        backend: FileBackend,
        header: TableHeader,
        fields: Vec<FieldDesc>,
        memo: Option<MemoManager>,
        provider: Box<dyn ExpressionProvider>,
    ) -> Self {
        let blank = vec![b' '; usize::from(header.record_len)];
        let locks = LockManager::new(
            path,
            config.locking_enabled(),
            config.lock_flavor,
            config.lock_dir_suffix,
        );
        Self {
            path: path.to_path_buf(),
            config,
            backend,
            header,
            fields,
            status: TableStatus::Open,
            cur_rec: 0,
            current: blank.clone(),
            original: blank,
            auto_commit: AutoCommit::UseDefault,
            locks,
            indices: IndexRegistry::new(),
            current_tag: None,
            memo,
            provider,
        }
    }

    pub(crate) fn mdx_options(&self, production: bool, temporary: bool) -> MdxOptions {
        MdxOptions {
            block_size: self.config.mdx_block_size,
            policy: self.config.node_policy,
            production,
            temporary,
            cache_capacity: self.config.node_cache_capacity,
        }
    }

    /// Commits or discards pending edits, closes every index (deleting
    /// temporary ones), flushes the files and releases every lock.
    ///
    /// Closing a closed table does nothing. Everything is released even
    /// when a step fails; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error met while committing or flushing.
    pub fn close(&mut self) -> XbResult<()> {
        if self.status == TableStatus::Closed {
            return Ok(());
        }
        let mut first_err = None;
        let mut note = |r: XbResult<()>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };

        if self.status == TableStatus::Updated {
            if self.auto_commit(true) {
                note(self.commit());
            } else {
                note(self.abort());
            }
        }
        for (_, mut index) in self.indices.drain() {
            note(index.format_mut().close());
        }
        if let Some(memo) = self.memo.as_mut() {
            note(memo.flush());
        }
        note(self.backend.flush().map_err(XbError::from));
        note(self.locks.release_all());

        self.current_tag = None;
        self.memo = None;
        self.status = TableStatus::Closed;
        debug!(path = %self.path.display(), "table closed");
        first_err.map_or(Ok(()), Err)
    }

    /// Path of the data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings the table was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Format version.
    #[must_use]
    pub fn version(&self) -> TableVersion {
        self.header.version
    }

    /// The header as last read or written.
    #[must_use]
    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// Lifecycle state.
    #[must_use]
    pub fn status(&self) -> TableStatus {
        self.status
    }

    /// Records in the table, deleted ones included.
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.header.record_count
    }

    /// Current record number; 0 when none.
    #[must_use]
    pub fn current_recno(&self) -> u32 {
        self.cur_rec
    }

    /// Field descriptors in record order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Bytes per record, delete flag included.
    #[must_use]
    pub fn record_len(&self) -> usize {
        usize::from(self.header.record_len)
    }

    /// The current record buffer.
    #[must_use]
    pub fn record_buf(&self) -> &[u8] {
        &self.current
    }

    /// The record as last read or written.
    #[must_use]
    pub fn original_buf(&self) -> &[u8] {
        &self.original
    }

    /// Whether the current buffer carries the delete flag.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.current.first() == Some(&b'*')
    }

    /// Whether the table has a memo file.
    #[must_use]
    pub fn has_memo(&self) -> bool {
        self.memo.is_some()
    }

    /// Path of the memo file, if any.
    #[must_use]
    pub fn memo_path(&self) -> Option<&Path> {
        self.memo.as_ref().map(MemoManager::path)
    }

    /// The per-table auto-commit setting.
    #[must_use]
    pub fn auto_commit_setting(&self) -> AutoCommit {
        self.auto_commit
    }

    /// Changes the per-table auto-commit setting.
    pub fn set_auto_commit(&mut self, setting: AutoCommit) {
        self.auto_commit = setting;
    }

    /// Effective auto-commit. With `check_both`, a table left at
    /// [`AutoCommit::UseDefault`] follows the configured default; without
    /// it only an explicit [`AutoCommit::On`] counts.
    #[must_use]
    pub fn auto_commit(&self, check_both: bool) -> bool {
        match self.auto_commit {
            AutoCommit::On => true,
            AutoCommit::Off => false,
            AutoCommit::UseDefault => check_both && self.config.auto_commit,
        }
    }

    pub(crate) fn ensure_open(&self) -> XbResult<()> {
        if self.status == TableStatus::Closed {
            Err(XbError::NotOpen)
        } else {
            Ok(())
        }
    }

    /// Whether updates take their own locks: locking is on and this handle
    /// does not already hold the whole table.
    pub(crate) fn auto_locks(&self) -> bool {
        self.locks.is_enabled() && !self.locks.holds(crate::lock::LockResource::Table)
    }

    pub(crate) fn view<'a>(&'a self, buf: &'a [u8]) -> RecordView<'a> {
        RecordView::new(&self.fields, buf)
    }

    /// Re-reads the fixed header, picking up appends by other handles.
    pub(crate) fn refresh_header(&mut self) -> XbResult<()> {
        let buf = self.backend.read_at(0, DESCRIPTOR_LEN)?;
        let fresh = TableHeader::decode(&buf)?;
        if fresh.record_len != self.header.record_len || fresh.header_len != self.header.header_len {
            return Err(XbError::invalid_data(
                "header",
                "record layout changed while the table was open",
            ));
        }
        self.header = fresh;
        Ok(())
    }

    /// Record count as stored on disk, without touching the cached header.
    pub(crate) fn stored_record_count(&self) -> XbResult<u32> {
        let buf = self.backend.read_at(4, 4)?;
        Ok(xbase_storage::endian::get_u32(&buf, 0))
    }

    /// Writes version, update date and record count.
    pub(crate) fn write_prolog(&mut self) -> XbResult<()> {
        self.backend.write_at(0, &self.header.prolog())?;
        Ok(())
    }

    /// Writes the full 32-byte header.
    pub(crate) fn write_header(&mut self) -> XbResult<()> {
        self.backend.write_at(0, &self.header.encode())?;
        Ok(())
    }

    pub(crate) fn read_record_at(&self, recno: u32) -> XbResult<Vec<u8>> {
        let buf = self
            .backend
            .read_at(self.header.record_offset(recno), self.record_len())?;
        Ok(buf)
    }

    pub(crate) fn write_record_at(&mut self, recno: u32, buf: &[u8]) -> XbResult<()> {
        self.backend.write_at(self.header.record_offset(recno), buf)?;
        Ok(())
    }

    /// Writes the end-of-file marker after the last record.
    pub(crate) fn write_eof(&mut self) -> XbResult<()> {
        let at = self.header.record_offset(self.header.record_count + 1);
        self.backend.write_at(at, &[EOF_MARKER])?;
        Ok(())
    }

    pub(crate) fn check_recno(&self, recno: u32) -> XbResult<()> {
        if recno == 0 || recno > self.header.record_count {
            return Err(XbError::InvalidRecord {
                recno,
                count: self.header.record_count,
            });
        }
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if self.status != TableStatus::Closed {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), error = %e, "table close on drop failed");
            }
        }
    }
}

/// Reads the fixed header and field descriptors.
fn read_schema(backend: &dyn StorageBackend) -> XbResult<(TableHeader, Vec<FieldDesc>)> {
    let size = backend.size()?;
    if size < DESCRIPTOR_LEN as u64 {
        return Err(XbError::invalid_data("header", format!("file is {size} bytes")));
    }
    let header = TableHeader::decode(&backend.read_at(0, DESCRIPTOR_LEN)?)?;
    let descriptors = backend.read_at(
        DESCRIPTOR_LEN as u64,
        usize::from(header.header_len) - DESCRIPTOR_LEN,
    )?;
    let fields = decode_fields(&descriptors, header.field_count(), usize::from(header.record_len))?;
    Ok((header, fields))
}
