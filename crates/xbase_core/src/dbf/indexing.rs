//! Index management and key navigation for a table.
//!
//! Tags are addressed by [`TagHandle`]. One tag at a time is *current*;
//! the key search and key navigation calls walk it and position the table
//! on the record each key points at.

use super::{Nav, Table};
use crate::config::IndexMode;
use crate::date::Date;
use crate::error::{XbError, XbResult};
use crate::expr::{KeyType, KeyValue};
use crate::index::btree::{self, Cursor, NodeStore};
use crate::index::{
    check_tag, Index, IndexFormat, IndexId, IndexKind, IndexRegistry, IntegrityOutput, IntegrityReport, Lookup,
    MdxFile, NdxFile, ReindexScope, Tag, TagDef, TagHandle,
};
use crate::inf;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xbase_storage::fsops::{remove_file_if_exists, sibling_with_extension, stem_upper};

#[derive(Debug, Clone, Copy)]
enum KeyStep {
    First,
    Last,
    Next,
    Prev,
}

impl Table {
    /// Node access for one tag.
    pub(crate) fn tag_store(&mut self, handle: TagHandle) -> XbResult<Box<dyn NodeStore + '_>> {
        self.indices
            .get_mut(handle.index)?
            .format_mut()
            .node_store(handle.tag)
    }

    /// Re-reads the root and stamp of every tag so changes made through
    /// other handles are seen.
    pub(crate) fn refresh_tags(&mut self) -> XbResult<()> {
        for handle in self.indices.handles() {
            self.indices
                .get_mut(handle.index)?
                .format_mut()
                .refresh(handle.tag)?;
        }
        Ok(())
    }

    /// The open indices.
    #[must_use]
    pub fn indices(&self) -> &IndexRegistry {
        &self.indices
    }

    /// Number of open index files.
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Every open tag, production MDX first.
    #[must_use]
    pub fn tag_handles(&self) -> Vec<TagHandle> {
        self.indices.handles()
    }

    /// The tag behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a stale handle.
    pub fn tag(&self, handle: TagHandle) -> XbResult<&Tag> {
        self.indices.tag(handle)
    }

    /// Looks a tag up by case-insensitive name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` if no open tag has that name.
    pub fn tag_by_name(&self, name: &str) -> XbResult<TagHandle> {
        self.indices
            .find(name)
            .ok_or_else(|| XbError::InvalidTag(name.trim().to_string()))
    }

    /// The tag key navigation walks.
    #[must_use]
    pub fn current_tag(&self) -> Option<TagHandle> {
        self.current_tag
    }

    /// Makes `handle` the current tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a stale handle.
    pub fn set_current_tag(&mut self, handle: TagHandle) -> XbResult<()> {
        self.indices.tag(handle)?;
        self.current_tag = Some(handle);
        Ok(())
    }

    fn current_handle(&self) -> XbResult<TagHandle> {
        self.current_tag
            .ok_or_else(|| XbError::InvalidTag("no current tag".into()))
    }

    fn ndx_path(&self, name: &str) -> PathBuf {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let file = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{}.{}", name.to_ascii_uppercase(), IndexKind::Ndx.extension())
        };
        dir.join(file)
    }

    fn find_index(&self, kind: IndexKind) -> Option<IndexId> {
        self.indices
            .iter()
            .find(|(_, ix)| match kind {
                IndexKind::Mdx => ix.is_production(),
                _ => ix.kind() == kind,
            })
            .map(|(id, _)| id)
    }

    fn index_for_path(&self, path: &Path) -> Option<IndexId> {
        self.indices
            .iter()
            .find(|(_, ix)| ix.format().path() == path)
            .map(|(id, _)| id)
    }

    /// Creates a tag and builds it from the records already in the table.
    ///
    /// An NDX tag gets its own file named after the tag and is listed in
    /// the table's INF file. MDX tags go to the production MDX, which is
    /// created and flagged in the header when missing. TDX tags go to a
    /// temporary file removed on close. The new tag becomes current when
    /// no tag was.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTagName`, `InvalidKeyExpression` or `InvalidOption`
    /// for a bad definition, `AlreadyDefined` or `FileExists` for a name in
    /// use without `overlay`, `InvalidTag` when an MDX is full and
    /// `KeyNotUnique` when a unique tag meets a duplicate in
    /// [`IndexMode::HaltOnDupKey`]. A tag that fails to build is removed.
    pub fn create_tag(&mut self, kind: IndexKind, def: &TagDef, overlay: bool) -> XbResult<TagHandle> {
        self.ensure_open()?;
        self.settle_pending()?;
        let handle = match kind {
            IndexKind::Ndx => self.create_ndx(def, overlay)?,
            IndexKind::Mdx | IndexKind::Tdx => self.create_multi_tag(kind, def, overlay)?,
        };
        if let Err(e) = self.build_new_tag(handle) {
            warn!(tag = %def.name, error = %e, "tag build failed; removing tag");
            if let Err(undo) = self.delete_tag(handle) {
                warn!(tag = %def.name, error = %undo, "could not remove unbuilt tag");
            }
            return Err(e);
        }
        if self.current_tag.is_none() {
            self.current_tag = Some(handle);
        }
        info!(tag = %def.name, kind = %kind, records = self.header.record_count, "tag created");
        Ok(handle)
    }

    fn build_new_tag(&mut self, handle: TagHandle) -> XbResult<()> {
        let taken = self.acquire_table()?;
        let built = self
            .refresh_header()
            .and_then(|()| self.rebuild_index(handle.index));
        let released = self.release_table(taken);
        built.and(released)
    }

    fn create_ndx(&mut self, def: &TagDef, overlay: bool) -> XbResult<TagHandle> {
        let path = self.ndx_path(&def.name);
        if let Some(open) = self.index_for_path(&path) {
            if !overlay {
                return Err(XbError::AlreadyDefined(def.name.to_ascii_uppercase()));
            }
            self.close_index(open)?;
        }
        let ndx = NdxFile::create(
            &path,
            def,
            &self.fields,
            self.provider.as_ref(),
            overlay,
            self.config.node_cache_capacity,
        )?;
        let tag = ndx.tags()[0].id();
        let index = self.indices.add(Index::Ndx(ndx));
        inf::register(&self.path, &path)?;
        Ok(TagHandle { index, tag })
    }

    fn create_multi_tag(&mut self, kind: IndexKind, def: &TagDef, overlay: bool) -> XbResult<TagHandle> {
        let index = match self.find_index(kind) {
            Some(id) => id,
            None => self.create_multi_file(kind)?,
        };
        let tag = self.indices.get_mut(index)?.format_mut().create_tag(
            def,
            &self.fields,
            self.provider.as_ref(),
            overlay,
        )?;
        Ok(TagHandle { index, tag })
    }

    fn create_multi_file(&mut self, kind: IndexKind) -> XbResult<IndexId> {
        let path = sibling_with_extension(&self.path, kind.extension());
        let stem = stem_upper(&self.path);
        let mdx = if kind == IndexKind::Tdx {
            MdxFile::create(&path, &stem, self.mdx_options(false, true), true)?
        } else {
            // An MDX the header does not flag belongs to no one.
            let mdx = MdxFile::create(&path, &stem, self.mdx_options(true, false), true)?;
            self.header.production_mdx = true;
            let taken = self.acquire_header()?;
            let written = self.write_header();
            self.release_header(taken)?;
            written?;
            mdx
        };
        debug!(path = %path.display(), "index file created for new tag");
        Ok(self.indices.add(Index::Mdx(mdx)))
    }

    /// Opens an existing NDX or MDX file and adds its tags to the table.
    /// An NDX is also listed in the table's INF file.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if missing, `AlreadyDefined` if the file is
    /// already open, `InvalidOption` for a TDX and `InvalidKeyExpression`
    /// if a tag refers to an unknown field.
    pub fn open_index(&mut self, kind: IndexKind, path: &Path) -> XbResult<IndexId> {
        self.ensure_open()?;
        if self.index_for_path(path).is_some() {
            return Err(XbError::AlreadyDefined(path.display().to_string()));
        }
        let index = match kind {
            IndexKind::Ndx => {
                let ndx = NdxFile::open(
                    path,
                    &self.fields,
                    self.provider.as_ref(),
                    self.config.node_cache_capacity,
                )?;
                inf::register(&self.path, path)?;
                Index::Ndx(ndx)
            }
            IndexKind::Mdx => Index::Mdx(MdxFile::open(
                path,
                &self.fields,
                self.provider.as_ref(),
                self.config.node_policy,
                self.config.node_cache_capacity,
            )?),
            IndexKind::Tdx => {
                return Err(XbError::InvalidOption("a TDX file cannot be reopened".into()));
            }
        };
        let id = self.indices.add(index);
        if self.current_tag.is_none() {
            self.current_tag = self.indices.handles().into_iter().find(|h| h.index == id);
        }
        debug!(path = %path.display(), kind = %kind, "index opened");
        Ok(id)
    }

    /// Closes one index file. A TDX file is deleted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id and an I/O error if the file
    /// cannot be flushed.
    pub fn close_index(&mut self, id: IndexId) -> XbResult<()> {
        let mut index = self.indices.remove(id)?;
        if self.current_tag.is_some_and(|h| h.index == id) {
            self.current_tag = self.indices.handles().first().copied();
        }
        index.format_mut().close()
    }

    /// Deletes a tag. An NDX file is closed, removed from disk and from
    /// the INF file; an MDX tag gives its blocks back to the file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a stale handle.
    pub fn delete_tag(&mut self, handle: TagHandle) -> XbResult<()> {
        self.ensure_open()?;
        let name = self.indices.tag(handle)?.name().to_string();
        if self.indices.get(handle.index)?.kind() == IndexKind::Ndx {
            let path = self.indices.get(handle.index)?.format().path().to_path_buf();
            self.close_index(handle.index)?;
            remove_file_if_exists(&path)?;
            inf::unregister(&self.path, &path)?;
        } else {
            self.indices
                .get_mut(handle.index)?
                .format_mut()
                .delete_tag(handle.tag)?;
            if self.current_tag == Some(handle) {
                self.current_tag = self.indices.handles().first().copied();
            }
        }
        debug!(tag = %name, "tag deleted");
        Ok(())
    }

    /// Number of keys in a tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a stale handle.
    pub fn key_count(&mut self, handle: TagHandle) -> XbResult<u64> {
        self.ensure_open()?;
        self.indices
            .get_mut(handle.index)?
            .format_mut()
            .refresh(handle.tag)?;
        let mut store = self.tag_store(handle)?;
        btree::key_count(&mut *store)
    }

    /// Searches the current tag for `value`. On an exact match the table
    /// moves to the record the first such key points at.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` without a current tag and `InvalidData` if
    /// `value` does not match the tag's key type.
    pub fn find_key(&mut self, value: &KeyValue) -> XbResult<Lookup> {
        self.ensure_open()?;
        self.settle_pending()?;
        let handle = self.current_handle()?;
        let key = self.indices.tag(handle)?.encode(value)?;
        self.indices
            .get_mut(handle.index)?
            .format_mut()
            .refresh(handle.tag)?;
        let found = {
            let mut store = self.tag_store(handle)?;
            btree::seek(&mut *store, &key)?
        };
        match found {
            Some((cursor, true)) => {
                let recno = cursor.recno;
                self.get_record(recno)?;
                self.set_cursor(handle, Some(cursor))?;
                Ok(Lookup::Found(recno))
            }
            _ => Ok(Lookup::NotFound),
        }
    }

    /// [`Table::find_key`] with the key given as text: characters as is,
    /// numbers in decimal, dates as `CCYYMMDD`.
    ///
    /// # Errors
    ///
    /// Also returns `InvalidData` or `InvalidDate` for text that does not
    /// parse as the tag's key type.
    pub fn find_key_str(&mut self, text: &str) -> XbResult<Lookup> {
        let handle = self.current_handle()?;
        let value = match self.indices.tag(handle)?.key_type() {
            KeyType::Char => KeyValue::Char(text.to_string()),
            KeyType::Numeric => KeyValue::Numeric(
                text.trim()
                    .parse()
                    .map_err(|_| XbError::invalid_data("key", format!("{text:?} is not a number")))?,
            ),
            KeyType::Date => KeyValue::date(Date::parse(text.trim())?),
        };
        self.find_key(&value)
    }

    fn set_cursor(&mut self, handle: TagHandle, cursor: Option<Cursor>) -> XbResult<()> {
        self.indices
            .get_mut(handle.index)?
            .format_mut()
            .tag_mut(handle.tag)?
            .cursor = cursor;
        Ok(())
    }

    fn key_walk(&mut self, step: KeyStep) -> XbResult<Nav> {
        self.ensure_open()?;
        self.settle_pending()?;
        let handle = self.current_handle()?;
        self.indices
            .get_mut(handle.index)?
            .format_mut()
            .refresh(handle.tag)?;
        let cursor = self.indices.tag(handle)?.cursor.clone();
        let moved = {
            let mut store = self.tag_store(handle)?;
            match (step, cursor) {
                (KeyStep::First, _) | (KeyStep::Next, None) => btree::first(&mut *store)?,
                (KeyStep::Last, _) | (KeyStep::Prev, None) => btree::last(&mut *store)?,
                (KeyStep::Next, Some(c)) => btree::next(&mut *store, &c)?,
                (KeyStep::Prev, Some(c)) => btree::prev(&mut *store, &c)?,
            }
        };
        let Some(cursor) = moved else {
            let empty = self.key_count(handle)? == 0;
            return Ok(match step {
                _ if empty => Nav::Empty,
                KeyStep::Next => Nav::Eof,
                KeyStep::Prev => Nav::Bof,
                KeyStep::First | KeyStep::Last => Nav::Empty,
            });
        };
        let recno = cursor.recno;
        self.get_record(recno)?;
        self.set_cursor(handle, Some(cursor))?;
        Ok(Nav::Record(recno))
    }

    /// Moves to the record of the first key in the current tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` without a current tag and an error if a node or
    /// record cannot be read.
    pub fn get_first_key(&mut self) -> XbResult<Nav> {
        self.key_walk(KeyStep::First)
    }

    /// Moves to the record of the last key in the current tag.
    ///
    /// # Errors
    ///
    /// See [`Table::get_first_key`].
    pub fn get_last_key(&mut self) -> XbResult<Nav> {
        self.key_walk(KeyStep::Last)
    }

    /// Moves to the record of the next key. Starts at the first key when
    /// the tag has no position yet.
    ///
    /// # Errors
    ///
    /// See [`Table::get_first_key`].
    pub fn get_next_key(&mut self) -> XbResult<Nav> {
        self.key_walk(KeyStep::Next)
    }

    /// Moves to the record of the previous key. Starts at the last key
    /// when the tag has no position yet.
    ///
    /// # Errors
    ///
    /// See [`Table::get_first_key`].
    pub fn get_prev_key(&mut self) -> XbResult<Nav> {
        self.key_walk(KeyStep::Prev)
    }

    /// Empties one index file and inserts the keys of every record.
    pub(crate) fn rebuild_index(&mut self, id: IndexId) -> XbResult<()> {
        let mode = self.config.index_mode;
        self.indices.get_mut(id)?.format_mut().clear()?;
        let handles: Vec<TagHandle> = self
            .indices
            .handles()
            .into_iter()
            .filter(|h| h.index == id)
            .collect();
        for recno in 1..=self.header.record_count {
            let buf = self.read_record_at(recno)?;
            for &handle in &handles {
                let tag = self.indices.tag(handle)?;
                let view = self.view(&buf);
                if !tag.includes(&view, mode)? {
                    continue;
                }
                let key = tag.key_for(&view)?;
                let unique = tag.is_unique().then(|| tag.name().to_string());
                let mut store = self.tag_store(handle)?;
                if let Some(name) = unique {
                    if btree::contains_other(&mut *store, &key, 0)? {
                        match mode {
                            IndexMode::HaltOnDupKey => return Err(XbError::KeyNotUnique { tag: name }),
                            IndexMode::EmulateDbase => continue,
                        }
                    }
                }
                btree::insert(&mut *store, &key, recno)?;
            }
        }
        for &handle in &handles {
            self.set_cursor(handle, None)?;
        }
        self.indices.get_mut(id)?.format_mut().flush()
    }

    /// Rebuilds tags from the table. Every file is emptied and refilled
    /// in record order, so the result does not depend on the history of
    /// the file.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotUnique` in [`IndexMode::HaltOnDupKey`] when a unique
    /// tag meets a duplicate and `LockFailed` if the table is locked
    /// elsewhere.
    pub fn reindex(&mut self, scope: ReindexScope) -> XbResult<()> {
        self.ensure_open()?;
        self.settle_pending()?;
        let ids: Vec<IndexId> = match scope {
            ReindexScope::All => self.indices.iter().map(|(id, _)| id).collect(),
            ReindexScope::Tag(handle) => {
                self.indices.tag(handle)?;
                vec![handle.index]
            }
        };
        let taken = self.acquire_table()?;
        let mut result = self.refresh_header();
        for &id in &ids {
            if result.is_err() {
                break;
            }
            result = self.rebuild_index(id);
        }
        let released = self.release_table(taken);
        result.and(released)?;
        info!(
            path = %self.path.display(),
            indices = ids.len(),
            records = self.header.record_count,
            "reindex complete"
        );
        Ok(())
    }

    /// Compares a tag with the keys the records call for and checks the
    /// shape of its tree.
    ///
    /// # Errors
    ///
    /// Returns an error only if a record or node cannot be read; damage is
    /// reported in the [`IntegrityReport`].
    pub fn check_tag_integrity(
        &mut self,
        handle: TagHandle,
        output: IntegrityOutput,
    ) -> XbResult<IntegrityReport> {
        self.ensure_open()?;
        self.settle_pending()?;
        let taken = self.acquire_table()?;
        let report = self.check_locked(handle, output);
        let released = self.release_table(taken);
        let report = report?;
        released?;
        Ok(report)
    }

    fn check_locked(&mut self, handle: TagHandle, output: IntegrityOutput) -> XbResult<IntegrityReport> {
        self.refresh_header()?;
        self.indices
            .get_mut(handle.index)?
            .format_mut()
            .refresh(handle.tag)?;
        let mode = self.config.index_mode;
        let mut expected = Vec::new();
        for recno in 1..=self.header.record_count {
            let buf = self.read_record_at(recno)?;
            let tag = self.indices.tag(handle)?;
            let view = self.view(&buf);
            if tag.includes(&view, mode)? {
                expected.push((tag.key_for(&view)?, recno));
            }
        }
        let tag = self.indices.tag(handle)?;
        let (name, unique) = (tag.name().to_string(), tag.is_unique());
        let mut store = self.tag_store(handle)?;
        check_tag(&mut *store, &name, unique, &expected, output)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, IndexMode};
    use crate::dbf::{Nav, Scope, Table, TableVersion};
    use crate::error::XbError;
    use crate::index::{IndexKind, IntegrityOutput, Lookup, ReindexScope, TagDef};
    use crate::schema::FieldSpec;
    use tempfile::{tempdir, TempDir};

    fn table(mode: IndexMode) -> (TempDir, Table) {
        let dir = tempdir().unwrap();
        let specs = [
            FieldSpec::char("NAME", 8),
            FieldSpec::numeric("AMOUNT", 9, 2),
            FieldSpec::date("DUE"),
        ];
        let config = Config::default().single_user(true).index_mode(mode);
        let mut t = Table::create(&dir.path().join("PAY.DBF"), &specs, TableVersion::V4, false, config).unwrap();
        for (name, amount, due) in [
            ("CAROL", 30.0, "20240301"),
            ("ALICE", 10.0, "20240101"),
            ("BOB", 20.0, "20240201"),
        ] {
            t.blank_record().unwrap();
            t.put_char("NAME", name).unwrap();
            t.put_double("AMOUNT", amount).unwrap();
            t.put_date_str("DUE", due).unwrap();
            t.append_record().unwrap();
        }
        (dir, t)
    }

    fn walk(t: &mut Table) -> Vec<u32> {
        let mut out = Vec::new();
        let mut nav = t.get_first_key().unwrap();
        while let Nav::Record(n) = nav {
            out.push(n);
            nav = t.get_next_key().unwrap();
        }
        assert_eq!(nav, Nav::Eof);
        out
    }

    #[test]
    fn new_tags_cover_existing_records() {
        for kind in [IndexKind::Ndx, IndexKind::Mdx, IndexKind::Tdx] {
            let (_dir, mut t) = table(IndexMode::EmulateDbase);
            let tag = t.create_tag(kind, &TagDef::new("BYNAME", "NAME"), false).unwrap();
            assert_eq!(t.current_tag(), Some(tag));
            assert_eq!(walk(&mut t), vec![2, 3, 1], "{kind}");
            let report = t.check_tag_integrity(tag, IntegrityOutput::Silent).unwrap();
            assert!(report.is_ok(), "{kind}: {:?}", report.problems);
        }
    }

    #[test]
    fn numeric_and_date_keys() {
        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        let amount = t.create_tag(IndexKind::Mdx, &TagDef::new("AMT", "AMOUNT"), false).unwrap();
        let due = t.create_tag(IndexKind::Mdx, &TagDef::new("DUE", "DUE").descending(true), false).unwrap();

        t.set_current_tag(amount).unwrap();
        assert_eq!(t.get_first_key().unwrap(), Nav::Record(2));
        assert_eq!(t.get_double("AMOUNT").unwrap(), 10.0);
        assert_eq!(t.get_last_key().unwrap(), Nav::Record(1));
        assert_eq!(t.find_key_str("20.00").unwrap(), Lookup::Found(3));
        assert_eq!(t.find_key_str("25").unwrap(), Lookup::NotFound);

        t.set_current_tag(due).unwrap();
        assert_eq!(walk(&mut t), vec![1, 3, 2]);
        assert_eq!(t.find_key_str("20240101").unwrap(), Lookup::Found(2));
    }

    #[test]
    fn prev_walks_backwards_to_bof() {
        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        t.create_tag(IndexKind::Ndx, &TagDef::new("BYNAME", "NAME"), false).unwrap();
        assert_eq!(t.get_last_key().unwrap(), Nav::Record(1));
        assert_eq!(t.get_prev_key().unwrap(), Nav::Record(3));
        assert_eq!(t.get_prev_key().unwrap(), Nav::Record(2));
        assert_eq!(t.get_prev_key().unwrap(), Nav::Bof);
    }

    #[test]
    fn key_navigation_needs_a_tag() {
        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        assert!(matches!(t.get_first_key(), Err(XbError::InvalidTag(_))));
        assert!(matches!(t.find_key_str("ALICE"), Err(XbError::InvalidTag(_))));
    }

    #[test]
    fn empty_tag_reports_empty() {
        let dir = tempdir().unwrap();
        let mut t = Table::create(
            &dir.path().join("E.DBF"),
            &[FieldSpec::char("C", 2)],
            TableVersion::V4,
            false,
            Config::default().single_user(true),
        )
        .unwrap();
        t.create_tag(IndexKind::Mdx, &TagDef::new("C", "C"), false).unwrap();
        assert_eq!(t.get_first_key().unwrap(), Nav::Empty);
        assert_eq!(t.get_next_key().unwrap(), Nav::Empty);
    }

    #[test]
    fn ndx_tags_are_listed_in_the_inf_and_reopened() {
        let (dir, mut t) = table(IndexMode::EmulateDbase);
        t.create_tag(IndexKind::Ndx, &TagDef::new("BYNAME", "NAME"), false).unwrap();
        t.close().unwrap();
        let inf = std::fs::read_to_string(dir.path().join("PAY.INF")).unwrap();
        assert!(inf.contains("NDX=BYNAME.NDX"), "{inf}");

        let mut t = Table::open(&dir.path().join("PAY.DBF"), Config::default().single_user(true)).unwrap();
        assert_eq!(t.index_count(), 1);
        let tag = t.tag_by_name("byname").unwrap();
        t.delete_tag(tag).unwrap();
        assert!(!dir.path().join("BYNAME.NDX").exists());
        assert!(t.current_tag().is_none());
    }

    #[test]
    fn tdx_file_is_removed_on_close() {
        let (dir, mut t) = table(IndexMode::EmulateDbase);
        t.create_tag(IndexKind::Tdx, &TagDef::new("TMP", "NAME"), false).unwrap();
        assert!(dir.path().join("PAY.TDX").exists());
        t.close().unwrap();
        assert!(!dir.path().join("PAY.TDX").exists());
    }

    #[test]
    fn unique_tag_over_duplicates() {
        let (_dir, mut t) = table(IndexMode::HaltOnDupKey);
        t.blank_record().unwrap();
        t.put_char("NAME", "ALICE").unwrap();
        t.append_record().unwrap();
        let err = t
            .create_tag(IndexKind::Mdx, &TagDef::new("U", "NAME").unique(true), false)
            .unwrap_err();
        assert!(err.is_key_not_unique());
        assert!(t.tag_by_name("U").is_err());

        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        t.blank_record().unwrap();
        t.put_char("NAME", "ALICE").unwrap();
        t.append_record().unwrap();
        let tag = t
            .create_tag(IndexKind::Mdx, &TagDef::new("U", "NAME").unique(true), false)
            .unwrap();
        assert_eq!(t.key_count(tag).unwrap(), 3);
        assert_eq!(t.find_key_str("ALICE").unwrap(), Lookup::Found(2));
        assert!(t.check_tag_integrity(tag, IntegrityOutput::Silent).unwrap().is_ok());
    }

    #[test]
    fn filtered_tag_skips_records() {
        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        let tag = t
            .create_tag(IndexKind::Mdx, &TagDef::new("BIG", "NAME").filter("AMOUNT > 15"), false)
            .unwrap();
        assert_eq!(t.key_count(tag).unwrap(), 2);
        assert_eq!(walk(&mut t), vec![3, 1]);
    }

    #[test]
    fn reindex_repairs_a_cleared_tag() {
        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        let tag = t.create_tag(IndexKind::Mdx, &TagDef::new("BYNAME", "NAME"), false).unwrap();
        {
            let mut store = t.tag_store(tag).unwrap();
            let cursor = crate::index::btree::first(&mut *store).unwrap().unwrap();
            crate::index::btree::delete(&mut *store, &cursor.key, cursor.recno).unwrap();
        }
        assert!(!t.check_tag_integrity(tag, IntegrityOutput::Silent).unwrap().is_ok());
        t.reindex(ReindexScope::All).unwrap();
        assert!(t.check_tag_integrity(tag, IntegrityOutput::Silent).unwrap().is_ok());
        assert_eq!(walk(&mut t), vec![2, 3, 1]);
    }

    #[test]
    fn deleted_records_stay_in_tags() {
        let (_dir, mut t) = table(IndexMode::EmulateDbase);
        let tag = t.create_tag(IndexKind::Mdx, &TagDef::new("BYNAME", "NAME"), false).unwrap();
        t.get_record(2).unwrap();
        t.delete_record().unwrap();
        t.commit().unwrap();
        assert_eq!(t.key_count(tag).unwrap(), 3);
        assert_eq!(t.get_first_record(Scope::ActiveOnly).unwrap(), Nav::Record(1));
    }
}
