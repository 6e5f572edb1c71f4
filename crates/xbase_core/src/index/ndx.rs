//! NDX single-tag index files.
//!
//! Block 0 is the header; nodes follow in 512-byte blocks. Blocks are
//! handed out by bumping the total block count. NDX has no free list, so a
//! node emptied by deletes is unlinked from the tree and left where it is
//! until the next reindex.

use super::btree::NodeStore;
use super::node::{NodeImage, NodeLayout, NDX_BLOCK_SIZE};
use super::tag::{new_header, Tag, TagDef, TagHeader};
use super::{IndexFormat, IndexKind, TagId};
use crate::error::{from_storage, XbError, XbResult};
use crate::expr::{ExpressionProvider, KeyType};
use crate::schema::FieldDesc;
use std::cmp::Ordering;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;
use xbase_storage::endian::{get_u16, get_u32, put_u16, put_u32};
use xbase_storage::fsops::stem_upper;
use xbase_storage::{FileBackend, StorageBackend};

/// Serial numbers wrap below this value.
const SERIAL_MODULUS: u8 = 128;
const EXPR_OFFSET: usize = 24;
const EXPR_MAX: usize = 100;

/// What a handle last saw of the file. The serial byte wraps after 128
/// changes, so the block count and modification time are compared too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChangeMark {
    root: u32,
    serial: u8,
    total_blocks: u32,
    modified: Option<SystemTime>,
}

/// An open NDX file.
///
/// The tag stamp handed to the B-tree is a local generation counter. It
/// moves on every change made here and on every change seen on disk, and
/// does not share the 128-value wrap of the serial byte in the header.
#[derive(Debug)]
pub struct NdxFile {
    backend: FileBackend,
    tag: Tag,
    total_blocks: u32,
    serial: u8,
    seen: Option<ChangeMark>,
}

impl NdxFile {
    /// Creates an empty NDX file for `def`.
    ///
    /// # Errors
    ///
    /// Returns `FileExists` unless `overlay`, `InvalidOption` for a
    /// descending or filtered definition, and expression errors from the
    /// provider.
    pub fn create(
        path: &Path,
        def: &TagDef,
        fields: &[FieldDesc],
        provider: &dyn ExpressionProvider,
        overlay: bool,
        cache_capacity: usize,
    ) -> XbResult<Self> {
        def.validate(false)?;
        if def.descending {
            return Err(XbError::InvalidOption("NDX tags are ascending only".into()));
        }
        if def.filter.as_deref().is_some_and(|f| !f.trim().is_empty()) {
            return Err(XbError::InvalidOption("NDX tags cannot carry a filter".into()));
        }
        let mut header = new_header(def, fields, provider)?;
        header.name = stem_upper(path);
        header.root = 1;

        let backend = FileBackend::create(path, overlay).map_err(from_storage)?;
        let layout = NodeLayout::ndx(header.key_len);
        let tag = Tag::compile(TagId(0), header, layout, fields, provider, cache_capacity)?;
        let mut ndx = Self {
            backend,
            tag,
            total_blocks: 2,
            serial: 0,
            seen: None,
        };
        ndx.write_header()?;
        ndx.store(&NodeImage::empty_leaf(1))?;
        debug!(path = %path.display(), key = ndx.tag.key_expr(), "NDX created");
        Ok(ndx)
    }

    /// Opens an existing NDX file.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if missing, `InvalidIndex` for a header that
    /// is not an NDX header.
    pub fn open(
        path: &Path,
        fields: &[FieldDesc],
        provider: &dyn ExpressionProvider,
        cache_capacity: usize,
    ) -> XbResult<Self> {
        let backend = FileBackend::open(path).map_err(from_storage)?;
        let buf = backend.read_at(0, NDX_BLOCK_SIZE)?;

        let key_type = KeyType::from_char(char::from(buf[9]))
            .ok_or_else(|| XbError::invalid_index(format!("{}: bad key type", path.display())))?;
        let key_len = usize::from(get_u16(&buf, 12));
        let layout = NodeLayout::ndx(key_len);
        if key_len == 0 || usize::from(get_u16(&buf, 18)) != layout.item_len {
            return Err(XbError::invalid_index(format!(
                "{}: key length {key_len} does not match item length",
                path.display()
            )));
        }
        let expr_end = buf[EXPR_OFFSET..EXPR_OFFSET + EXPR_MAX + 1]
            .iter()
            .position(|&b| b == 0)
            .map_or(EXPR_OFFSET + EXPR_MAX, |n| EXPR_OFFSET + n);
        let header = TagHeader {
            name: stem_upper(path),
            key_expr: String::from_utf8_lossy(&buf[EXPR_OFFSET..expr_end]).trim().to_string(),
            filter: None,
            key_type,
            key_len,
            descending: false,
            unique: buf[23] != 0,
            root: get_u32(&buf, 0),
            stamp: 0,
            header_page: 0,
        };
        let tag = Tag::compile(TagId(0), header, layout, fields, provider, cache_capacity)?;
        Ok(Self {
            backend,
            tag,
            total_blocks: get_u32(&buf, 4),
            serial: buf[20] % SERIAL_MODULUS,
            seen: None,
        })
    }

    /// The only tag.
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Blocks in use, header included.
    #[must_use]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Serial byte stored in the header.
    #[must_use]
    pub fn serial(&self) -> u8 {
        self.serial
    }

    fn write_header(&mut self) -> XbResult<()> {
        let mut buf = vec![0u8; NDX_BLOCK_SIZE];
        put_u32(&mut buf, 0, self.tag.root);
        put_u32(&mut buf, 4, self.total_blocks);
        buf[9] = self.tag.key_type().as_char() as u8;
        buf[11] = 0x1B;
        put_u16(&mut buf, 12, self.tag.key_len() as u16);
        put_u16(&mut buf, 14, self.tag.layout.keys_per_block as u16);
        put_u16(
            &mut buf,
            16,
            u16::from(self.tag.key_type() != KeyType::Char),
        );
        put_u16(&mut buf, 18, self.tag.layout.item_len as u16);
        buf[20] = self.serial;
        buf[23] = u8::from(self.tag.is_unique());
        let expr = self.tag.key_expr().as_bytes();
        let n = expr.len().min(EXPR_MAX);
        buf[EXPR_OFFSET..EXPR_OFFSET + n].copy_from_slice(&expr[..n]);
        self.backend.write_at(0, &buf)?;
        Ok(())
    }

    fn check_addr(&self, addr: u32) -> XbResult<()> {
        if addr == 0 || addr >= self.total_blocks {
            return Err(XbError::InvalidBlockNo(addr));
        }
        Ok(())
    }
}

impl NodeStore for NdxFile {
    fn layout(&self) -> NodeLayout {
        self.tag.layout
    }

    fn root(&self) -> u32 {
        self.tag.root
    }

    fn stamp(&self) -> u32 {
        self.tag.stamp
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.tag.compare(a, b)
    }

    fn load(&mut self, addr: u32) -> XbResult<NodeImage> {
        if let Some(node) = self.tag.cache.get(addr) {
            return Ok(node.clone());
        }
        self.check_addr(addr)?;
        let buf = self.backend.read_block(addr, NDX_BLOCK_SIZE)?;
        let node = self.tag.layout.decode(addr, &buf)?;
        self.tag.cache.insert(node.clone());
        Ok(node)
    }

    fn store(&mut self, node: &NodeImage) -> XbResult<()> {
        self.check_addr(node.addr)?;
        let buf = self.tag.layout.encode(node);
        self.backend.write_block(node.addr, NDX_BLOCK_SIZE, &buf)?;
        self.tag.cache.insert(node.clone());
        Ok(())
    }

    fn allocate(&mut self) -> XbResult<u32> {
        let addr = self.total_blocks;
        self.total_blocks += 1;
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, self.total_blocks);
        self.backend.write_at(4, &buf)?;
        Ok(addr)
    }

    fn release(&mut self, addr: u32) -> XbResult<()> {
        self.tag.cache.remove(addr);
        debug!(addr, "NDX node stranded");
        Ok(())
    }

    fn set_root(&mut self, addr: u32) -> XbResult<()> {
        self.tag.root = addr;
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, addr);
        self.backend.write_at(0, &buf)?;
        Ok(())
    }

    fn bump_stamp(&mut self) -> XbResult<()> {
        self.serial = (self.serial + 1) % SERIAL_MODULUS;
        self.backend.write_at(20, &[self.serial])?;
        self.tag.stamp = self.tag.stamp.wrapping_add(1);
        Ok(())
    }
}

impl IndexFormat for NdxFile {
    fn kind(&self) -> IndexKind {
        IndexKind::Ndx
    }

    fn path(&self) -> &Path {
        self.backend.path()
    }

    fn tags(&self) -> &[Tag] {
        std::slice::from_ref(&self.tag)
    }

    fn tag_mut(&mut self, id: TagId) -> XbResult<&mut Tag> {
        if id != self.tag.id {
            return Err(XbError::InvalidTag(format!("tag {}", id.0)));
        }
        Ok(&mut self.tag)
    }

    fn create_tag(
        &mut self,
        def: &TagDef,
        _fields: &[FieldDesc],
        _provider: &dyn ExpressionProvider,
        _overlay: bool,
    ) -> XbResult<TagId> {
        Err(XbError::InvalidTag(format!(
            "{}: an NDX file holds a single tag",
            def.name
        )))
    }

    fn delete_tag(&mut self, id: TagId) -> XbResult<()> {
        Err(XbError::InvalidTag(format!(
            "tag {}: delete the NDX file instead",
            id.0
        )))
    }

    fn refresh(&mut self, id: TagId) -> XbResult<()> {
        self.tag_mut(id)?;
        let buf = self.backend.read_at(0, 24)?;
        let mark = ChangeMark {
            root: get_u32(&buf, 0),
            serial: buf[20] % SERIAL_MODULUS,
            total_blocks: get_u32(&buf, 4),
            modified: self.backend.modified().ok(),
        };
        self.total_blocks = mark.total_blocks;
        if mark.modified.is_some() && self.seen == Some(mark) {
            return Ok(());
        }
        if self.seen.is_some() {
            debug!(path = %self.backend.path().display(), "NDX changed on disk");
        }
        self.tag.invalidate();
        self.tag.root = mark.root;
        self.serial = mark.serial;
        self.tag.stamp = self.tag.stamp.wrapping_add(1);
        self.seen = Some(mark);
        Ok(())
    }

    fn node_store(&mut self, id: TagId) -> XbResult<Box<dyn NodeStore + '_>> {
        self.tag_mut(id)?;
        Ok(Box::new(self))
    }

    fn clear(&mut self) -> XbResult<()> {
        self.backend.truncate(0)?;
        self.tag.invalidate();
        self.tag.cursor = None;
        self.tag.root = 1;
        self.tag.stamp = self.tag.stamp.wrapping_add(1);
        self.serial = 0;
        self.seen = None;
        self.total_blocks = 2;
        self.write_header()?;
        self.store(&NodeImage::empty_leaf(1))
    }

    fn flush(&mut self) -> XbResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    fn close(&mut self) -> XbResult<()> {
        self.tag.invalidate();
        self.tag.cursor = None;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::btree;
    use crate::expr::{KeyValue, SimpleExpressions};
    use crate::schema::{layout, FieldSpec};
    use tempfile::tempdir;

    fn fields() -> Vec<FieldDesc> {
        layout(&[FieldSpec::char("NAME", 5), FieldSpec::numeric("AMOUNT", 9, 2)]).0
    }

    #[test]
    fn header_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("AMT.NDX");
        let def = TagDef::new("AMT", "AMOUNT").unique(true);
        NdxFile::create(&path, &def, &fields(), &SimpleExpressions, false, 16).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), 1024);
        assert_eq!(get_u32(&raw, 0), 1);
        assert_eq!(get_u32(&raw, 4), 2);
        assert_eq!(raw[9], b'N');
        assert_eq!(raw[11], 0x1B);
        assert_eq!(get_u16(&raw, 12), 8);
        assert_eq!(get_u16(&raw, 14), 31);
        assert_eq!(get_u16(&raw, 16), 1);
        assert_eq!(get_u16(&raw, 18), 16);
        assert_eq!(raw[23], 1);
        assert_eq!(&raw[24..30], b"AMOUNT");
        assert_eq!(raw[30], 0);
    }

    #[test]
    fn keys_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("NAME.NDX");
        let f = fields();
        let def = TagDef::new("NAME", "NAME");
        let mut ndx = NdxFile::create(&path, &def, &f, &SimpleExpressions, false, 16).unwrap();
        for (i, name) in ["PAT", "ANN", "BOB", "ZED"].iter().enumerate() {
            let key = ndx.tag().encode(&KeyValue::Char((*name).into())).unwrap();
            btree::insert(&mut ndx, &key, i as u32 + 1).unwrap();
        }
        ndx.close().unwrap();

        let mut ndx = NdxFile::open(&path, &f, &SimpleExpressions, 16).unwrap();
        assert_eq!(ndx.tag().name(), "NAME");
        assert_eq!(ndx.tag().key_expr(), "NAME");
        let first = btree::first(&mut ndx).unwrap().unwrap();
        assert_eq!(first.recno, 2);
        let last = btree::last(&mut ndx).unwrap().unwrap();
        assert_eq!(last.recno, 4);
        assert_eq!(btree::key_count(&mut ndx).unwrap(), 4);
    }

    #[test]
    fn serial_wraps_below_128_but_stamp_does_not() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("AMT.NDX");
        let def = TagDef::new("AMT", "AMOUNT");
        let mut ndx = NdxFile::create(&path, &def, &fields(), &SimpleExpressions, false, 16).unwrap();
        let start = ndx.stamp();
        for _ in 0..130 {
            ndx.bump_stamp().unwrap();
        }
        assert_eq!(ndx.serial(), 2);
        assert_eq!(std::fs::read(&path).unwrap()[20], 2);
        assert_eq!(ndx.stamp(), start + 130);
    }

    #[test]
    fn other_handles_see_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("AMT.NDX");
        let f = fields();
        let def = TagDef::new("AMT", "AMOUNT");
        let mut a = NdxFile::create(&path, &def, &f, &SimpleExpressions, false, 16).unwrap();
        let mut b = NdxFile::open(&path, &f, &SimpleExpressions, 16).unwrap();
        assert!(btree::first(&mut b).unwrap().is_none());

        let key = a.tag().encode(&KeyValue::Numeric(5.0)).unwrap();
        btree::insert(&mut a, &key, 1).unwrap();

        b.refresh(TagId(0)).unwrap();
        assert_eq!(btree::first(&mut b).unwrap().unwrap().recno, 1);
    }

    #[test]
    fn a_full_serial_cycle_by_another_handle_is_seen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("AMT.NDX");
        let f = fields();
        let def = TagDef::new("AMT", "AMOUNT");
        let mut a = NdxFile::create(&path, &def, &f, &SimpleExpressions, false, 16).unwrap();
        for i in 1..=20u32 {
            let key = a.tag().encode(&KeyValue::Numeric(f64::from(i))).unwrap();
            btree::insert(&mut a, &key, i).unwrap();
        }

        let mut b = NdxFile::open(&path, &f, &SimpleExpressions, 16).unwrap();
        b.refresh(TagId(0)).unwrap();
        assert_eq!(btree::key_count(&mut b).unwrap(), 20);
        let serial = b.serial();
        // Keep the writes below out of the timestamp tick of the refresh.
        std::thread::sleep(std::time::Duration::from_millis(20));

        // Replace every key in place, then bump until the serial comes
        // back around: one full cycle with the same root and node count.
        for i in 1..=20u32 {
            let key = a.tag().encode(&KeyValue::Numeric(f64::from(i))).unwrap();
            btree::delete(&mut a, &key, i).unwrap();
            let key = a.tag().encode(&KeyValue::Numeric(f64::from(i) + 0.5)).unwrap();
            btree::insert(&mut a, &key, i).unwrap();
        }
        while a.serial() != serial {
            a.bump_stamp().unwrap();
        }
        assert_eq!(a.total_blocks(), b.total_blocks());

        b.refresh(TagId(0)).unwrap();
        let first = btree::first(&mut b).unwrap().unwrap();
        assert_eq!(first.key, a.tag().encode(&KeyValue::Numeric(1.5)).unwrap());
        assert_eq!(btree::key_count(&mut b).unwrap(), 20);
    }

    #[test]
    fn descending_and_filtered_tags_are_rejected() {
        let dir = tempdir().unwrap();
        let f = fields();
        let desc = TagDef::new("X", "NAME").descending(true);
        assert!(NdxFile::create(&dir.path().join("X.NDX"), &desc, &f, &SimpleExpressions, false, 16).is_err());
        let filtered = TagDef::new("Y", "NAME").filter("AMOUNT > 1");
        assert!(NdxFile::create(&dir.path().join("Y.NDX"), &filtered, &f, &SimpleExpressions, false, 16).is_err());
    }
}
