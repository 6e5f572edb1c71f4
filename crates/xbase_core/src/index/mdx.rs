//! MDX multi-tag index files and their temporary TDX variant.
//!
//! ```text
//! pages 0..3   file header, tag table at byte 544 (32 bytes per tag)
//! page 4..     tag header blocks and node blocks, block_factor pages each
//! ```
//!
//! Blocks are addressed in 512-byte pages. New blocks come from the free
//! chain (nodes emptied by deletes, linked through bytes 4..8) when
//! [`NodePolicy::ReuseEmptyNodes`] is set, otherwise from the end of the
//! file.

use super::bcd::BCD_KEY_LEN;
use super::btree::{self, NodeStore};
use super::node::{NodeImage, NodeLayout, PAGE_SIZE};
use super::tag::{new_header, Tag, TagDef, TagHeader};
use super::{IndexFormat, IndexKind, TagId};
use crate::config::NodePolicy;
use crate::date::Date;
use crate::error::{from_storage, XbError, XbResult};
use crate::expr::{ExpressionProvider, KeyType};
use crate::schema::FieldDesc;
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;
use xbase_storage::endian::{get_u16, get_u32, put_u16, put_u32};
use xbase_storage::fsops::remove_file_if_exists;
use xbase_storage::{FileBackend, StorageBackend};

/// Most tags one MDX file can hold.
pub const MAX_MDX_TAGS: usize = 47;

const HEADER_PAGES: u32 = 4;
const TAG_TABLE_OFFSET: usize = 544;
const TAG_ENTRY_LEN: usize = 32;
const TAG_SLOTS: u8 = 48;

const FORMAT_BASE: u8 = 0x10;
const FORMAT_DESCENDING: u8 = 0x08;
const FORMAT_UNIQUE: u8 = 0x40;

const KEY_EXPR_OFFSET: usize = 25;
const KEY_EXPR_END: usize = 126;
const FILTER_FLAG: usize = 246;
const HAS_KEYS_FLAG: usize = 247;
const FILTER_OFFSET: usize = 502;
const FILTER_END: usize = 723;

/// File-level settings of a new MDX or TDX file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MdxOptions {
    pub block_size: usize,
    pub policy: NodePolicy,
    pub production: bool,
    pub temporary: bool,
    pub cache_capacity: usize,
}

/// An open MDX or TDX file.
#[derive(Debug)]
pub struct MdxFile {
    backend: FileBackend,
    stem: String,
    create_date: [u8; 3],
    block_size: usize,
    production: bool,
    temporary: bool,
    policy: NodePolicy,
    page_count: u32,
    free_page: u32,
    tags: Vec<Tag>,
    tag_blocks: Vec<u32>,
    next_tag_id: u32,
    cache_capacity: usize,
}

fn yymmdd(date: Date) -> [u8; 3] {
    [
        (date.year() - 1900).clamp(0, 255) as u8,
        date.month() as u8,
        date.day() as u8,
    ]
}

fn cstr(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

fn put_cstr(buf: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(buf.len().saturating_sub(1));
    buf[..n].copy_from_slice(&bytes[..n]);
}

impl MdxFile {
    /// Creates an empty multi-tag file for the table stem `stem`.
    ///
    /// # Errors
    ///
    /// Returns `FileExists` unless `overlay`, `InvalidBlockSize` for a bad
    /// block size.
    pub(crate) fn create(path: &Path, stem: &str, options: MdxOptions, overlay: bool) -> XbResult<Self> {
        let size = options.block_size;
        if size % PAGE_SIZE != 0
            || !(crate::config::MIN_MDX_BLOCK_SIZE..=crate::config::MAX_MDX_BLOCK_SIZE).contains(&size)
        {
            return Err(XbError::InvalidBlockSize(size));
        }
        let backend = FileBackend::create(path, overlay).map_err(from_storage)?;
        let mut mdx = Self {
            backend,
            stem: stem.to_ascii_uppercase(),
            create_date: yymmdd(Date::today()),
            block_size: size,
            production: options.production,
            temporary: options.temporary,
            policy: options.policy,
            page_count: HEADER_PAGES,
            free_page: 0,
            tags: Vec::new(),
            tag_blocks: Vec::new(),
            next_tag_id: 0,
            cache_capacity: options.cache_capacity,
        };
        mdx.backend
            .write_at(0, &vec![0u8; HEADER_PAGES as usize * PAGE_SIZE])?;
        mdx.write_file_header()?;
        debug!(path = %path.display(), block_size = size, temporary = mdx.temporary, "MDX created");
        Ok(mdx)
    }

    /// Opens an existing MDX file and compiles its tags.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if missing and `InvalidIndex` for a damaged
    /// header.
    pub(crate) fn open(
        path: &Path,
        fields: &[FieldDesc],
        provider: &dyn ExpressionProvider,
        policy: NodePolicy,
        cache_capacity: usize,
    ) -> XbResult<Self> {
        let backend = FileBackend::open(path).map_err(from_storage)?;
        let head = backend.read_at(0, HEADER_PAGES as usize * PAGE_SIZE)?;
        if head[0] != 0x02 {
            return Err(XbError::invalid_index(format!("{}: not an MDX file", path.display())));
        }
        let block_size = usize::from(get_u16(&head, 22));
        if block_size == 0 || block_size % PAGE_SIZE != 0 {
            return Err(XbError::InvalidBlockSize(block_size));
        }
        let tag_count = usize::from(get_u16(&head, 28));
        if tag_count > MAX_MDX_TAGS {
            return Err(XbError::invalid_index(format!("{}: {tag_count} tags", path.display())));
        }

        let mut mdx = Self {
            backend,
            stem: cstr(&head[4..20]),
            create_date: [head[1], head[2], head[3]],
            block_size,
            production: head[24] != 0,
            temporary: false,
            policy,
            page_count: get_u32(&head, 32),
            free_page: get_u32(&head, 36),
            tags: Vec::with_capacity(tag_count),
            tag_blocks: Vec::with_capacity(tag_count),
            next_tag_id: 0,
            cache_capacity,
        };

        for i in 0..tag_count {
            let at = TAG_TABLE_OFFSET + i * TAG_ENTRY_LEN;
            let entry = &head[at..at + TAG_ENTRY_LEN];
            let header_page = get_u32(entry, 0);
            let name = cstr(&entry[4..15]);
            let block = mdx.backend.read_at(u64::from(header_page) * PAGE_SIZE as u64, block_size)?;
            let key_type = KeyType::from_char(char::from(block[9]))
                .ok_or_else(|| XbError::invalid_index(format!("tag {name}: bad key type")))?;
            let key_len = usize::from(get_u16(&block, 12));
            let layout = NodeLayout::mdx(key_len, block_size);
            if key_len == 0 || usize::from(get_u16(&block, 18)) != layout.item_len {
                return Err(XbError::invalid_index(format!("tag {name}: bad key length")));
            }
            let filter = (block[FILTER_FLAG] != 0).then(|| cstr(&block[FILTER_OFFSET..FILTER_END]));
            let header = TagHeader {
                name,
                key_expr: cstr(&block[KEY_EXPR_OFFSET..KEY_EXPR_END]),
                filter,
                key_type,
                key_len,
                descending: block[8] & FORMAT_DESCENDING != 0,
                unique: block[24] != 0,
                root: get_u32(&block, 0),
                stamp: get_u32(&block, 20),
                header_page,
            };
            let id = TagId(mdx.next_tag_id);
            mdx.next_tag_id += 1;
            mdx.tags
                .push(Tag::compile(id, header, layout, fields, provider, cache_capacity)?);
            mdx.tag_blocks.push(get_u32(&block, 4));
        }
        Ok(mdx)
    }

    /// Whether this is a table's production index.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Whether this is a TDX file.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Node block size.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Pages in the file.
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Head of the free chain, zero if empty.
    #[must_use]
    pub fn free_page(&self) -> u32 {
        self.free_page
    }

    fn block_factor(&self) -> u32 {
        (self.block_size / PAGE_SIZE) as u32
    }

    fn position(&self, id: TagId) -> XbResult<usize> {
        self.tags
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| XbError::InvalidTag(format!("tag {}", id.0)))
    }

    fn page_offset(page: u32) -> u64 {
        u64::from(page) * PAGE_SIZE as u64
    }

    fn write_file_header(&mut self) -> XbResult<()> {
        let mut buf = vec![0u8; 48];
        buf[0] = 0x02;
        buf[1..4].copy_from_slice(&self.create_date);
        put_cstr(&mut buf[4..20], &self.stem);
        put_u16(&mut buf, 20, self.block_factor() as u16);
        put_u16(&mut buf, 22, self.block_size as u16);
        buf[24] = u8::from(self.production);
        buf[25] = TAG_SLOTS;
        buf[26] = TAG_ENTRY_LEN as u8;
        put_u16(&mut buf, 28, self.tags.len() as u16);
        put_u32(&mut buf, 32, self.page_count);
        put_u32(&mut buf, 36, self.free_page);
        buf[44..47].copy_from_slice(&yymmdd(Date::today()));
        buf[47] = 0x1B;
        self.backend.write_at(0, &buf)?;
        Ok(())
    }

    fn write_counters(&mut self) -> XbResult<()> {
        let mut buf = [0u8; 8];
        put_u32(&mut buf, 0, self.page_count);
        put_u32(&mut buf, 4, self.free_page);
        self.backend.write_at(32, &buf)?;
        Ok(())
    }

    fn write_tag_table(&mut self) -> XbResult<()> {
        let mut table = vec![0u8; MAX_MDX_TAGS * TAG_ENTRY_LEN];
        for (i, tag) in self.tags.iter().enumerate() {
            let entry = &mut table[i * TAG_ENTRY_LEN..(i + 1) * TAG_ENTRY_LEN];
            put_u32(entry, 0, tag.header_page);
            put_cstr(&mut entry[4..15], tag.name());
            entry[15] = key_format(tag);
            entry[19] = 0x02;
            entry[20] = tag.key_type().as_char() as u8;
        }
        self.backend.write_at(TAG_TABLE_OFFSET as u64, &table)?;
        let mut count = [0u8; 2];
        put_u16(&mut count, 0, self.tags.len() as u16);
        self.backend.write_at(28, &count)?;
        Ok(())
    }

    fn write_tag_header(&mut self, pos: usize, has_keys: bool) -> XbResult<()> {
        let tag = &self.tags[pos];
        let mut buf = vec![0u8; self.block_size];
        put_u32(&mut buf, 0, tag.root);
        put_u32(&mut buf, 4, self.tag_blocks[pos]);
        buf[8] = key_format(tag);
        buf[9] = tag.key_type().as_char() as u8;
        put_u16(&mut buf, 12, tag.key_len() as u16);
        put_u16(&mut buf, 14, tag.layout.keys_per_block as u16);
        put_u16(&mut buf, 18, tag.layout.item_len as u16);
        put_u32(&mut buf, 20, tag.stamp);
        buf[24] = u8::from(tag.is_unique());
        put_cstr(&mut buf[KEY_EXPR_OFFSET..KEY_EXPR_END], tag.key_expr());
        if let Some(filter) = tag.filter_expr() {
            buf[FILTER_FLAG] = 1;
            put_cstr(&mut buf[FILTER_OFFSET..FILTER_END], filter);
        }
        buf[HAS_KEYS_FLAG] = u8::from(has_keys);
        self.backend
            .write_at(Self::page_offset(tag.header_page), &buf)?;
        Ok(())
    }

    /// Takes a block from the free chain or the end of the file.
    fn take_block(&mut self) -> XbResult<u32> {
        let page = if self.policy == NodePolicy::ReuseEmptyNodes && self.free_page != 0 {
            let page = self.free_page;
            let link = self.backend.read_at(Self::page_offset(page) + 4, 4)?;
            self.free_page = get_u32(&link, 0);
            page
        } else {
            let page = self.page_count;
            self.page_count += self.block_factor();
            page
        };
        self.write_counters()?;
        Ok(page)
    }

    /// Returns a block to the free chain, or strands it.
    fn give_block(&mut self, page: u32) -> XbResult<()> {
        if self.policy == NodePolicy::ReuseEmptyNodes {
            let mut buf = vec![0u8; self.block_size];
            put_u32(&mut buf, 4, self.free_page);
            self.backend.write_at(Self::page_offset(page), &buf)?;
            self.free_page = page;
            self.write_counters()?;
        }
        Ok(())
    }

    /// Lays out a new tag: header block, then an empty root leaf.
    fn lay_out_tag(&mut self, pos: usize) -> XbResult<()> {
        let header_page = self.take_block()?;
        let root = self.take_block()?;
        let block_size = self.block_size;
        let tag = &mut self.tags[pos];
        tag.header_page = header_page;
        tag.root = root;
        tag.stamp = 0;
        tag.cursor = None;
        tag.invalidate();
        let leaf = tag.layout.encode(&NodeImage::empty_leaf(root));
        debug_assert_eq!(leaf.len(), block_size);
        self.tag_blocks[pos] = 1;
        self.backend.write_at(Self::page_offset(root), &leaf)?;
        self.write_tag_header(pos, false)
    }

    fn tree_blocks(&mut self, id: TagId) -> XbResult<Vec<u32>> {
        let pos = self.position(id)?;
        let mut store = TagStore { mdx: self, pos };
        let mut blocks = Vec::new();
        let mut stack = vec![store.root()];
        while let Some(addr) = stack.pop() {
            let node = store.load(addr)?;
            blocks.push(addr);
            if !node.is_leaf() {
                stack.extend((0..=node.len()).map(|i| node.child(i)));
            }
        }
        Ok(blocks)
    }
}

fn key_format(tag: &Tag) -> u8 {
    let mut format = FORMAT_BASE;
    if tag.is_descending() {
        format |= FORMAT_DESCENDING;
    }
    if tag.is_unique() {
        format |= FORMAT_UNIQUE;
    }
    format
}

/// Node access for one tag of an MDX file.
#[derive(Debug)]
struct TagStore<'a> {
    mdx: &'a mut MdxFile,
    pos: usize,
}

impl TagStore<'_> {
    fn tag(&self) -> &Tag {
        &self.mdx.tags[self.pos]
    }

    fn tag_mut(&mut self) -> &mut Tag {
        &mut self.mdx.tags[self.pos]
    }

    fn check_addr(&self, addr: u32) -> XbResult<()> {
        if addr < HEADER_PAGES || addr >= self.mdx.page_count {
            return Err(XbError::InvalidBlockNo(addr));
        }
        Ok(())
    }
}

impl NodeStore for TagStore<'_> {
    fn layout(&self) -> NodeLayout {
        self.tag().layout
    }

    fn root(&self) -> u32 {
        self.tag().root
    }

    fn stamp(&self) -> u32 {
        self.tag().stamp
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.tag().compare(a, b)
    }

    fn load(&mut self, addr: u32) -> XbResult<NodeImage> {
        if let Some(node) = self.tag().cache.get(addr) {
            return Ok(node.clone());
        }
        self.check_addr(addr)?;
        let size = self.mdx.block_size;
        let buf = self.mdx.backend.read_at(MdxFile::page_offset(addr), size)?;
        let node = self.tag().layout.decode(addr, &buf)?;
        self.tag_mut().cache.insert(node.clone());
        Ok(node)
    }

    fn store(&mut self, node: &NodeImage) -> XbResult<()> {
        self.check_addr(node.addr)?;
        let buf = self.tag().layout.encode(node);
        self.mdx
            .backend
            .write_at(MdxFile::page_offset(node.addr), &buf)?;
        if node.addr == self.tag().root {
            let has_keys = !node.is_empty() || !node.is_leaf();
            let at = MdxFile::page_offset(self.tag().header_page) + HAS_KEYS_FLAG as u64;
            self.mdx.backend.write_at(at, &[u8::from(has_keys)])?;
        }
        self.tag_mut().cache.insert(node.clone());
        Ok(())
    }

    fn allocate(&mut self) -> XbResult<u32> {
        let page = self.mdx.take_block()?;
        self.tag_mut().cache.remove(page);
        self.mdx.tag_blocks[self.pos] += 1;
        let count = self.mdx.tag_blocks[self.pos];
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, count);
        let at = MdxFile::page_offset(self.tag().header_page) + 4;
        self.mdx.backend.write_at(at, &buf)?;
        Ok(page)
    }

    fn release(&mut self, addr: u32) -> XbResult<()> {
        self.tag_mut().cache.remove(addr);
        self.mdx.tag_blocks[self.pos] = self.mdx.tag_blocks[self.pos].saturating_sub(1);
        let count = self.mdx.tag_blocks[self.pos];
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, count);
        let at = MdxFile::page_offset(self.tag().header_page) + 4;
        self.mdx.backend.write_at(at, &buf)?;
        self.mdx.give_block(addr)
    }

    fn set_root(&mut self, addr: u32) -> XbResult<()> {
        self.tag_mut().root = addr;
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, addr);
        let at = MdxFile::page_offset(self.tag().header_page);
        self.mdx.backend.write_at(at, &buf)?;
        Ok(())
    }

    fn bump_stamp(&mut self) -> XbResult<()> {
        let stamp = self.tag().stamp.wrapping_add(1);
        self.tag_mut().stamp = stamp;
        let mut buf = [0u8; 4];
        put_u32(&mut buf, 0, stamp);
        let at = MdxFile::page_offset(self.tag().header_page) + 20;
        self.mdx.backend.write_at(at, &buf)?;
        Ok(())
    }
}

impl IndexFormat for MdxFile {
    fn kind(&self) -> IndexKind {
        if self.temporary {
            IndexKind::Tdx
        } else {
            IndexKind::Mdx
        }
    }

    fn path(&self) -> &Path {
        self.backend.path()
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tag_mut(&mut self, id: TagId) -> XbResult<&mut Tag> {
        let pos = self.position(id)?;
        Ok(&mut self.tags[pos])
    }

    fn create_tag(
        &mut self,
        def: &TagDef,
        fields: &[FieldDesc],
        provider: &dyn ExpressionProvider,
        overlay: bool,
    ) -> XbResult<TagId> {
        def.validate(true)?;
        if let Some(existing) = self
            .tags
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(&def.name))
            .map(Tag::id)
        {
            if !overlay {
                return Err(XbError::AlreadyDefined(def.name.to_ascii_uppercase()));
            }
            self.delete_tag(existing)?;
        }
        if self.tags.len() >= MAX_MDX_TAGS {
            return Err(XbError::InvalidTag(format!(
                "{}: tag table holds {MAX_MDX_TAGS} tags",
                def.name
            )));
        }

        let mut header = new_header(def, fields, provider)?;
        if header.key_type == KeyType::Numeric {
            header.key_len = BCD_KEY_LEN;
        }
        let layout = NodeLayout::mdx(header.key_len, self.block_size);
        let id = TagId(self.next_tag_id);
        let tag = Tag::compile(id, header, layout, fields, provider, self.cache_capacity)?;
        self.next_tag_id += 1;
        self.tags.push(tag);
        self.tag_blocks.push(0);
        let pos = self.tags.len() - 1;
        if let Err(e) = self.lay_out_tag(pos) {
            self.tags.pop();
            self.tag_blocks.pop();
            return Err(e);
        }
        self.write_tag_table()?;
        debug!(tag = %def.name, path = %self.backend.path().display(), "MDX tag created");
        Ok(id)
    }

    fn delete_tag(&mut self, id: TagId) -> XbResult<()> {
        let blocks = self.tree_blocks(id)?;
        let pos = self.position(id)?;
        let header_page = self.tags[pos].header_page;
        for page in blocks.into_iter().chain(std::iter::once(header_page)) {
            self.give_block(page)?;
        }
        let tag = self.tags.remove(pos);
        self.tag_blocks.remove(pos);
        self.write_tag_table()?;
        debug!(tag = tag.name(), "MDX tag deleted");
        Ok(())
    }

    fn refresh(&mut self, id: TagId) -> XbResult<()> {
        let pos = self.position(id)?;
        let counters = self.backend.read_at(32, 8)?;
        self.page_count = get_u32(&counters, 0);
        self.free_page = get_u32(&counters, 4);

        let at = Self::page_offset(self.tags[pos].header_page);
        let head = self.backend.read_at(at, 24)?;
        let root = get_u32(&head, 0);
        let stamp = get_u32(&head, 20);
        self.tag_blocks[pos] = get_u32(&head, 4);
        let tag = &mut self.tags[pos];
        if root != tag.root || stamp != tag.stamp {
            debug!(tag = tag.name(), "MDX tag changed on disk");
            tag.invalidate();
            tag.root = root;
            tag.stamp = stamp;
        }
        Ok(())
    }

    fn node_store(&mut self, id: TagId) -> XbResult<Box<dyn NodeStore + '_>> {
        let pos = self.position(id)?;
        Ok(Box::new(TagStore { mdx: self, pos }))
    }

    fn clear(&mut self) -> XbResult<()> {
        self.backend.truncate(0)?;
        self.page_count = HEADER_PAGES;
        self.free_page = 0;
        self.backend
            .write_at(0, &vec![0u8; HEADER_PAGES as usize * PAGE_SIZE])?;
        self.write_file_header()?;
        for pos in 0..self.tags.len() {
            self.lay_out_tag(pos)?;
        }
        self.write_tag_table()
    }

    fn flush(&mut self) -> XbResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    fn close(&mut self) -> XbResult<()> {
        for tag in &mut self.tags {
            tag.invalidate();
            tag.cursor = None;
        }
        self.flush()?;
        if self.temporary {
            remove_file_if_exists(self.backend.path())?;
            debug!(path = %self.backend.path().display(), "TDX removed");
        }
        Ok(())
    }
}

/// Walks every node of one tag, for tests and integrity checks.
pub(crate) fn with_tag_store<T>(
    mdx: &mut MdxFile,
    id: TagId,
    f: impl FnOnce(&mut dyn NodeStore) -> XbResult<T>,
) -> XbResult<T> {
    let pos = mdx.position(id)?;
    let mut store = TagStore { mdx, pos };
    f(&mut store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{KeyValue, SimpleExpressions};
    use crate::schema::{layout, FieldSpec};
    use tempfile::tempdir;

    fn fields() -> Vec<FieldDesc> {
        layout(&[FieldSpec::char("NAME", 5), FieldSpec::numeric("AMOUNT", 9, 2)]).0
    }

    fn options() -> MdxOptions {
        MdxOptions {
            block_size: 1024,
            policy: NodePolicy::ReuseEmptyNodes,
            production: true,
            temporary: false,
            cache_capacity: 16,
        }
    }

    fn insert_amounts(mdx: &mut MdxFile, id: TagId, amounts: impl IntoIterator<Item = u32>) {
        with_tag_store(mdx, id, |store| {
            for n in amounts {
                let key = crate::index::encode_key("T", &KeyValue::Numeric(f64::from(n)), KeyType::Numeric, BCD_KEY_LEN)?;
                btree::insert(store, &key, n)?;
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn header_and_tag_table_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("T.MDX");
        let f = fields();
        let mut mdx = MdxFile::create(&path, "t", options(), false).unwrap();
        mdx.create_tag(&TagDef::new("AMT", "AMOUNT").unique(true), &f, &SimpleExpressions, false)
            .unwrap();
        mdx.create_tag(&TagDef::new("NAME", "NAME").descending(true).filter("AMOUNT > 1"), &f, &SimpleExpressions, false)
            .unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw[0], 0x02);
        assert_eq!(&raw[4..6], b"T\0");
        assert_eq!(get_u16(&raw, 20), 2);
        assert_eq!(get_u16(&raw, 22), 1024);
        assert_eq!(raw[24], 1);
        assert_eq!(raw[25], 48);
        assert_eq!(raw[26], 32);
        assert_eq!(get_u16(&raw, 28), 2);
        assert_eq!(get_u32(&raw, 32), 12);
        assert_eq!(raw[47], 0x1B);

        let entry = &raw[544..576];
        assert_eq!(get_u32(entry, 0), 4);
        let amount_header = &raw[4 * 512..5 * 512];
        assert_eq!(get_u16(amount_header, 12), 12);
        assert_eq!(get_u16(amount_header, 18), 16);
        assert_eq!(&entry[4..7], b"AMT");
        assert_eq!(entry[15], 0x50);
        assert_eq!(entry[20], b'N');
        let second = &raw[576..608];
        assert_eq!(get_u32(second, 0), 8);
        assert_eq!(second[15], 0x18);

        let tag_header = &raw[8 * 512..8 * 512 + 1024];
        assert_eq!(get_u32(tag_header, 0), 10);
        assert_eq!(&tag_header[25..29], b"NAME");
        assert_eq!(tag_header[246], 1);
        assert_eq!(&tag_header[502..512], b"AMOUNT > 1");
    }

    #[test]
    fn tags_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("T.MDX");
        let f = fields();
        let mut mdx = MdxFile::create(&path, "T", options(), false).unwrap();
        let id = mdx.create_tag(&TagDef::new("AMT", "AMOUNT"), &f, &SimpleExpressions, false).unwrap();
        insert_amounts(&mut mdx, id, (1..=300).rev());
        mdx.close().unwrap();

        let mut mdx = MdxFile::open(&path, &f, &SimpleExpressions, NodePolicy::ReuseEmptyNodes, 16).unwrap();
        assert_eq!(mdx.tags().len(), 1);
        let id = mdx.tags()[0].id();
        let (first, count) = with_tag_store(&mut mdx, id, |s| {
            Ok((btree::first(s)?.map(|c| c.recno), btree::key_count(s)?))
        })
        .unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(count, 300);
    }

    #[test]
    fn freed_blocks_are_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("T.MDX");
        let f = fields();
        let mut mdx = MdxFile::create(&path, "T", options(), false).unwrap();
        let id = mdx.create_tag(&TagDef::new("AMT", "AMOUNT"), &f, &SimpleExpressions, false).unwrap();
        insert_amounts(&mut mdx, id, 1..=400);
        let grown = mdx.page_count();

        with_tag_store(&mut mdx, id, |s| {
            for n in 1..=400u32 {
                let key = crate::index::encode_key("T", &KeyValue::Numeric(f64::from(n)), KeyType::Numeric, BCD_KEY_LEN)?;
                assert!(btree::delete(s, &key, n)?);
            }
            Ok(())
        })
        .unwrap();
        assert_ne!(mdx.free_page(), 0);

        insert_amounts(&mut mdx, id, 1..=400);
        assert_eq!(mdx.page_count(), grown);
    }

    #[test]
    fn duplicate_names_and_full_tables() {
        let dir = tempdir().unwrap();
        let f = fields();
        let mut mdx = MdxFile::create(&dir.path().join("T.MDX"), "T", options(), false).unwrap();
        mdx.create_tag(&TagDef::new("AMT", "AMOUNT"), &f, &SimpleExpressions, false).unwrap();
        assert!(matches!(
            mdx.create_tag(&TagDef::new("amt", "NAME"), &f, &SimpleExpressions, false),
            Err(XbError::AlreadyDefined(_))
        ));
        mdx.create_tag(&TagDef::new("amt", "NAME"), &f, &SimpleExpressions, true).unwrap();
        assert_eq!(mdx.tags().len(), 1);
        assert_eq!(mdx.tags()[0].key_type(), KeyType::Char);

        for i in 1..MAX_MDX_TAGS {
            mdx.create_tag(&TagDef::new(format!("T{i}"), "NAME"), &f, &SimpleExpressions, false).unwrap();
        }
        assert!(matches!(
            mdx.create_tag(&TagDef::new("ONEMORE", "NAME"), &f, &SimpleExpressions, false),
            Err(XbError::InvalidTag(_))
        ));
    }

    #[test]
    fn temporary_files_vanish_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("T.TDX");
        let mut tdx = MdxFile::create(
            &path,
            "T",
            MdxOptions {
                production: false,
                temporary: true,
                ..options()
            },
            false,
        )
        .unwrap();
        assert_eq!(tdx.kind(), IndexKind::Tdx);
        tdx.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn bad_block_sizes_are_rejected() {
        let dir = tempdir().unwrap();
        let result = MdxFile::create(
            &dir.path().join("T.MDX"),
            "T",
            MdxOptions {
                block_size: 1000,
                ..options()
            },
            false,
        );
        assert!(matches!(result, Err(XbError::InvalidBlockSize(1000))));
    }
}
