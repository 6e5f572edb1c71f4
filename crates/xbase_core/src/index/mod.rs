//! B-tree index engine.
//!
//! Three file formats share one set of tree algorithms:
//!
//! | Format | Tags | Block size | Notes |
//! |--------|------|------------|-------|
//! | NDX    | 1    | 512        | listed in the table's INF file |
//! | MDX    | ≤ 47 | 1024..=32768 | production index opened with the table |
//! | TDX    | ≤ 47 | as MDX     | temporary, deleted on close |
//!
//! Each format implements [`IndexFormat`] over its own header layout and
//! hands out a [`NodeStore`] per tag; [`btree`] does the rest. Open indices
//! live in an [`IndexRegistry`] and tags are addressed by [`TagHandle`].

mod bcd;
pub mod btree;
mod integrity;
mod key;
pub(crate) mod mdx;
mod ndx;
mod node;
mod tag;

pub use bcd::{compare_bcd, decode_bcd, encode_bcd, BCD_KEY_LEN};
pub use btree::{Cursor, NodeStore, PathStep};
pub use integrity::{check_tag, IntegrityOutput, IntegrityReport};
pub use key::{compare_keys, decode_key, encode_key, NUMERIC_KEY_LEN};
pub use mdx::{MdxFile, MAX_MDX_TAGS};
pub use ndx::NdxFile;
pub use node::{Entry, NodeCache, NodeFormat, NodeImage, NodeLayout, NDX_BLOCK_SIZE, PAGE_SIZE};
pub use tag::{Tag, TagDef, MAX_FILTER_LEN, MAX_KEY_EXPR_LEN, MAX_TAG_NAME_LEN};

use crate::error::{XbError, XbResult};
use crate::expr::ExpressionProvider;
use crate::schema::FieldDesc;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifies an open index file within a table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexId(pub u32);

/// Identifies a tag within its index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u32);

/// A tag of an open index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagHandle {
    /// The index file.
    pub index: IndexId,
    /// The tag within it.
    pub tag: TagId,
}

/// Index file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Single-tag `.NDX`.
    Ndx,
    /// Multi-tag `.MDX`.
    Mdx,
    /// Temporary multi-tag `.TDX`.
    Tdx,
}

impl IndexKind {
    /// File extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Ndx => "NDX",
            Self::Mdx => "MDX",
            Self::Tdx => "TDX",
        }
    }
}

impl std::str::FromStr for IndexKind {
    type Err = XbError;

    fn from_str(s: &str) -> XbResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NDX" => Ok(Self::Ndx),
            "MDX" => Ok(Self::Mdx),
            "TDX" => Ok(Self::Tdx),
            other => Err(XbError::InvalidOption(format!("index type {other}"))),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Result of a key search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The key is present; the table is positioned on this record.
    Found(u32),
    /// No such key.
    NotFound,
}

/// Which tags a reindex rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexScope {
    /// Every open tag.
    All,
    /// One tag. Multi-tag files are rebuilt as a whole.
    Tag(TagHandle),
}

/// Capabilities every index file format provides.
pub trait IndexFormat: fmt::Debug + Send {
    /// File format.
    fn kind(&self) -> IndexKind;

    /// Path of the index file.
    fn path(&self) -> &Path;

    /// Open tags, in file order.
    fn tags(&self) -> &[Tag];

    /// Mutable access to one tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id.
    fn tag_mut(&mut self, id: TagId) -> XbResult<&mut Tag>;

    /// Adds an empty tag to the file.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDefined` for a duplicate name unless `overlay` is
    /// set, `InvalidTag` when the tag table is full or the format holds a
    /// single tag.
    fn create_tag(
        &mut self,
        def: &TagDef,
        fields: &[FieldDesc],
        provider: &dyn ExpressionProvider,
        overlay: bool,
    ) -> XbResult<TagId>;

    /// Removes a tag and frees its blocks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id or a single-tag format.
    fn delete_tag(&mut self, id: TagId) -> XbResult<()>;

    /// Re-reads the tag's header and drops cached nodes if another handle
    /// changed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    fn refresh(&mut self, id: TagId) -> XbResult<()>;

    /// Node access for one tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id.
    fn node_store(&mut self, id: TagId) -> XbResult<Box<dyn NodeStore + '_>>;

    /// Truncates the file and recreates every tag empty, laying blocks out
    /// the same way each time.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be rewritten.
    fn clear(&mut self) -> XbResult<()>;

    /// Flushes buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> XbResult<()>;

    /// Flushes and releases the file; temporary files are deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or delete fails.
    fn close(&mut self) -> XbResult<()>;
}

/// An open index file.
#[derive(Debug)]
pub enum Index {
    /// Single-tag index.
    Ndx(NdxFile),
    /// Multi-tag index, production or temporary.
    Mdx(MdxFile),
}

impl Index {
    /// The format capabilities.
    #[must_use]
    pub fn format(&self) -> &dyn IndexFormat {
        match self {
            Self::Ndx(f) => f,
            Self::Mdx(f) => f,
        }
    }

    /// Mutable format capabilities.
    pub fn format_mut(&mut self) -> &mut dyn IndexFormat {
        match self {
            Self::Ndx(f) => f,
            Self::Mdx(f) => f,
        }
    }

    /// File format.
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        self.format().kind()
    }

    /// Whether this is the table's production MDX.
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Mdx(m) if m.is_production())
    }
}

/// The open indices of one table handle.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    entries: Vec<(IndexId, Index)>,
    next_id: u32,
}

impl IndexRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an open index.
    pub fn add(&mut self, index: Index) -> IndexId {
        let id = IndexId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, index));
        id
    }

    /// Unregisters an index and returns it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id.
    pub fn remove(&mut self, id: IndexId) -> XbResult<Index> {
        let pos = self
            .entries
            .iter()
            .position(|(i, _)| *i == id)
            .ok_or_else(|| XbError::InvalidTag(format!("index {}", id.0)))?;
        Ok(self.entries.remove(pos).1)
    }

    /// Takes every index out of the registry.
    pub fn drain(&mut self) -> Vec<(IndexId, Index)> {
        std::mem::take(&mut self.entries)
    }

    /// The index with `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id.
    pub fn get(&self, id: IndexId) -> XbResult<&Index> {
        self.entries
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, ix)| ix)
            .ok_or_else(|| XbError::InvalidTag(format!("index {}", id.0)))
    }

    /// Mutable index with `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for an unknown id.
    pub fn get_mut(&mut self, id: IndexId) -> XbResult<&mut Index> {
        self.entries
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, ix)| ix)
            .ok_or_else(|| XbError::InvalidTag(format!("index {}", id.0)))
    }

    /// Open indices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (IndexId, &Index)> {
        self.entries.iter().map(|(id, ix)| (*id, ix))
    }

    /// Mutable open indices in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (IndexId, &mut Index)> {
        self.entries.iter_mut().map(|(id, ix)| (*id, ix))
    }

    /// Number of open indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no index is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every open tag.
    #[must_use]
    pub fn handles(&self) -> Vec<TagHandle> {
        self.entries
            .iter()
            .flat_map(|(index, ix)| {
                ix.format().tags().iter().map(move |t| TagHandle {
                    index: *index,
                    tag: t.id(),
                })
            })
            .collect()
    }

    /// The tag behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTag` for a stale handle.
    pub fn tag(&self, handle: TagHandle) -> XbResult<&Tag> {
        self.get(handle.index)?
            .format()
            .tags()
            .iter()
            .find(|t| t.id() == handle.tag)
            .ok_or_else(|| XbError::InvalidTag(format!("tag {}", handle.tag.0)))
    }

    /// Finds a tag by case-insensitive name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<TagHandle> {
        self.entries.iter().find_map(|(index, ix)| {
            ix.format()
                .tags()
                .iter()
                .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
                .map(|t| TagHandle {
                    index: *index,
                    tag: t.id(),
                })
        })
    }

    /// Paths of every open index.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .map(|(_, ix)| ix.format().path().to_path_buf())
            .collect()
    }

    /// The production MDX, if open.
    #[must_use]
    pub fn production(&self) -> Option<IndexId> {
        self.entries
            .iter()
            .find(|(_, ix)| ix.is_production())
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("ndx".parse::<IndexKind>().unwrap(), IndexKind::Ndx);
        assert_eq!("TDX".parse::<IndexKind>().unwrap(), IndexKind::Tdx);
        assert!(matches!(
            "CDX".parse::<IndexKind>(),
            Err(XbError::InvalidOption(_))
        ));
        assert_eq!(IndexKind::Mdx.to_string(), "MDX");
    }

    #[test]
    fn empty_registry_rejects_unknown_ids() {
        let mut registry = IndexRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(IndexId(3)).is_err());
        assert!(registry.remove(IndexId(3)).is_err());
        assert!(registry.find("ANY").is_none());
        assert!(registry.handles().is_empty());
    }
}
