//! Index node blocks.
//!
//! A node is one block holding a key count, `key count` items and one
//! trailing child pointer:
//!
//! ```text
//! NDX  [count u32] ([child u32][recno u32][key]) x count [child u32]
//! MDX  [count u32][free link u32] ([ptr u32][key]) x count [child u32]
//! ```
//!
//! The trailing child is zero in leaves, which is how leaves are told apart
//! from interior nodes. Block addresses count 512-byte pages from the start
//! of the file in both formats.

use crate::error::{XbError, XbResult};
use std::collections::HashMap;
use xbase_storage::endian::{get_u32, put_u32};

/// Address unit of node blocks.
pub const PAGE_SIZE: usize = 512;

/// Block size of NDX files.
pub const NDX_BLOCK_SIZE: usize = 512;

/// Which item layout a node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFormat {
    /// Items carry child and record number separately.
    Ndx,
    /// Items carry one pointer; nodes have a free-chain link.
    Mdx,
}

/// Geometry of the nodes of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    /// Item layout.
    pub format: NodeFormat,
    /// Bytes per node block.
    pub block_size: usize,
    /// Stored key length.
    pub key_len: usize,
    /// Bytes per item, a multiple of 4.
    pub item_len: usize,
    /// Maximum keys per node.
    pub keys_per_block: usize,
}

fn round_up4(n: usize) -> usize {
    n.div_ceil(4) * 4
}

impl NodeLayout {
    /// NDX geometry for `key_len`.
    #[must_use]
    pub fn ndx(key_len: usize) -> Self {
        let item_len = round_up4(key_len + 8);
        Self {
            format: NodeFormat::Ndx,
            block_size: NDX_BLOCK_SIZE,
            key_len,
            item_len,
            keys_per_block: (NDX_BLOCK_SIZE - 8) / item_len,
        }
    }

    /// MDX geometry for `key_len` and `block_size`.
    #[must_use]
    pub fn mdx(key_len: usize, block_size: usize) -> Self {
        let item_len = round_up4(key_len + 4);
        Self {
            format: NodeFormat::Mdx,
            block_size,
            key_len,
            item_len,
            keys_per_block: (block_size - 12) / item_len,
        }
    }

    fn header_len(&self) -> usize {
        match self.format {
            NodeFormat::Ndx => 4,
            NodeFormat::Mdx => 8,
        }
    }

    fn key_offset(&self) -> usize {
        match self.format {
            NodeFormat::Ndx => 8,
            NodeFormat::Mdx => 4,
        }
    }

    fn item_offset(&self, i: usize) -> usize {
        self.header_len() + i * self.item_len
    }

    /// Decodes the block read from `addr`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` if the key count does not fit the block.
    pub fn decode(&self, addr: u32, buf: &[u8]) -> XbResult<NodeImage> {
        if buf.len() < self.block_size {
            return Err(XbError::invalid_index(format!("short node block {addr}")));
        }
        let count = get_u32(buf, 0) as usize;
        if count > self.keys_per_block {
            return Err(XbError::invalid_index(format!(
                "node {addr} holds {count} keys, at most {} fit",
                self.keys_per_block
            )));
        }
        let trailing = get_u32(buf, self.item_offset(count));
        let link = match self.format {
            NodeFormat::Ndx => 0,
            NodeFormat::Mdx => get_u32(buf, 4),
        };
        let key_off = self.key_offset();
        let entries = (0..count)
            .map(|i| {
                let at = self.item_offset(i);
                let ptr = match self.format {
                    NodeFormat::Ndx if trailing == 0 => get_u32(buf, at + 4),
                    _ => get_u32(buf, at),
                };
                Entry {
                    ptr,
                    key: buf[at + key_off..at + key_off + self.key_len].to_vec(),
                }
            })
            .collect();
        Ok(NodeImage {
            addr,
            entries,
            trailing,
            link,
        })
    }

    /// Encodes `node` into a full zero-padded block.
    #[must_use]
    pub fn encode(&self, node: &NodeImage) -> Vec<u8> {
        let mut buf = vec![0u8; self.block_size];
        put_u32(&mut buf, 0, node.entries.len() as u32);
        if self.format == NodeFormat::Mdx {
            put_u32(&mut buf, 4, node.link);
        }
        let key_off = self.key_offset();
        for (i, entry) in node.entries.iter().enumerate() {
            let at = self.item_offset(i);
            match self.format {
                NodeFormat::Ndx if node.is_leaf() => put_u32(&mut buf, at + 4, entry.ptr),
                _ => put_u32(&mut buf, at, entry.ptr),
            }
            let n = entry.key.len().min(self.key_len);
            buf[at + key_off..at + key_off + n].copy_from_slice(&entry.key[..n]);
        }
        put_u32(&mut buf, self.item_offset(node.entries.len()), node.trailing);
        buf
    }
}

/// One key and its pointer: a record number in leaves, a child block in
/// interior nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Record number or child block.
    pub ptr: u32,
    /// Stored key bytes.
    pub key: Vec<u8>,
}

/// A decoded node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeImage {
    /// Block address.
    pub addr: u32,
    /// Keys in tag order.
    pub entries: Vec<Entry>,
    /// Rightmost child; zero in leaves.
    pub trailing: u32,
    /// Free-chain link (MDX only).
    pub link: u32,
}

impl NodeImage {
    /// An empty leaf at `addr`.
    #[must_use]
    pub fn empty_leaf(addr: u32) -> Self {
        Self {
            addr,
            entries: Vec::new(),
            trailing: 0,
            link: 0,
        }
    }

    /// Whether this node holds record numbers.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.trailing == 0
    }

    /// Child pointer at position `pos`, `pos == len` being the trailing one.
    #[must_use]
    pub fn child(&self, pos: usize) -> u32 {
        self.entries.get(pos).map_or(self.trailing, |e| e.ptr)
    }

    /// Replaces the child pointer at `pos`.
    pub fn set_child(&mut self, pos: usize, child: u32) {
        match self.entries.get_mut(pos) {
            Some(e) => e.ptr = child,
            None => self.trailing = child,
        }
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the node has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoded nodes of one tag, keyed by block address.
///
/// Writes go through to the file, so the cache only has to be dropped when
/// another handle changed the tag.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<u32, NodeImage>,
    capacity: usize,
}

impl NodeCache {
    /// A cache holding up to `capacity` nodes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Cached node at `addr`.
    #[must_use]
    pub fn get(&self, addr: u32) -> Option<&NodeImage> {
        self.nodes.get(&addr)
    }

    /// Caches `node`, flushing everything first when full.
    pub fn insert(&mut self, node: NodeImage) {
        if self.nodes.len() >= self.capacity && !self.nodes.contains_key(&node.addr) {
            self.nodes.clear();
        }
        self.nodes.insert(node.addr, node);
    }

    /// Forgets the node at `addr`.
    pub fn remove(&mut self, addr: u32) {
        self.nodes.remove(&addr);
    }

    /// Drops every cached node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Number of cached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
