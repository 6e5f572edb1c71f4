//! B-tree algorithms shared by every index format.
//!
//! Every interior key is the exact maximum key of the child to its left;
//! the trailing child holds everything above the last key. All leaves sit
//! at the same depth. Duplicate keys are kept in insertion order because
//! inserts descend past every equal key.
//!
//! Splits keep the left half in the original block and move the right half
//! to a new one, so the parent only gains one separator and never has an
//! existing separator changed. Deletes drop emptied nodes from their parent
//! and patch the nearest ancestor separator when a node's maximum changes.

use super::node::{Entry, NodeImage, NodeLayout};
use crate::error::{XbError, XbResult};
use std::cmp::Ordering;
use tracing::debug;

/// Deepest tree walked before the file is declared damaged.
const MAX_DEPTH: usize = 64;

/// Block-level access to the nodes of one tag.
///
/// Implemented by each index format over its own file layout.
pub trait NodeStore {
    /// Node geometry of the tag.
    fn layout(&self) -> NodeLayout;

    /// Current root block.
    fn root(&self) -> u32;

    /// Current modification stamp.
    fn stamp(&self) -> u32;

    /// Compares two stored keys in tag order.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Reads the node at `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be read or decoded.
    fn load(&mut self, addr: u32) -> XbResult<NodeImage>;

    /// Writes `node` back to its block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be written.
    fn store(&mut self, node: &NodeImage) -> XbResult<()>;

    /// Reserves a fresh block for a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the file header cannot be updated.
    fn allocate(&mut self) -> XbResult<u32>;

    /// Hands back a block whose node was unlinked from the tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the free chain cannot be updated.
    fn release(&mut self, addr: u32) -> XbResult<()>;

    /// Records a new root block.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag header cannot be written.
    fn set_root(&mut self, addr: u32) -> XbResult<()>;

    /// Advances the modification stamp after a change.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag header cannot be written.
    fn bump_stamp(&mut self) -> XbResult<()>;
}

impl<S: NodeStore + ?Sized> NodeStore for &mut S {
    fn layout(&self) -> NodeLayout {
        (**self).layout()
    }

    fn root(&self) -> u32 {
        (**self).root()
    }

    fn stamp(&self) -> u32 {
        (**self).stamp()
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (**self).compare(a, b)
    }

    fn load(&mut self, addr: u32) -> XbResult<NodeImage> {
        (**self).load(addr)
    }

    fn store(&mut self, node: &NodeImage) -> XbResult<()> {
        (**self).store(node)
    }

    fn allocate(&mut self) -> XbResult<u32> {
        (**self).allocate()
    }

    fn release(&mut self, addr: u32) -> XbResult<()> {
        (**self).release(addr)
    }

    fn set_root(&mut self, addr: u32) -> XbResult<()> {
        (**self).set_root(addr)
    }

    fn bump_stamp(&mut self) -> XbResult<()> {
        (**self).bump_stamp()
    }
}

/// One level of a root-to-leaf walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    /// Node block.
    pub addr: u32,
    /// Child position in interior nodes, entry position in the leaf.
    pub pos: usize,
}

/// Position on one key of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Root-to-leaf path to the entry.
    pub path: Vec<PathStep>,
    /// Key at the position.
    pub key: Vec<u8>,
    /// Record number at the position.
    pub recno: u32,
    /// Tag stamp the path was taken under.
    pub stamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Descent {
    /// Stop at the first key not less than the search key.
    First,
    /// Stop at the first key greater than the search key.
    After,
}

fn position<S: NodeStore + ?Sized>(store: &S, node: &NodeImage, key: &[u8], mode: Descent) -> usize {
    node.entries.partition_point(|e| {
        let ord = store.compare(&e.key, key);
        match mode {
            Descent::First => ord == Ordering::Less,
            Descent::After => ord != Ordering::Greater,
        }
    })
}

fn too_deep(depth: usize) -> XbResult<()> {
    if depth > MAX_DEPTH {
        return Err(XbError::invalid_index("node chain loops or is too deep"));
    }
    Ok(())
}

fn descend<S: NodeStore + ?Sized>(store: &mut S, key: &[u8], mode: Descent) -> XbResult<Vec<PathStep>> {
    let mut path = Vec::new();
    let mut addr = store.root();
    loop {
        too_deep(path.len())?;
        let node = store.load(addr)?;
        let pos = position(store, &node, key, mode);
        path.push(PathStep { addr, pos });
        if node.is_leaf() {
            return Ok(path);
        }
        addr = node.child(pos);
    }
}

fn leftmost<S: NodeStore + ?Sized>(store: &mut S, path: &mut Vec<PathStep>, mut addr: u32) -> XbResult<()> {
    loop {
        too_deep(path.len())?;
        let node = store.load(addr)?;
        path.push(PathStep { addr, pos: 0 });
        if node.is_leaf() {
            return Ok(());
        }
        addr = node.child(0);
    }
}

fn rightmost<S: NodeStore + ?Sized>(store: &mut S, path: &mut Vec<PathStep>, mut addr: u32) -> XbResult<()> {
    loop {
        too_deep(path.len())?;
        let node = store.load(addr)?;
        if node.is_leaf() {
            path.push(PathStep {
                addr,
                pos: node.len().saturating_sub(1),
            });
            return Ok(());
        }
        path.push(PathStep {
            addr,
            pos: node.len(),
        });
        addr = node.trailing;
    }
}

fn entry_at<S: NodeStore + ?Sized>(store: &mut S, path: &[PathStep]) -> XbResult<Option<Entry>> {
    let Some(step) = path.last() else {
        return Ok(None);
    };
    let leaf = store.load(step.addr)?;
    Ok(leaf.entries.get(step.pos).cloned())
}

/// Moves `path` to the next entry. Leaves it unchanged at the end.
fn step_forward<S: NodeStore + ?Sized>(store: &mut S, path: &mut Vec<PathStep>) -> XbResult<bool> {
    let Some(last) = path.len().checked_sub(1) else {
        return Ok(false);
    };
    let leaf = store.load(path[last].addr)?;
    if path[last].pos + 1 < leaf.len() {
        path[last].pos += 1;
        return Ok(true);
    }
    let mut level = last;
    while level > 0 {
        level -= 1;
        let node = store.load(path[level].addr)?;
        if path[level].pos < node.len() {
            let pos = path[level].pos + 1;
            let mut next = path[..=level].to_vec();
            next[level].pos = pos;
            leftmost(store, &mut next, node.child(pos))?;
            *path = next;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Moves `path` to the previous entry. Leaves it unchanged at the start.
fn step_back<S: NodeStore + ?Sized>(store: &mut S, path: &mut Vec<PathStep>) -> XbResult<bool> {
    let Some(last) = path.len().checked_sub(1) else {
        return Ok(false);
    };
    if path[last].pos > 0 {
        path[last].pos -= 1;
        return Ok(true);
    }
    let mut level = last;
    while level > 0 {
        level -= 1;
        if path[level].pos > 0 {
            let node = store.load(path[level].addr)?;
            let pos = path[level].pos - 1;
            let mut prev = path[..=level].to_vec();
            prev[level].pos = pos;
            rightmost(store, &mut prev, node.child(pos))?;
            *path = prev;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Moves a leaf position that fell off the end of its node onto the next
/// entry. Returns false if there is none.
fn settle<S: NodeStore + ?Sized>(store: &mut S, path: &mut Vec<PathStep>) -> XbResult<bool> {
    let Some(step) = path.last().copied() else {
        return Ok(false);
    };
    let leaf = store.load(step.addr)?;
    if step.pos < leaf.len() {
        return Ok(true);
    }
    if leaf.is_empty() {
        return Ok(false);
    }
    if let Some(last) = path.last_mut() {
        last.pos = leaf.len() - 1;
    }
    step_forward(store, path)
}

fn cursor_at<S: NodeStore + ?Sized>(store: &mut S, path: Vec<PathStep>) -> XbResult<Option<Cursor>> {
    Ok(entry_at(store, &path)?.map(|e| Cursor {
        path,
        key: e.key,
        recno: e.ptr,
        stamp: store.stamp(),
    }))
}

fn seek_entry<S: NodeStore + ?Sized>(
    store: &mut S,
    key: &[u8],
    recno: u32,
) -> XbResult<Option<Vec<PathStep>>> {
    let mut path = descend(store, key, Descent::First)?;
    if !settle(store, &mut path)? {
        return Ok(None);
    }
    loop {
        let Some(entry) = entry_at(store, &path)? else {
            return Ok(None);
        };
        if store.compare(&entry.key, key) != Ordering::Equal {
            return Ok(None);
        }
        if entry.ptr == recno {
            return Ok(Some(path));
        }
        if !step_forward(store, &mut path)? {
            return Ok(None);
        }
    }
}

/// Inserts `key` for `recno` after any equal keys.
///
/// # Errors
///
/// Returns an error if a node cannot be read or written.
pub fn insert<S: NodeStore + ?Sized>(store: &mut S, key: &[u8], recno: u32) -> XbResult<()> {
    let path = descend(store, key, Descent::After)?;
    let kpb = store.layout().keys_per_block;
    let mut level = path.len() - 1;
    let mut node = store.load(path[level].addr)?;
    node.entries.insert(
        path[level].pos,
        Entry {
            ptr: recno,
            key: key.to_vec(),
        },
    );

    loop {
        if node.len() <= kpb {
            store.store(&node)?;
            break;
        }

        let right_addr = store.allocate()?;
        let (left, right, separator) = split(node, right_addr);
        store.store(&left)?;
        store.store(&right)?;
        debug!(left = left.addr, right = right.addr, leaf = left.is_leaf(), "node split");

        if level == 0 {
            let root_addr = store.allocate()?;
            let root = NodeImage {
                addr: root_addr,
                entries: vec![Entry {
                    ptr: left.addr,
                    key: separator,
                }],
                trailing: right.addr,
                link: 0,
            };
            store.store(&root)?;
            store.set_root(root_addr)?;
            debug!(root = root_addr, "tree grew a level");
            break;
        }

        level -= 1;
        let step = path[level];
        let mut parent = store.load(step.addr)?;
        parent.entries.insert(
            step.pos,
            Entry {
                ptr: left.addr,
                key: separator,
            },
        );
        parent.set_child(step.pos + 1, right.addr);
        node = parent;
    }

    store.bump_stamp()
}

/// Splits an overfull node. The left half keeps the original block.
fn split(mut node: NodeImage, right_addr: u32) -> (NodeImage, NodeImage, Vec<u8>) {
    if node.is_leaf() {
        let keep = node.len().div_ceil(2);
        let entries = node.entries.split_off(keep);
        let separator = node.entries.last().map(|e| e.key.clone()).unwrap_or_default();
        let right = NodeImage {
            addr: right_addr,
            entries,
            trailing: 0,
            link: 0,
        };
        (node, right, separator)
    } else {
        let mid = node.len() / 2;
        let entries = node.entries.split_off(mid + 1);
        let right = NodeImage {
            addr: right_addr,
            entries,
            trailing: node.trailing,
            link: 0,
        };
        let promoted = node.entries.pop().unwrap_or(Entry {
            ptr: 0,
            key: Vec::new(),
        });
        node.trailing = promoted.ptr;
        (node, right, promoted.key)
    }
}

/// Removes the entry for `key` and `recno`. Returns false if it is not in
/// the tag.
///
/// # Errors
///
/// Returns an error if a node cannot be read or written.
pub fn delete<S: NodeStore + ?Sized>(store: &mut S, key: &[u8], recno: u32) -> XbResult<bool> {
    let Some(path) = seek_entry(store, key, recno)? else {
        return Ok(false);
    };
    let level = path.len() - 1;
    let step = path[level];
    let mut leaf = store.load(step.addr)?;
    let was_max = step.pos + 1 == leaf.len();
    leaf.entries.remove(step.pos);

    if level == 0 {
        store.store(&leaf)?;
    } else if let Some(max) = leaf.entries.last().map(|e| e.key.clone()) {
        store.store(&leaf)?;
        if was_max {
            propagate_max(store, &path, level, max)?;
        }
    } else {
        store.release(leaf.addr)?;
        remove_child(store, &path, level - 1)?;
    }

    store.bump_stamp()?;
    Ok(true)
}

/// Rewrites the separator that records the maximum of the node at
/// `level`, which is the first ancestor reached through a keyed pointer.
fn propagate_max<S: NodeStore + ?Sized>(
    store: &mut S,
    path: &[PathStep],
    mut level: usize,
    max: Vec<u8>,
) -> XbResult<()> {
    while level > 0 {
        level -= 1;
        let step = path[level];
        let mut node = store.load(step.addr)?;
        if step.pos < node.len() {
            node.entries[step.pos].key = max;
            return store.store(&node);
        }
    }
    Ok(())
}

/// Unlinks the child at `path[level].pos` from the node at `level`.
fn remove_child<S: NodeStore + ?Sized>(store: &mut S, path: &[PathStep], level: usize) -> XbResult<()> {
    let step = path[level];
    let mut node = store.load(step.addr)?;
    let mut new_max = None;

    if step.pos < node.len() {
        node.entries.remove(step.pos);
    } else if let Some(last) = node.entries.pop() {
        node.trailing = last.ptr;
        new_max = Some(last.key);
    } else if level == 0 {
        store.store(&NodeImage::empty_leaf(node.addr))?;
        return Ok(());
    } else {
        store.release(node.addr)?;
        return remove_child(store, path, level - 1);
    }

    if level == 0 && node.is_empty() {
        return collapse_root(store, node);
    }
    store.store(&node)?;
    if let Some(max) = new_max {
        propagate_max(store, path, level, max)?;
    }
    Ok(())
}

/// Replaces a root left with a single child by that child.
fn collapse_root<S: NodeStore + ?Sized>(store: &mut S, mut root: NodeImage) -> XbResult<()> {
    loop {
        let child = root.trailing;
        store.release(root.addr)?;
        store.set_root(child)?;
        debug!(root = child, "tree lost a level");
        let next = store.load(child)?;
        if next.is_leaf() || !next.is_empty() {
            return Ok(());
        }
        root = next;
    }
}

/// Outcome of bringing a cursor up to date with the tree.
enum Resync {
    /// The cursor entry still exists at this path.
    Exact(Vec<PathStep>),
    /// The entry is gone; this path is on the entry that followed it.
    Before(Vec<PathStep>),
    /// The entry is gone and nothing follows it.
    End,
}

fn resync<S: NodeStore + ?Sized>(store: &mut S, cursor: &Cursor) -> XbResult<Resync> {
    if cursor.stamp == store.stamp() {
        return Ok(Resync::Exact(cursor.path.clone()));
    }
    if let Some(path) = seek_entry(store, &cursor.key, cursor.recno)? {
        return Ok(Resync::Exact(path));
    }
    let mut path = descend(store, &cursor.key, Descent::After)?;
    if settle(store, &mut path)? {
        Ok(Resync::Before(path))
    } else {
        Ok(Resync::End)
    }
}

/// Cursor on the first key.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn first<S: NodeStore + ?Sized>(store: &mut S) -> XbResult<Option<Cursor>> {
    let mut path = Vec::new();
    let root = store.root();
    leftmost(store, &mut path, root)?;
    cursor_at(store, path)
}

/// Cursor on the last key.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn last<S: NodeStore + ?Sized>(store: &mut S) -> XbResult<Option<Cursor>> {
    let mut path = Vec::new();
    let root = store.root();
    rightmost(store, &mut path, root)?;
    cursor_at(store, path)
}

/// Cursor on the key after `cursor`, or `None` at the end.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn next<S: NodeStore + ?Sized>(store: &mut S, cursor: &Cursor) -> XbResult<Option<Cursor>> {
    match resync(store, cursor)? {
        Resync::Exact(mut path) => {
            if step_forward(store, &mut path)? {
                cursor_at(store, path)
            } else {
                Ok(None)
            }
        }
        Resync::Before(path) => cursor_at(store, path),
        Resync::End => Ok(None),
    }
}

/// Cursor on the key before `cursor`, or `None` at the start.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn prev<S: NodeStore + ?Sized>(store: &mut S, cursor: &Cursor) -> XbResult<Option<Cursor>> {
    match resync(store, cursor)? {
        Resync::Exact(mut path) | Resync::Before(mut path) => {
            if step_back(store, &mut path)? {
                cursor_at(store, path)
            } else {
                Ok(None)
            }
        }
        Resync::End => last(store),
    }
}

/// Cursor on the first key not less than `key`, with whether it equals
/// `key`. `None` if every key is smaller.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn seek<S: NodeStore + ?Sized>(store: &mut S, key: &[u8]) -> XbResult<Option<(Cursor, bool)>> {
    let mut path = descend(store, key, Descent::First)?;
    if !settle(store, &mut path)? {
        return Ok(None);
    }
    Ok(cursor_at(store, path)?.map(|c| {
        let exact = store.compare(&c.key, key) == Ordering::Equal;
        (c, exact)
    }))
}

/// Whether `key` is present for a record other than `except`.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn contains_other<S: NodeStore + ?Sized>(store: &mut S, key: &[u8], except: u32) -> XbResult<bool> {
    let mut path = descend(store, key, Descent::First)?;
    if !settle(store, &mut path)? {
        return Ok(false);
    }
    loop {
        let Some(entry) = entry_at(store, &path)? else {
            return Ok(false);
        };
        if store.compare(&entry.key, key) != Ordering::Equal {
            return Ok(false);
        }
        if entry.ptr != except {
            return Ok(true);
        }
        if !step_forward(store, &mut path)? {
            return Ok(false);
        }
    }
}

/// Whether the entry for `key` and `recno` is present.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn contains<S: NodeStore + ?Sized>(store: &mut S, key: &[u8], recno: u32) -> XbResult<bool> {
    Ok(seek_entry(store, key, recno)?.is_some())
}

/// Number of keys in the tag.
///
/// # Errors
///
/// Returns an error if a node cannot be read.
pub fn key_count<S: NodeStore + ?Sized>(store: &mut S) -> XbResult<u64> {
    let mut count = 0u64;
    let mut stack = vec![(store.root(), 0usize)];
    while let Some((addr, depth)) = stack.pop() {
        too_deep(depth)?;
        let node = store.load(addr)?;
        if node.is_leaf() {
            count += node.len() as u64;
        } else {
            for pos in 0..=node.len() {
                stack.push((node.child(pos), depth + 1));
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::node::NodeLayout;
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashMap};

    /// Node store over a map, with a tiny key length so trees get deep.
    #[derive(Debug)]
    pub(crate) struct MapStore {
        pub layout: NodeLayout,
        pub nodes: HashMap<u32, NodeImage>,
        pub root: u32,
        pub next: u32,
        pub free: Vec<u32>,
        pub stamp: u32,
    }

    impl MapStore {
        pub(crate) fn new(layout: NodeLayout) -> Self {
            let mut nodes = HashMap::new();
            nodes.insert(1, NodeImage::empty_leaf(1));
            Self {
                layout,
                nodes,
                root: 1,
                next: 2,
                free: Vec::new(),
                stamp: 0,
            }
        }

        pub(crate) fn keys(&mut self) -> Vec<(Vec<u8>, u32)> {
            let mut out = Vec::new();
            let mut cursor = first(self).unwrap();
            while let Some(c) = cursor {
                out.push((c.key.clone(), c.recno));
                cursor = next(self, &c).unwrap();
            }
            out
        }

        pub(crate) fn depth(&mut self) -> usize {
            let mut path = Vec::new();
            let root = self.root;
            leftmost(self, &mut path, root).unwrap();
            path.len()
        }
    }

    impl NodeStore for MapStore {
        fn layout(&self) -> NodeLayout {
            self.layout
        }
        fn root(&self) -> u32 {
            self.root
        }
        fn stamp(&self) -> u32 {
            self.stamp
        }
        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            a.cmp(b)
        }
        fn load(&mut self, addr: u32) -> XbResult<NodeImage> {
            self.nodes.get(&addr).cloned().ok_or(XbError::InvalidBlockNo(addr))
        }
        fn store(&mut self, node: &NodeImage) -> XbResult<()> {
            assert!(node.len() <= self.layout.keys_per_block);
            self.nodes.insert(node.addr, node.clone());
            Ok(())
        }
        fn allocate(&mut self) -> XbResult<u32> {
            Ok(self.free.pop().unwrap_or_else(|| {
                self.next += 1;
                self.next - 1
            }))
        }
        fn release(&mut self, addr: u32) -> XbResult<()> {
            self.nodes.remove(&addr);
            self.free.push(addr);
            Ok(())
        }
        fn set_root(&mut self, addr: u32) -> XbResult<()> {
            self.root = addr;
            Ok(())
        }
        fn bump_stamp(&mut self) -> XbResult<()> {
            self.stamp += 1;
            Ok(())
        }
    }

    fn key(n: u32) -> Vec<u8> {
        format!("{n:04}").into_bytes()
    }

    fn small() -> MapStore {
        // 4-byte keys in 1024-byte MDX blocks would hold 126 keys; force
        // tiny nodes instead.
        let mut layout = NodeLayout::mdx(4, 1024);
        layout.keys_per_block = 3;
        MapStore::new(layout)
    }

    #[test]
    fn inserts_stay_ordered_and_split() {
        let mut store = small();
        for n in [50, 10, 40, 20, 30, 60, 70, 5, 15, 25] {
            insert(&mut store, &key(n), n).unwrap();
        }
        let got: Vec<u32> = store.keys().into_iter().map(|(_, r)| r).collect();
        assert_eq!(got, vec![5, 10, 15, 20, 25, 30, 40, 50, 60, 70]);
        assert!(store.depth() >= 3);
        assert_eq!(key_count(&mut store).unwrap(), 10);
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let mut store = small();
        for recno in 1..=7 {
            insert(&mut store, b"SAME", recno).unwrap();
        }
        let got: Vec<u32> = store.keys().into_iter().map(|(_, r)| r).collect();
        assert_eq!(got, (1..=7).collect::<Vec<_>>());

        assert!(contains_other(&mut store, b"SAME", 1).unwrap());
        assert!(delete(&mut store, b"SAME", 4).unwrap());
        assert!(!delete(&mut store, b"SAME", 4).unwrap());
        let got: Vec<u32> = store.keys().into_iter().map(|(_, r)| r).collect();
        assert_eq!(got, vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn deleting_everything_collapses_to_empty_root() {
        let mut store = small();
        for n in 1..=40 {
            insert(&mut store, &key(n), n).unwrap();
        }
        for n in (1..=40).rev().step_by(2).chain((1..=40).step_by(2)) {
            assert!(delete(&mut store, &key(n), n).unwrap(), "key {n}");
        }
        assert!(store.keys().is_empty());
        assert_eq!(store.depth(), 1);
        assert_eq!(store.nodes.len(), 1);
    }

    #[test]
    fn seek_finds_first_not_less() {
        let mut store = small();
        for n in (10..=100).step_by(10) {
            insert(&mut store, &key(n), n).unwrap();
        }
        let (c, exact) = seek(&mut store, &key(40)).unwrap().unwrap();
        assert!(exact);
        assert_eq!(c.recno, 40);
        let (c, exact) = seek(&mut store, &key(45)).unwrap().unwrap();
        assert!(!exact);
        assert_eq!(c.recno, 50);
        assert!(seek(&mut store, &key(101)).unwrap().is_none());
    }

    #[test]
    fn stale_cursor_resyncs_after_changes() {
        let mut store = small();
        for n in 1..=20 {
            insert(&mut store, &key(n), n).unwrap();
        }
        let (c, _) = seek(&mut store, &key(10)).unwrap().unwrap();
        delete(&mut store, &key(10), 10).unwrap();
        delete(&mut store, &key(11), 11).unwrap();

        let after = next(&mut store, &c).unwrap().unwrap();
        assert_eq!(after.recno, 12);
        let before = prev(&mut store, &c).unwrap().unwrap();
        assert_eq!(before.recno, 9);

        let last_c = last(&mut store).unwrap().unwrap();
        assert_eq!(last_c.recno, 20);
        assert!(next(&mut store, &last_c).unwrap().is_none());
        let first_c = first(&mut store).unwrap().unwrap();
        assert!(prev(&mut store, &first_c).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn random_edits_match_a_sorted_set(ops in prop::collection::vec((any::<bool>(), 0u32..60), 1..300)) {
            let mut store = small();
            let mut model = BTreeSet::new();
            for (add, n) in ops {
                if add {
                    if model.insert(n) {
                        insert(&mut store, &key(n), n).unwrap();
                    }
                } else {
                    let removed = delete(&mut store, &key(n), n).unwrap();
                    prop_assert_eq!(removed, model.remove(&n));
                }
            }
            let got: Vec<u32> = store.keys().into_iter().map(|(_, r)| r).collect();
            let want: Vec<u32> = model.into_iter().collect();
            prop_assert_eq!(got, want);
        }
    }
}
