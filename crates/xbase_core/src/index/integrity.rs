//! Structural and content checks for one tag.

use super::btree::NodeStore;
use crate::error::XbResult;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// How much a check reports through the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityOutput {
    /// Nothing is logged.
    #[default]
    Silent,
    /// One line per tag.
    Summary,
    /// Every inconsistency, then the summary.
    Detail,
}

impl TryFrom<i16> for IntegrityOutput {
    type Error = crate::error::XbError;

    fn try_from(value: i16) -> XbResult<Self> {
        match value {
            0 => Ok(Self::Silent),
            1 => Ok(Self::Summary),
            2 => Ok(Self::Detail),
            other => Err(crate::error::XbError::InvalidOption(format!(
                "integrity output {other}"
            ))),
        }
    }
}

/// Outcome of [`check_tag`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntegrityReport {
    /// Tag name.
    pub tag: String,
    /// Keys found in the tree.
    pub keys: u64,
    /// Records the table says belong in the tag.
    pub expected: u64,
    /// Description of each problem found.
    pub problems: Vec<String>,
}

impl IntegrityReport {
    /// Whether the tag matched the table.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of inconsistencies found.
    #[must_use]
    pub fn inconsistencies(&self) -> usize {
        self.problems.len()
    }
}

struct Walk<'a, S: NodeStore + ?Sized> {
    store: &'a mut S,
    leaf_depth: Option<usize>,
    keys: Vec<(Vec<u8>, u32)>,
    problems: Vec<String>,
}

impl<S: NodeStore + ?Sized> Walk<'_, S> {
    /// Visits the subtree at `addr` and returns its largest key.
    fn visit(&mut self, addr: u32, depth: usize, is_root: bool) -> XbResult<Option<Vec<u8>>> {
        if depth > 64 {
            self.problems.push(format!("node {addr}: tree deeper than 64 levels"));
            return Ok(None);
        }
        let node = self.store.load(addr)?;
        let capacity = self.store.layout().keys_per_block;
        if node.len() > capacity {
            self.problems
                .push(format!("node {addr}: {} keys, capacity {capacity}", node.len()));
        }

        if node.is_leaf() {
            match self.leaf_depth {
                None => self.leaf_depth = Some(depth),
                Some(d) if d != depth => self
                    .problems
                    .push(format!("leaf {addr} at depth {depth}, expected {d}")),
                Some(_) => {}
            }
            if node.is_empty() && !is_root {
                self.problems.push(format!("leaf {addr} is empty"));
            }
            for entry in &node.entries {
                if let Some((prev, _)) = self.keys.last() {
                    if self.store.compare(prev, &entry.key) == Ordering::Greater {
                        self.problems
                            .push(format!("leaf {addr}: record {} out of order", entry.ptr));
                    }
                }
                self.keys.push((entry.key.clone(), entry.ptr));
            }
            return Ok(node.entries.last().map(|e| e.key.clone()));
        }

        let mut max = None;
        for pos in 0..=node.len() {
            let child_max = self.visit(node.child(pos), depth + 1, false)?;
            if let Some(entry) = node.entries.get(pos) {
                let matches = child_max
                    .as_deref()
                    .is_some_and(|m| self.store.compare(m, &entry.key) == Ordering::Equal);
                if !matches {
                    self.problems.push(format!(
                        "node {addr}: separator {pos} is not the maximum of its child"
                    ));
                }
            }
            if child_max.is_some() {
                max = child_max;
            }
        }
        Ok(max)
    }
}

/// Checks one tag against the `(key, recno)` pairs the table expects it to
/// hold.
///
/// Verifies that keys are in tag order, leaves share one depth, separators
/// equal the maximum of their left child, node counts fit the block, unique
/// tags hold no duplicate key, and the tree holds exactly the expected
/// entries.
///
/// # Errors
///
/// Returns an error only if a node cannot be read; damage found in the tree
/// is reported in the [`IntegrityReport`].
pub fn check_tag<S: NodeStore + ?Sized>(
    store: &mut S,
    tag: &str,
    unique: bool,
    expected: &[(Vec<u8>, u32)],
    output: IntegrityOutput,
) -> XbResult<IntegrityReport> {
    let root = store.root();
    let mut walk = Walk {
        store,
        leaf_depth: None,
        keys: Vec::new(),
        problems: Vec::new(),
    };
    walk.visit(root, 0, true)?;
    let Walk {
        store,
        keys,
        mut problems,
        ..
    } = walk;

    if unique {
        for pair in keys.windows(2) {
            if store.compare(&pair[0].0, &pair[1].0) == Ordering::Equal {
                problems.push(format!(
                    "records {} and {} share a key in a unique tag",
                    pair[0].1, pair[1].1
                ));
            }
        }
    }

    if unique {
        match_unique(&keys, expected, &mut problems);
    } else {
        match_all(&keys, expected, &mut problems);
    }

    let report = IntegrityReport {
        tag: tag.to_string(),
        keys: keys.len() as u64,
        expected: expected.len() as u64,
        problems,
    };
    match output {
        IntegrityOutput::Silent => {}
        IntegrityOutput::Detail => {
            for problem in &report.problems {
                warn!(tag, "{problem}");
            }
            log_summary(&report);
        }
        IntegrityOutput::Summary => log_summary(&report),
    }
    Ok(report)
}

/// Every expected entry must be in the tree and nothing else.
fn match_all(keys: &[(Vec<u8>, u32)], expected: &[(Vec<u8>, u32)], problems: &mut Vec<String>) {
    let mut balance: BTreeMap<(u32, Vec<u8>), i64> = BTreeMap::new();
    for (key, recno) in keys {
        *balance.entry((*recno, key.clone())).or_default() += 1;
    }
    for (key, recno) in expected {
        *balance.entry((*recno, key.clone())).or_default() -= 1;
    }
    for ((recno, _), diff) in balance {
        match diff.cmp(&0) {
            Ordering::Greater => problems.push(format!("record {recno}: key in tag but not in table")),
            Ordering::Less => problems.push(format!("record {recno}: key missing from tag")),
            Ordering::Equal => {}
        }
    }
}

/// A unique tag holds each distinct key once, pointing at any one of the
/// records that carry it.
fn match_unique(keys: &[(Vec<u8>, u32)], expected: &[(Vec<u8>, u32)], problems: &mut Vec<String>) {
    let mut holders: BTreeMap<&[u8], Vec<u32>> = BTreeMap::new();
    for (key, recno) in expected {
        holders.entry(key.as_slice()).or_default().push(*recno);
    }
    for (key, recno) in keys {
        match holders.remove(key.as_slice()) {
            Some(records) if records.contains(recno) => {}
            Some(records) => problems.push(format!(
                "record {recno}: key belongs to record {}",
                records[0]
            )),
            None => problems.push(format!("record {recno}: key in tag but not in table")),
        }
    }
    for records in holders.into_values() {
        problems.push(format!("record {}: key missing from tag", records[0]));
    }
}

fn log_summary(report: &IntegrityReport) {
    if report.is_ok() {
        info!(tag = %report.tag, keys = report.keys, "tag is consistent");
    } else {
        warn!(
            tag = %report.tag,
            keys = report.keys,
            expected = report.expected,
            inconsistencies = report.inconsistencies(),
            "tag is inconsistent"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::btree::tests::MapStore;
    use crate::index::btree::{delete, insert};
    use crate::index::node::{Entry, NodeLayout};

    fn key(n: u32) -> Vec<u8> {
        format!("{n:04}").into_bytes()
    }

    fn filled(n: u32) -> (MapStore, Vec<(Vec<u8>, u32)>) {
        let mut layout = NodeLayout::mdx(4, 1024);
        layout.keys_per_block = 4;
        let mut store = MapStore::new(layout);
        let mut expected = Vec::new();
        for i in 1..=n {
            insert(&mut store, &key(i % 37), i).unwrap();
            expected.push((key(i % 37), i));
        }
        (store, expected)
    }

    #[test]
    fn healthy_tree_passes() {
        let (mut store, expected) = filled(200);
        let report = check_tag(&mut store, "T", false, &expected, IntegrityOutput::Summary).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.keys, 200);
    }

    #[test]
    fn healthy_after_deletes() {
        let (mut store, mut expected) = filled(200);
        for i in (1..=200).filter(|i| i % 3 != 0) {
            assert!(delete(&mut store, &key(i % 37), i).unwrap());
        }
        expected.retain(|(_, r)| r % 3 == 0);
        let report = check_tag(&mut store, "T", false, &expected, IntegrityOutput::Silent).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
    }

    #[test]
    fn missing_and_extra_records_are_reported() {
        let (mut store, mut expected) = filled(50);
        expected.pop();
        expected.push((key(99), 999));
        let report = check_tag(&mut store, "T", false, &expected, IntegrityOutput::Detail).unwrap();
        assert_eq!(report.inconsistencies(), 2);
    }

    #[test]
    fn duplicate_keys_break_unique_tags() {
        let (mut store, expected) = filled(50);
        let report = check_tag(&mut store, "T", true, &expected, IntegrityOutput::Silent).unwrap();
        assert!(!report.is_ok());
    }

    #[test]
    fn unique_tag_may_point_at_any_holder() {
        let mut store = MapStore::new(NodeLayout::mdx(4, 1024));
        insert(&mut store, &key(1), 2).unwrap();
        insert(&mut store, &key(2), 3).unwrap();
        let expected = vec![(key(1), 1), (key(1), 2), (key(2), 3)];
        let report = check_tag(&mut store, "T", true, &expected, IntegrityOutput::Silent).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);

        let missing = vec![(key(1), 2), (key(2), 3), (key(3), 4)];
        let report = check_tag(&mut store, "T", true, &missing, IntegrityOutput::Silent).unwrap();
        assert_eq!(report.problems, vec!["record 4: key missing from tag".to_string()]);
    }

    #[test]
    fn damaged_separator_is_found() {
        let (mut store, expected) = filled(100);
        let root = store.root();
        let mut node = store.load(root).unwrap();
        assert!(!node.is_leaf());
        node.entries[0] = Entry {
            ptr: node.entries[0].ptr,
            key: b"0000".to_vec(),
        };
        store.store(&node).unwrap();
        let report = check_tag(&mut store, "T", false, &expected, IntegrityOutput::Silent).unwrap();
        assert!(report.problems.iter().any(|p| p.contains("separator")));
    }

    #[test]
    fn output_levels_from_codes() {
        assert_eq!(IntegrityOutput::try_from(2).unwrap(), IntegrityOutput::Detail);
        assert!(IntegrityOutput::try_from(3).is_err());
    }
}
