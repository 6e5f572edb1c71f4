//! File digests for byte-identity checks.
//!
//! A [`FileSnapshot`] records the SHA-256 of every table, memo and index
//! file in a directory so two states can be compared after an operation
//! that must not change the files, such as a repeated reindex.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Extensions of the files a table owns.
pub const TABLE_EXTENSIONS: &[&str] = &["DBF", "DBT", "NDX", "MDX", "TDX", "INF"];

/// Hex SHA-256 of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex(&Sha256::digest(&bytes)))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digests of the table files in one directory, keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    /// File name to hex digest.
    pub files: BTreeMap<String, String>,
}

impl FileSnapshot {
    /// Digests every file in `dir` whose extension is in
    /// [`TABLE_EXTENSIONS`]. Lock directories and other files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be read.
    pub fn take(dir: &Path) -> io::Result<Self> {
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let wanted = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TABLE_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(e)));
            if !wanted {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.insert(name, file_digest(&path)?);
        }
        Ok(Self { files })
    }

    /// Digest of one file, if it was captured.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// Names of files whose digest differs from `other`, including files
    /// present on one side only.
    pub fn changed(&self, other: &Self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .keys()
            .chain(other.files.keys())
            .filter(|name| self.files.get(*name) != other.files.get(*name))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Pretty JSON, for assertion messages.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn digest_of_known_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("A.DBF");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_digest(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn snapshot_tracks_table_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.DBF"), b"one").unwrap();
        fs::write(dir.path().join("A.MDX"), b"two").unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip").unwrap();
        let before = FileSnapshot::take(dir.path()).unwrap();
        assert_eq!(before.files.len(), 2);

        fs::write(dir.path().join("A.MDX"), b"three").unwrap();
        let after = FileSnapshot::take(dir.path()).unwrap();
        assert_eq!(before.changed(&after), vec!["A.MDX".to_string()]);
        assert!(before.to_json().contains("A.DBF"));
    }
}
