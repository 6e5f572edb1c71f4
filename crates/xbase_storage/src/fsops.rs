//! File create, rename and delete helpers.
//!
//! xBase companion files (MDX, DBT, INF, NDX) live next to the table and
//! share its stem. The helpers here derive those sibling names and wrap the
//! std filesystem calls in [`StorageError`].

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns true if `path` names an existing regular file.
#[must_use]
pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

/// Deletes a file.
///
/// # Errors
///
/// Returns [`StorageError::FileNotFound`] if the file is missing.
pub fn remove_file(path: &Path) -> StorageResult<()> {
    fs::remove_file(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StorageError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => StorageError::Io(e),
    })
}

/// Deletes a file if it exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Renames `from` to `to`, replacing any existing target.
///
/// # Errors
///
/// Returns [`StorageError::Rename`] when the rename fails.
pub fn rename_file(from: &Path, to: &Path) -> StorageResult<()> {
    fs::rename(from, to).map_err(|source| StorageError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Returns the sibling of `path` with extension `ext`.
///
/// The new extension follows the case of the existing one, so
/// `ORDERS.DBF` pairs with `ORDERS.MDX` and `orders.dbf` with `orders.mdx`.
#[must_use]
pub fn sibling_with_extension(path: &Path, ext: &str) -> PathBuf {
    let lower = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.chars().any(|c| c.is_ascii_lowercase()));
    let ext = if lower {
        ext.to_ascii_lowercase()
    } else {
        ext.to_ascii_uppercase()
    };
    path.with_extension(ext)
}

/// Returns the upper-cased file stem of `path`, or an empty string.
#[must_use]
pub fn stem_upper(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sibling_follows_extension_case() {
        assert_eq!(
            sibling_with_extension(Path::new("/data/ORDERS.DBF"), "mdx"),
            PathBuf::from("/data/ORDERS.MDX")
        );
        assert_eq!(
            sibling_with_extension(Path::new("orders.dbf"), "INF"),
            PathBuf::from("orders.inf")
        );
    }

    #[test]
    fn stem_is_upper_cased() {
        assert_eq!(stem_upper(Path::new("dir/orders.dbf")), "ORDERS");
        assert_eq!(stem_upper(Path::new("")), "");
    }

    #[test]
    fn remove_and_rename() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("A.DBF");
        let b = dir.path().join("B.DBF");
        fs::write(&a, b"x").unwrap();

        rename_file(&a, &b).unwrap();
        assert!(!file_exists(&a));
        assert!(file_exists(&b));

        remove_file(&b).unwrap();
        assert!(matches!(
            remove_file(&b),
            Err(StorageError::FileNotFound { .. })
        ));
        remove_file_if_exists(&b).unwrap();
    }
}
