//! `.INF` files: the NDX indices opened automatically with a table.
//!
//! ```text
//! [dbase]\r\n
//! NDX=BYNAME.NDX\r\n
//! NDX1=BYAMT.NDX\r\n
//! ```
//!
//! Entries are NDX file names relative to the table's directory. A missing
//! INF file means no entries.

use crate::error::XbResult;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use xbase_storage::fsops::{remove_file_if_exists, sibling_with_extension};

/// Path of the INF file belonging to `table_path`.
#[must_use]
pub fn inf_path(table_path: &Path) -> PathBuf {
    sibling_with_extension(table_path, "INF")
}

/// Parses INF text into its NDX entries, in file order.
#[must_use]
pub fn parse(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let (left, right) = line.split_once('=')?;
            let left = left.trim();
            let is_ndx = left.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("NDX"))
                && left[3..].chars().all(|c| c.is_ascii_digit());
            let name = right.trim();
            (is_ndx && !name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Renders entries as INF text with CRLF line ends.
#[must_use]
pub fn render(entries: &[String]) -> String {
    let mut out = String::from("[dbase]\r\n");
    for (i, name) in entries.iter().enumerate() {
        if i == 0 {
            out.push_str(&format!("NDX={name}\r\n"));
        } else {
            out.push_str(&format!("NDX{i}={name}\r\n"));
        }
    }
    out
}

/// Reads the NDX entries of the table at `table_path`.
///
/// # Errors
///
/// Returns an I/O error if the INF file exists but cannot be read.
pub fn load(table_path: &Path) -> XbResult<Vec<String>> {
    match fs::read(inf_path(table_path)) {
        Ok(bytes) => Ok(parse(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Writes `entries` as the table's INF file, removing the file when empty.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn save(table_path: &Path, entries: &[String]) -> XbResult<()> {
    let path = inf_path(table_path);
    if entries.is_empty() {
        remove_file_if_exists(&path)?;
        return Ok(());
    }
    fs::write(&path, render(entries))?;
    Ok(())
}

/// Resolves an entry against the table's directory.
#[must_use]
pub fn resolve(table_path: &Path, entry: &str) -> PathBuf {
    let entry = Path::new(entry);
    if entry.is_absolute() {
        return entry.to_path_buf();
    }
    table_path
        .parent()
        .map_or_else(|| entry.to_path_buf(), |dir| dir.join(entry))
}

fn entry_for(table_path: &Path, ndx_path: &Path) -> String {
    let same_dir = ndx_path.parent() == table_path.parent()
        || ndx_path.parent().is_some_and(|p| p.as_os_str().is_empty());
    match ndx_path.file_name() {
        Some(name) if same_dir => name.to_string_lossy().into_owned(),
        _ => ndx_path.to_string_lossy().into_owned(),
    }
}

/// Adds `ndx_path` to the table's INF file unless already listed.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read or written.
pub fn register(table_path: &Path, ndx_path: &Path) -> XbResult<()> {
    let mut entries = load(table_path)?;
    let entry = entry_for(table_path, ndx_path);
    if entries.iter().any(|e| e.eq_ignore_ascii_case(&entry)) {
        return Ok(());
    }
    debug!(table = %table_path.display(), ndx = %entry, "INF entry added");
    entries.push(entry);
    save(table_path, &entries)
}

/// Removes `ndx_path` from the table's INF file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read or written.
pub fn unregister(table_path: &Path, ndx_path: &Path) -> XbResult<()> {
    let mut entries = load(table_path)?;
    let entry = entry_for(table_path, ndx_path);
    let before = entries.len();
    entries.retain(|e| !e.eq_ignore_ascii_case(&entry));
    if entries.len() == before {
        return Ok(());
    }
    debug!(table = %table_path.display(), ndx = %entry, "INF entry removed");
    save(table_path, &entries)
}
