//! CLI command implementations.

pub mod check;
pub mod delete_all;
pub mod dump;
pub mod info;
pub mod pack;

use std::path::Path;
use thiserror::Error;
use tracing::debug;
use xbase_core::{Config, Table, XbError};

/// Errors reported by the maintenance commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The table engine failed.
    #[error(transparent)]
    Table(#[from] XbError),

    /// Output could not be written.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A tag named on the command line is not open.
    #[error("no tag named {0}")]
    UnknownTag(String),

    /// One or more tags do not match the table.
    #[error("{tags} tag(s) failed the integrity check")]
    CheckFailed {
        /// Tags with problems.
        tags: usize,
    },
}

/// Result type of the commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens a table with the default multi-user configuration.
pub fn open_table(path: &Path) -> CliResult<Table> {
    let table = Table::open(path, Config::default())?;
    debug!(
        path = %path.display(),
        records = table.record_count(),
        tags = table.tag_handles().len(),
        "table opened for maintenance"
    );
    Ok(table)
}
