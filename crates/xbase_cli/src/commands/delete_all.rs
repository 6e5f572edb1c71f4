//! Delete-all and undelete-all command implementation.

use super::{open_table, CliResult};
use std::path::Path;
use xbase_core::DeleteAllOption;

/// Runs the delete-all or undelete-all command.
pub fn run(path: &Path, option: DeleteAllOption) -> CliResult<()> {
    let mut table = open_table(path)?;
    let changed = table.delete_all(option)?;
    let total = table.record_count();
    table.close()?;

    let verb = match option {
        DeleteAllOption::Delete => "Deleted",
        DeleteAllOption::Undelete => "Recalled",
    };
    println!("{verb} {changed} of {total} records in {}", path.display());
    Ok(())
}
