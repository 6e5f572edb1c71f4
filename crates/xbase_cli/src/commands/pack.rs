//! Pack command implementation.

use super::{open_table, CliResult};
use std::path::Path;
use xbase_core::Table;

/// Pack statistics.
#[derive(Debug, PartialEq, Eq)]
pub struct PackStats {
    /// Records before packing.
    pub records_before: u32,
    /// Deleted records removed.
    pub removed: u32,
    /// Records left.
    pub records_after: u32,
}

/// Runs the pack command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Packing {}", path.display());

    let mut table = open_table(path)?;
    let stats = pack(&mut table)?;
    table.close()?;

    println!();
    println!("  Records before: {}", stats.records_before);
    println!("  Removed:        {}", stats.removed);
    println!("  Records after:  {}", stats.records_after);
    println!();
    if stats.removed == 0 {
        println!("No deleted records - nothing to remove");
    } else {
        println!("✓ Pack complete");
    }
    Ok(())
}

/// Packs an open table.
pub fn pack(table: &mut Table) -> CliResult<PackStats> {
    let records_before = table.record_count();
    let removed = table.pack()?;
    Ok(PackStats {
        records_before,
        removed,
        records_after: table.record_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xbase_core::{IndexKind, TagDef};
    use xbase_testkit::prelude::*;

    #[test]
    fn removes_deleted_records() {
        let mut t = scenarios::amount_table(&[1.0, 2.0, 3.0, 4.0]);
        let tag = t
            .create_tag(IndexKind::Mdx, &TagDef::new("AMOUNT", "AMOUNT"), false)
            .unwrap();
        for recno in [1, 3] {
            t.get_record(recno).unwrap();
            t.delete_record().unwrap();
            t.commit().unwrap();
        }

        let stats = pack(&mut t).unwrap();
        assert_eq!(
            stats,
            PackStats {
                records_before: 4,
                removed: 2,
                records_after: 2
            }
        );
        assert_eq!(t.key_count(tag).unwrap(), 2);
    }
}
