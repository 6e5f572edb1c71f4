//! Check command implementation.

use super::{open_table, CliError, CliResult};
use std::io::Write;
use std::path::Path;
use xbase_core::{IntegrityOutput, IntegrityReport, Table};

/// Runs the check command.
pub fn run(path: &Path, detail: bool) -> CliResult<()> {
    println!("Checking indices of {}", path.display());
    println!();

    let mut table = open_table(path)?;
    let reports = check_all(&mut table)?;
    table.close()?;

    let mut out = std::io::stdout().lock();
    let failed = print_reports(&reports, detail, &mut out)?;
    writeln!(out)?;
    if failed == 0 {
        writeln!(out, "✓ Index check passed")?;
        Ok(())
    } else {
        writeln!(out, "✗ Index check failed")?;
        Err(CliError::CheckFailed { tags: failed })
    }
}

/// Checks every open tag.
pub fn check_all(table: &mut Table) -> CliResult<Vec<IntegrityReport>> {
    let mut reports = Vec::new();
    for handle in table.tag_handles() {
        reports.push(table.check_tag_integrity(handle, IntegrityOutput::Silent)?);
    }
    Ok(reports)
}

/// Prints one line per tag and returns the number of failing tags.
fn print_reports(
    reports: &[IntegrityReport],
    detail: bool,
    out: &mut impl Write,
) -> std::io::Result<usize> {
    if reports.is_empty() {
        writeln!(out, "No open tags")?;
        return Ok(0);
    }
    let mut failed = 0;
    for report in reports {
        let verdict = if report.is_ok() {
            "ok".to_string()
        } else {
            failed += 1;
            format!("{} problem(s)", report.inconsistencies())
        };
        writeln!(
            out,
            "  {:<10} keys: {:>8}  expected: {:>8}  {verdict}",
            report.tag, report.keys, report.expected
        )?;
        if detail {
            for problem in &report.problems {
                writeln!(out, "      {problem}")?;
            }
        }
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xbase_core::{IndexKind, TableVersion, TagDef};
    use xbase_testkit::prelude::*;

    #[test]
    fn healthy_tags_pass() {
        let mut t = scenarios::contacts_table(25, TableVersion::V3);
        t.create_tag(IndexKind::Ndx, &TagDef::new("LASTN", "LAST"), false)
            .unwrap();
        t.create_tag(IndexKind::Mdx, &TagDef::new("BORN", "BORN"), false)
            .unwrap();

        let reports = check_all(&mut t).unwrap();
        assert_eq!(reports.len(), 2);
        let mut out = Vec::new();
        assert_eq!(print_reports(&reports, true, &mut out).unwrap(), 0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("LASTN"));
        assert!(text.contains("ok"));
    }

    #[test]
    fn detail_lists_problems() {
        let report = IntegrityReport {
            tag: "AMOUNT".into(),
            keys: 2,
            expected: 3,
            problems: vec!["record 3: key missing from tag".into()],
        };
        let mut out = Vec::new();
        assert_eq!(print_reports(&[report], true, &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 problem(s)"));
        assert!(text.contains("record 3: key missing from tag"));
    }

    #[test]
    fn table_without_tags() {
        let mut t = scenarios::amount_table(&[5.0]);
        let reports = check_all(&mut t).unwrap();
        let mut out = Vec::new();
        assert_eq!(print_reports(&reports, false, &mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "No open tags\n");
    }
}
