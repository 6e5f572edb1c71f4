//! Dump command implementation.

use super::{open_table, CliError, CliResult};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use xbase_core::{FieldType, Nav, Scope, Table};

/// What to dump.
#[derive(Debug, Default)]
pub struct DumpOptions {
    /// Stop after this many records.
    pub limit: Option<usize>,
    /// Walk in the order of this tag instead of record order.
    pub tag: Option<String>,
    /// Skip deleted records.
    pub active_only: bool,
}

/// One dumped record.
#[derive(Debug, Serialize)]
pub struct DumpedRecord {
    /// Record number.
    pub recno: u32,
    /// Delete flag.
    pub deleted: bool,
    /// Field values, trailing blanks removed, memo text inline.
    pub fields: Vec<FieldValue>,
}

/// One field of a dumped record.
#[derive(Debug, Serialize)]
pub struct FieldValue {
    /// Field name.
    pub name: String,
    /// Value as text.
    pub value: String,
}

/// Runs the dump command.
pub fn run(path: &Path, options: &DumpOptions, format: &str) -> CliResult<()> {
    let mut table = open_table(path)?;
    let records = collect(&mut table, options)?;
    table.close()?;

    let mut out = std::io::stdout().lock();
    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?,
        _ => {
            for record in &records {
                print_record(record, &mut out)?;
            }
            writeln!(out, "{} record(s)", records.len())?;
        }
    }
    Ok(())
}

/// Reads the records selected by `options`.
pub fn collect(table: &mut Table, options: &DumpOptions) -> CliResult<Vec<DumpedRecord>> {
    let scope = if options.active_only {
        Scope::ActiveOnly
    } else {
        Scope::All
    };
    let by_tag = match &options.tag {
        Some(name) => {
            let handle = table
                .tag_by_name(name)
                .map_err(|_| CliError::UnknownTag(name.clone()))?;
            table.set_current_tag(handle)?;
            true
        }
        None => false,
    };
    let limit = options.limit.unwrap_or(usize::MAX);

    let mut records = Vec::new();
    let mut nav = if by_tag {
        table.get_first_key()?
    } else {
        table.get_first_record(scope)?
    };
    while let Nav::Record(recno) = nav {
        if records.len() >= limit {
            break;
        }
        if scope.admits(table.is_deleted()) {
            records.push(read_record(table, recno)?);
        }
        nav = if by_tag {
            table.get_next_key()?
        } else {
            table.get_next_record(scope)?
        };
    }
    Ok(records)
}

fn read_record(table: &mut Table, recno: u32) -> CliResult<DumpedRecord> {
    let mut fields = Vec::with_capacity(table.field_count());
    for no in 0..table.field_count() {
        let desc = table.field(no)?;
        let name = desc.name.clone();
        let value = if desc.field_type == FieldType::Memo {
            table.get_memo(no)?
        } else {
            table.get_field(no)?.trim_end().to_string()
        };
        fields.push(FieldValue { name, value });
    }
    Ok(DumpedRecord {
        recno,
        deleted: table.is_deleted(),
        fields,
    })
}

fn print_record(record: &DumpedRecord, out: &mut impl Write) -> std::io::Result<()> {
    let flag = if record.deleted { '*' } else { ' ' };
    write!(out, "{:>8} {flag}", record.recno)?;
    for field in &record.fields {
        write!(out, " {}={}", field.name, field.value.replace('\n', "\\n"))?;
    }
    writeln!(out)
}
