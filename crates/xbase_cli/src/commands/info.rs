//! Info command implementation.

use super::{open_table, CliResult};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use xbase_core::index::IndexFormat;
use xbase_core::Table;

/// Table metadata.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Table path.
    pub path: String,
    /// Format version, 3 or 4.
    pub version: u8,
    /// Last update as `CCYY-MM-DD`.
    pub last_update: String,
    /// Records in the file, deleted ones included.
    pub record_count: u32,
    /// Bytes per record.
    pub record_len: usize,
    /// Bytes before the first record.
    pub header_len: u16,
    /// Memo file, if the table has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo_file: Option<String>,
    /// Whether the header flags a production MDX.
    pub production_mdx: bool,
    /// Field layout.
    pub fields: Vec<FieldInfo>,
    /// Open tags.
    pub tags: Vec<TagInfo>,
}

/// One field.
#[derive(Debug, Serialize)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Type character.
    #[serde(rename = "type")]
    pub field_type: char,
    /// Length in bytes.
    pub len: usize,
    /// Decimal count.
    pub decimals: usize,
}

/// One tag.
#[derive(Debug, Serialize)]
pub struct TagInfo {
    /// Tag name.
    pub name: String,
    /// File format.
    pub kind: String,
    /// Index file.
    pub file: String,
    /// Key expression.
    pub key: String,
    /// Filter expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Key type character.
    pub key_type: char,
    /// Key length in bytes.
    pub key_len: usize,
    /// Unique keys only.
    pub unique: bool,
    /// Descending order.
    pub descending: bool,
    /// Keys in the tag.
    pub keys: u64,
}

/// Runs the info command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let mut table = open_table(path)?;
    let result = collect(&mut table)?;
    table.close()?;

    let mut out = std::io::stdout().lock();
    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?,
        _ => print_text_output(&result, &mut out)?,
    }
    Ok(())
}

/// Gathers the metadata of an open table.
pub fn collect(table: &mut Table) -> CliResult<InfoResult> {
    let header = table.header().clone();
    let [yy, mm, dd] = header.updated;
    let fields = table
        .fields()
        .iter()
        .map(|f| FieldInfo {
            name: f.name.clone(),
            field_type: f.field_type.as_char(),
            len: f.len,
            decimals: f.decimals,
        })
        .collect();

    let mut tags = Vec::new();
    for handle in table.tag_handles() {
        let index = table.indices().get(handle.index)?;
        let kind = index.kind().to_string();
        let file = index.format().path().display().to_string();
        let tag = table.tag(handle)?;
        let mut info = TagInfo {
            name: tag.name().to_string(),
            kind,
            file,
            key: tag.key_expr().to_string(),
            filter: tag.filter_expr().map(str::to_string),
            key_type: tag.key_type().as_char(),
            key_len: tag.key_len(),
            unique: tag.is_unique(),
            descending: tag.is_descending(),
            keys: 0,
        };
        info.keys = table.key_count(handle)?;
        tags.push(info);
    }

    Ok(InfoResult {
        path: table.path().display().to_string(),
        version: header.version.number(),
        last_update: format!("{:04}-{:02}-{:02}", 1900 + u32::from(yy), mm, dd),
        record_count: header.record_count,
        record_len: table.record_len(),
        header_len: header.header_len,
        memo_file: table.memo_path().map(|p| p.display().to_string()),
        production_mdx: header.production_mdx,
        fields,
        tags,
    })
}

fn print_text_output(result: &InfoResult, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Table: {}", result.path)?;
    writeln!(out)?;
    writeln!(out, "  Version:        dBASE {}", if result.version == 3 { "III" } else { "IV" })?;
    writeln!(out, "  Last update:    {}", result.last_update)?;
    writeln!(out, "  Records:        {}", result.record_count)?;
    writeln!(out, "  Record length:  {} bytes", result.record_len)?;
    writeln!(out, "  Header length:  {} bytes", result.header_len)?;
    if let Some(memo) = &result.memo_file {
        writeln!(out, "  Memo file:      {memo}")?;
    }
    writeln!(out, "  Production MDX: {}", if result.production_mdx { "yes" } else { "no" })?;

    writeln!(out)?;
    writeln!(out, "Fields:")?;
    for (no, field) in result.fields.iter().enumerate() {
        writeln!(
            out,
            "  {no:>3}  {:<10}  {}  {:>3}  {}",
            field.name, field.field_type, field.len, field.decimals
        )?;
    }

    if !result.tags.is_empty() {
        writeln!(out)?;
        writeln!(out, "Tags:")?;
        for tag in &result.tags {
            let mut flags = Vec::new();
            if tag.unique {
                flags.push("unique");
            }
            if tag.descending {
                flags.push("descending");
            }
            writeln!(
                out,
                "  {:<10} {} key={} type={} len={} keys={} {}",
                tag.name,
                tag.kind,
                tag.key,
                tag.key_type,
                tag.key_len,
                tag.keys,
                flags.join(",")
            )?;
            if let Some(filter) = &tag.filter {
                writeln!(out, "             for {filter}")?;
            }
        }
    }
    Ok(())
}
