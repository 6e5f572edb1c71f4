//! xb_reindex
//!
//! Rebuilds the indices of one table. Without `-n` every tag of the
//! production MDX and every NDX listed in the table's INF file is rebuilt;
//! with `-n` only the named NDX file is.
//!
//! Diagnostics go to stdout. The exit status is 0 after a successful
//! reindex and 1 otherwise, help and version output included.

use clap::Parser;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use xbase_core::{Config, IndexKind, IndexMode, ReindexScope, Table, TagHandle, XbError};

const SUCCESS: u8 = 0;
const FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "xb_reindex", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Show usage
    #[arg(short = 'h', long = "help", short_alias = '?')]
    help: bool,

    /// Show the library version
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Table to reindex
    #[arg(short = 't', value_name = "filename.DBF")]
    table: Option<PathBuf>,

    /// Rebuild only this NDX file
    #[arg(short = 'n', value_name = "index.NDX")]
    ndx: Option<String>,

    /// dBASE compatible duplicate and deleted record handling
    #[arg(short = 'c')]
    dbase_mode: bool,

    /// Unique keys enforced, deleted records left out of indices
    #[arg(short = 'x')]
    xbase_mode: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let mut stdout = io::stdout().lock();
    match run(&argv, &mut stdout) {
        Ok(status) => ExitCode::from(status),
        Err(_) => ExitCode::from(FAILURE),
    }
}

fn print_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "Usage: xb_reindex [-h] [-?] [--help] [-v] [--version] -t filename.DBF [-n index.NDX] [-c | -x]"
    )?;
    writeln!(out)?;
    writeln!(out, "Rebuilds the indices of one .DBF table.")?;
    writeln!(out, "With -n only the given NDX file is rebuilt.")?;
    writeln!(
        out,
        "Without -n every tag of the production MDX and every index listed in the table's INF file is rebuilt."
    )?;
    writeln!(
        out,
        "-c is {}  - dBASE compatible duplicate key and deleted record handling",
        IndexMode::EmulateDbase.label()
    )?;
    writeln!(
        out,
        "-x is {}  - unique keys enforced, deleted records removed from indices",
        IndexMode::HaltOnDupKey.label()
    )
}

fn print_version(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "xb_reindex v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "xbase_core v{}", xbase_core::VERSION)
}

/// Tag name of an NDX file: its upper-cased stem.
fn ndx_tag_name(ndx: &str) -> String {
    Path::new(ndx)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_uppercase())
        .unwrap_or_default()
}

/// A bare file name is looked up next to the table.
fn resolve_ndx(table: &Path, ndx: &str) -> PathBuf {
    let path = Path::new(ndx);
    let bare = path.parent().map_or(true, |p| p.as_os_str().is_empty());
    if path.is_relative() && bare {
        table
            .parent()
            .map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
    } else {
        path.to_path_buf()
    }
}

fn open_ndx(table: &mut Table, ndx: &str) -> Result<TagHandle, XbError> {
    let path = resolve_ndx(table.path(), ndx);
    let id = table.open_index(IndexKind::Ndx, &path)?;
    table
        .tag_handles()
        .into_iter()
        .find(|h| h.index == id)
        .ok_or_else(|| XbError::InvalidTag(ndx.to_string()))
}

fn report(out: &mut impl Write, err: &XbError) -> io::Result<()> {
    writeln!(out, "{err}")
}

fn run(argv: &[String], out: &mut impl Write) -> io::Result<u8> {
    if argv.len() < 2 {
        print_help(out)?;
        return Ok(FAILURE);
    }
    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => {
            writeln!(out, "{e}")?;
            print_help(out)?;
            return Ok(FAILURE);
        }
    };
    if args.help {
        print_help(out)?;
        return Ok(FAILURE);
    }
    if args.version {
        print_version(out)?;
        return Ok(FAILURE);
    }
    let Some(table_path) = args.table.filter(|p| !p.as_os_str().is_empty()) else {
        print_help(out)?;
        return Ok(FAILURE);
    };
    if args.dbase_mode && args.xbase_mode {
        writeln!(out, "Options -c and -x are mutually exclusive.  Select only one.")?;
        writeln!(out)?;
        print_help(out)?;
        return Ok(FAILURE);
    }

    let mode = if args.xbase_mode {
        IndexMode::HaltOnDupKey
    } else {
        IndexMode::EmulateDbase
    };
    if args.dbase_mode || args.xbase_mode {
        writeln!(out, "Ix Mode:  [{}]", mode.label())?;
    }

    let mut table = match Table::open(&table_path, Config::default().index_mode(mode)) {
        Ok(table) => table,
        Err(e) => {
            writeln!(
                out,
                "Could not open file iRc = {} file = {}",
                e.code().value(),
                table_path.display()
            )?;
            report(out, &e)?;
            return Ok(FAILURE);
        }
    };

    let scope = match args.ndx.as_deref().filter(|n| !n.is_empty()) {
        None => ReindexScope::All,
        Some(ndx) => {
            if !ndx.to_ascii_uppercase().ends_with(".NDX") {
                writeln!(out)?;
                writeln!(out, "Error with NDX index file.")?;
                writeln!(out, "File name must end with .NDX")?;
                return Ok(FAILURE);
            }
            let tag_name = ndx_tag_name(ndx);
            writeln!(out, "NDX file name = [{ndx}] Tag Name = [{tag_name}]")?;
            let handle = match table.tag_by_name(&tag_name) {
                Ok(handle) => handle,
                Err(_) => match open_ndx(&mut table, ndx) {
                    Ok(handle) => handle,
                    Err(e) => {
                        writeln!(out, "Error opening index file {ndx}")?;
                        report(out, &e)?;
                        return Ok(FAILURE);
                    }
                },
            };
            ReindexScope::Tag(handle)
        }
    };

    if let Err(e) = table.reindex(scope) {
        writeln!(out)?;
        writeln!(out, "Error reindexing DBF database ==> {}", table_path.display())?;
        writeln!(out, " Return Code = {}", e.code().value())?;
        report(out, &e)?;
        return Ok(FAILURE);
    }
    if let Err(e) = table.close() {
        report(out, &e)?;
        return Ok(FAILURE);
    }

    writeln!(out)?;
    writeln!(out, "Reindex complete...")?;
    writeln!(out)?;
    Ok(SUCCESS)
}
