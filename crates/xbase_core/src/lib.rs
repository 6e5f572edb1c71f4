//! # xbase core
//!
//! dBASE-compatible table engine: DBF record manager, NDX/MDX/TDX B-tree
//! indices, DBT memo files and a multi-user lock manager.
//!
//! This crate provides:
//! - [`Table`]: create, open, navigate and update DBF tables through a
//!   dual record buffer with commit and abort
//! - Index maintenance on every update, duplicate-key policy per
//!   [`IndexMode`], reindex and integrity checks
//! - Table, header, append, record, memo and index locks on OS file locks
//! - A built-in [`ExpressionProvider`] for field-based keys and simple
//!   filters
//!
//! All settings travel in a [`Config`] handed to [`Table::create`] and
//! [`Table::open`]. Every fallible call returns [`XbResult`]; the numeric
//! xBase code of an error is [`XbError::code`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use xbase_core::{Config, FieldSpec, IndexKind, Lookup, TableVersion, Table, TagDef};
//!
//! let fields = [FieldSpec::char("NAME", 5), FieldSpec::numeric("AMOUNT", 9, 2)];
//! let mut table = Table::create(path, &fields, TableVersion::V4, false, Config::default())?;
//! table.create_tag(IndexKind::Mdx, &TagDef::new("AMOUNT", "AMOUNT"), false)?;
//! for amount in [10.0, 20.0, 30.0] {
//!     table.blank_record()?;
//!     table.put_double("AMOUNT", amount)?;
//!     table.append_record()?;
//! }
//! assert_eq!(table.find_key_str("25")?, Lookup::NotFound);
//! table.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
mod date;
pub mod dbf;
mod error;
pub mod expr;
pub mod index;
pub mod inf;
pub mod lock;
pub mod memo;
mod schema;

pub use config::{Config, IndexMode, NodePolicy, MAX_MDX_BLOCK_SIZE, MIN_MDX_BLOCK_SIZE};
pub use date::Date;
pub use dbf::{
    AutoCommit, DeleteAllOption, FieldRef, Nav, Scope, Table, TableFormat, TableHeader,
    TableStatus, TableVersion,
};
pub use error::{ErrorCode, XbError, XbResult};
pub use expr::{ExpressionProvider, KeyType, KeyValue, RecordView, SimpleExpressions};
pub use index::{
    IndexId, IndexKind, IntegrityOutput, IntegrityReport, Lookup, ReindexScope, Tag, TagDef,
    TagHandle, TagId,
};
pub use lock::{LockFlavor, LockOption, LockResource};
pub use schema::{field_no, FieldDesc, FieldSpec, FieldType, MAX_FIELD_NAME_LEN};

/// Crate version, as reported by the command-line tools.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
