//! # xbase testkit
//!
//! Test utilities for the xbase-rs table engine.
//!
//! This crate provides:
//! - Table fixtures in temporary directories
//! - Property-based test generators using proptest
//! - SHA-256 digests of table and index files for byte-identity checks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xbase_testkit::prelude::*;
//!
//! #[test]
//! fn amounts_are_ordered() {
//!     let mut t = scenarios::amount_table(&[10.0, 20.0, 30.0]);
//!     assert_eq!(t.record_count(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod digest;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::digest::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use digest::*;
pub use fixtures::*;
pub use generators::*;
