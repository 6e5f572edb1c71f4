//! Benchmark support for the xbase table engine.

#![warn(missing_docs)]

pub mod utils;
