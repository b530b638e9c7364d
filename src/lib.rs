//! text-exchange - Streaming delimited text import and export for a table store
//!
//! This crate provides:
//! - A chunk-agnostic, quote-aware CSV tokenizer
//! - Header to column mapping and typed row building
//! - LINE_COMMIT and FILE_COMMIT transaction policies
//! - Quoted CSV and SQL `INSERT` export
//! - A pluggable backend seam with an in-memory implementation

pub mod backend;
pub mod csv;
pub mod error;

pub use error::{Error, Result};
