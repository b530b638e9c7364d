//! Delimited text import and export
//!
//! This module provides:
//! - `source`: chunked byte sources feeding the tokenizer
//! - `tokenizer`: quote-aware state machine producing field/line events
//! - `mapping`: input field to table column correspondence
//! - `commit`: transaction boundaries for LINE_COMMIT and FILE_COMMIT
//! - `import`: row building on top of the above
//! - `export`: quoted CSV output from a table scan

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod commit;
pub mod export;
pub mod import;
pub mod mapping;
pub mod source;
pub mod tokenizer;

pub use export::{ExportOptions, SourceMode, export, export_to_path};
pub use import::{ImportOptions, ImportOutcome, LineFailure, import, import_slice};

/// Default cap on a single field, in bytes
pub const DEFAULT_MAX_FIELD_BYTES: usize = 16 * 1024 * 1024;

/// Transaction granularity of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    /// Every data line is committed on its own; failed lines are skipped
    LineCommit,
    /// One transaction for the whole input; any failure rolls back everything
    FileCommit,
}

/// Treatment of the first line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderMode {
    /// The first line is data
    NoHeader,
    /// The first line is skipped
    IgnoreHeader,
    /// The first line names the target columns
    UseHeader,
}

/// Byte-level syntax of delimited input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub delimiter: u8,
    pub quote: u8,
    pub eol: Vec<u8>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            eol: b"\r\n".to_vec(),
        }
    }
}

impl Format {
    pub fn validate(&self) -> Result<()> {
        if self.eol.is_empty() {
            return Err(Error::Config("line terminator is empty".to_string()));
        }
        if self.delimiter == self.quote {
            return Err(Error::Config(format!(
                "delimiter and quote are both {:?}",
                self.delimiter as char
            )));
        }
        if self.eol.contains(&self.delimiter) || self.eol.contains(&self.quote) {
            return Err(Error::Config(
                "line terminator overlaps the delimiter or quote".to_string(),
            ));
        }
        Ok(())
    }
}
