//! Database backend seam
//!
//! The import/export code only talks to storage through [`Backend`] and
//! [`Cursor`]: catalog lookups, one transaction at a time, row inserts,
//! text coercion and forward scans. [`memory::MemoryBackend`] is the
//! in-process implementation.

use crate::error::{Error, Result};

pub mod memory;
pub mod schema;
pub mod types;

use schema::Column;
use types::{Row, Value};

/// Table-level operations consumed by the importer and exporter
///
/// Transactions are never nested: `begin` while one is active is an error.
/// A failing mutating call leaves its error in [`Backend::last_error`]
/// until [`Backend::clear_error`] is called.
pub trait Backend {
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    /// Returns the table's columns in declaration order
    fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Resolves a column name to its position in `columns`
    fn column_position(&self, columns: &[Column], name: &str) -> Option<usize> {
        columns.iter().position(|c| c.name == name)
    }

    /// Opens a forward cursor over all rows of a table
    fn open_cursor(&self, table: &str) -> Result<Self::Cursor<'_>>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn abort(&mut self) -> Result<()>;

    /// Converts field text into a value for the given column
    fn coerce(&mut self, column: &Column, text: &str) -> Result<Value>;

    /// Inserts a row whose values are ordered by column position
    fn insert(&mut self, table: &str, row: &Row) -> Result<()>;

    fn last_error(&self) -> Option<&Error>;
    fn clear_error(&mut self);
}

/// Forward-only cursor over table rows
pub trait Cursor {
    fn columns(&self) -> &[Column];

    /// Advances to the next row. Returns false once the scan is exhausted.
    fn fetch(&mut self) -> Result<bool>;

    /// Whether a field of the current row is NULL
    fn is_null(&self, field: usize) -> Result<bool>;

    /// Writes a field of the current row as text into `buf`, replacing its
    /// contents. Fails if the text would exceed `max_len` bytes.
    fn read_text(&self, field: usize, max_len: usize, buf: &mut String) -> Result<()>;
}
