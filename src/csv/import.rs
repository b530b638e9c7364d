use std::fmt::Display;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    backend::{
        Backend,
        schema::Column,
        types::{DataType, Row, Value},
    },
    csv::{
        CommitMode, DEFAULT_MAX_FIELD_BYTES, Format, HeaderMode,
        commit::CommitController,
        mapping::ColumnMapping,
        source::{ByteSource, SliceSource},
        tokenizer::{Field, Line, Sink, Tokenizer},
    },
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub commit_mode: CommitMode,
    pub header_mode: HeaderMode,
    pub format: Format,
    /// Largest field accepted before the import is stopped
    pub max_field_bytes: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::LineCommit,
            header_mode: HeaderMode::UseHeader,
            format: Format::default(),
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
        }
    }
}

/// Counters of a finished import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    /// Data lines seen, header excluded
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// One entry per failed line, in input order
    pub failures: Vec<LineFailure>,
}

/// Why a data line was not imported
#[derive(Debug, Clone, PartialEq)]
pub struct LineFailure {
    pub line: u64,
    /// Input field position, when a single field was at fault
    pub field: Option<usize>,
    pub column: Option<String>,
    /// Stream offset where the failing field or line ended
    pub offset: u64,
    pub message: String,
}

impl LineFailure {
    pub fn new(line: &Line, message: String) -> Self {
        Self {
            line: line.line,
            field: None,
            column: None,
            offset: line.offset,
            message,
        }
    }

    fn at_field(field: &Field<'_>, column: &Column, message: String) -> Self {
        Self {
            line: field.line,
            field: Some(field.index),
            column: Some(column.name.clone()),
            offset: field.offset,
            message,
        }
    }
}

impl Display for LineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}", self.line)?;
        if let Some(field) = self.field {
            write!(f, ", field {}", field)?;
        }
        if let Some(column) = &self.column {
            write!(f, " (column {})", column)?;
        }
        write!(f, ", byte {}: {}", self.offset, self.message)
    }
}

/// Imports delimited text from `source` into `table`
///
/// Fatal errors (I/O, oversize field, unmappable header, FILE_COMMIT line
/// failure) stop the import and abort any open transaction. Rows committed
/// earlier under LINE_COMMIT stay committed.
pub fn import<B, S>(
    backend: &mut B,
    table: &str,
    source: &mut S,
    options: &ImportOptions,
) -> Result<ImportOutcome>
where
    B: Backend + ?Sized,
    S: ByteSource + ?Sized,
{
    let tokenizer = Tokenizer::new(options.format.clone(), options.max_field_bytes)?;
    let columns = backend.columns(table)?;
    let mut importer = Importer::new(backend, table, options, columns);

    let stats = match tokenizer.run(source, &mut importer) {
        Ok(stats) => stats,
        Err(err) => {
            error!(table = %table, "import stopped: {}", err);
            return Err(err);
        }
    };
    let outcome = importer.finish()?;
    info!(
        table = %table,
        lines = stats.lines,
        bytes = stats.bytes,
        attempted = outcome.attempted,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "import finished"
    );
    Ok(outcome)
}

/// Imports from an in-memory buffer
pub fn import_slice<B: Backend + ?Sized>(
    backend: &mut B,
    table: &str,
    data: &[u8],
    options: &ImportOptions,
) -> Result<ImportOutcome> {
    import(backend, table, &mut SliceSource::new(data), options)
}

enum Mapping {
    /// Collecting column names from the header line
    Header {
        columns: Vec<Column>,
        names: Vec<String>,
    },
    Resolved(ColumnMapping),
}

/// Builds rows from tokenizer events and hands them to the commit controller
///
/// Dropping the importer aborts a transaction that is still open.
struct Importer<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    table: &'a str,
    header_mode: HeaderMode,
    mapping: Mapping,
    row: Row,
    failure: Option<LineFailure>,
    controller: CommitController,
}

impl<'a, B: Backend + ?Sized> Importer<'a, B> {
    fn new(
        backend: &'a mut B,
        table: &'a str,
        options: &ImportOptions,
        columns: Vec<Column>,
    ) -> Self {
        let row = vec![Value::Null; columns.len()];
        let mapping = match options.header_mode {
            HeaderMode::UseHeader => Mapping::Header {
                columns,
                names: Vec::new(),
            },
            HeaderMode::NoHeader | HeaderMode::IgnoreHeader => {
                Mapping::Resolved(ColumnMapping::natural(columns))
            }
        };
        Self {
            backend,
            table,
            header_mode: options.header_mode,
            mapping,
            row,
            failure: None,
            controller: CommitController::new(options.commit_mode),
        }
    }

    fn is_header(&self, line: u64) -> bool {
        line == 0 && self.header_mode != HeaderMode::NoHeader
    }

    fn finish(mut self) -> Result<ImportOutcome> {
        self.controller.finish(&mut *self.backend)?;
        Ok(ImportOutcome {
            attempted: self.controller.attempted(),
            succeeded: self.controller.succeeded(),
            failed: self.controller.failed(),
            failures: self.controller.take_failures(),
        })
    }
}

impl<'a, B: Backend + ?Sized> Sink for Importer<'a, B> {
    fn on_field(&mut self, field: &Field<'_>) -> Result<()> {
        if self.is_header(field.line) {
            if let Mapping::Header { names, .. } = &mut self.mapping {
                let name = field.value.to_str().map_err(|err| {
                    Error::Mapping(format!("header field {} is not UTF-8: {}", field.index, err))
                })?;
                names.push(name.to_string());
            }
            return Ok(());
        }
        // The rest of a failed line is not looked at.
        if self.failure.is_some() {
            return Ok(());
        }

        let Mapping::Resolved(mapping) = &self.mapping else {
            return Err(Error::Internal("column mapping is not resolved".to_string()));
        };
        let Some((pos, column)) = mapping.target(field.index) else {
            debug!(
                line = field.line,
                field = field.index,
                "ignoring field beyond the mapped columns"
            );
            return Ok(());
        };

        let value = if field.value.is_empty()
            && column.nullable
            && (!field.quoted || column.datatype != DataType::String)
        {
            debug!(line = field.line, field = field.index, "{} = NULL", column.name);
            Ok(Value::Null)
        } else {
            match field.value.to_str() {
                Ok(text) => self.backend.coerce(column, text),
                Err(err) => Err(Error::Parse(format!("invalid UTF-8: {}", err))),
            }
        };
        match value {
            Ok(value) => self.row[pos] = value,
            Err(err) => {
                self.failure = Some(LineFailure::at_field(field, column, err.to_string()));
            }
        }
        Ok(())
    }

    fn on_line(&mut self, line: &Line) -> Result<()> {
        if self.is_header(line.line) {
            if let Mapping::Header { columns, names } = &mut self.mapping {
                let mapping =
                    ColumnMapping::from_header(&*self.backend, std::mem::take(columns), names)?;
                debug!(table = %self.table, fields = mapping.len(), "header mapped");
                self.mapping = Mapping::Resolved(mapping);
            }
            return Ok(());
        }

        let failure = self.failure.take();
        let result =
            self.controller
                .line(&mut *self.backend, self.table, line, &self.row, failure);
        for value in self.row.iter_mut() {
            *value = Value::Null;
        }
        result
    }
}

impl<'a, B: Backend + ?Sized> Drop for Importer<'a, B> {
    fn drop(&mut self) {
        self.controller.release(&mut *self.backend);
    }
}
