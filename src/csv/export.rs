use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    backend::{Backend, Cursor},
    csv::{DEFAULT_MAX_FIELD_BYTES, HeaderMode},
    error::{Error, Result},
};

const SEPARATOR: u8 = b',';
const EOL: &[u8] = b"\r\n";

/// Where exported rows come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMode {
    Table,
    /// Rows of a query result. Not supported.
    Sql,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Only `UseHeader` writes a header line
    pub header_mode: HeaderMode,
    pub source_mode: SourceMode,
    pub field_quote: u8,
    /// Written before every data line
    pub line_prefix: String,
    /// Written after every data line, before the line end
    pub line_suffix: String,
    pub max_field_bytes: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            header_mode: HeaderMode::UseHeader,
            source_mode: SourceMode::Table,
            field_quote: b'"',
            line_prefix: String::new(),
            line_suffix: String::new(),
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
        }
    }
}

impl ExportOptions {
    /// One `INSERT` statement per row
    pub fn sql_insert(table: &str) -> Self {
        Self {
            header_mode: HeaderMode::NoHeader,
            field_quote: b'\'',
            line_prefix: format!("INSERT INTO {} VALUES( ", table),
            line_suffix: " );".to_string(),
            ..Self::default()
        }
    }
}

/// Writes every row of `table` to `out`, returning the number of data lines
///
/// Fields are separated by commas and always quoted; lines end with CRLF.
/// A failure mid-scan leaves whatever was already written in `out`.
pub fn export<B, W>(backend: &B, table: &str, out: &mut W, options: &ExportOptions) -> Result<u64>
where
    B: Backend + ?Sized,
    W: Write + ?Sized,
{
    if options.source_mode == SourceMode::Sql {
        return Err(Error::Unsupported("export from a SQL query".to_string()));
    }
    let rows = write_rows(backend, table, out, options).inspect_err(|err| {
        error!(table = %table, "export stopped: {}", err);
    })?;
    info!(table = %table, rows = rows, "export finished");
    Ok(rows)
}

/// Exports into a newly created file, replacing an existing one
pub fn export_to_path<B: Backend + ?Sized>(
    backend: &B,
    table: &str,
    path: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<u64> {
    if options.source_mode == SourceMode::Sql {
        return Err(Error::Unsupported("export from a SQL query".to_string()));
    }
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| {
        Error::Io(format!("unable to create {}: {}", path.display(), err))
    })?;
    let mut out = BufWriter::new(file);
    let rows = export(backend, table, &mut out, options)?;
    out.flush()?;
    Ok(rows)
}

fn write_rows<B, W>(backend: &B, table: &str, out: &mut W, options: &ExportOptions) -> Result<u64>
where
    B: Backend + ?Sized,
    W: Write + ?Sized,
{
    let mut cursor = backend.open_cursor(table)?;
    let quote = options.field_quote;
    let mut line = Vec::new();

    if options.header_mode == HeaderMode::UseHeader {
        for (i, column) in cursor.columns().iter().enumerate() {
            if i > 0 {
                line.push(SEPARATOR);
            }
            push_quoted(&mut line, column.name.as_bytes(), quote);
        }
        line.extend_from_slice(EOL);
        out.write_all(&line)?;
    }

    let width = cursor.columns().len();
    let mut text = String::new();
    let mut rows = 0;
    while cursor.fetch()? {
        line.clear();
        line.extend_from_slice(options.line_prefix.as_bytes());
        for field in 0..width {
            if field > 0 {
                line.push(SEPARATOR);
            }
            if cursor.is_null(field)? {
                text.clear();
            } else {
                cursor.read_text(field, options.max_field_bytes, &mut text)?;
            }
            push_quoted(&mut line, text.as_bytes(), quote);
        }
        line.extend_from_slice(options.line_suffix.as_bytes());
        line.extend_from_slice(EOL);
        out.write_all(&line)?;
        rows += 1;
    }
    Ok(rows)
}

/// Appends `value` wrapped in `quote`, doubling embedded quotes
fn push_quoted(line: &mut Vec<u8>, value: &[u8], quote: u8) {
    line.push(quote);
    for &byte in value {
        if byte == quote {
            line.push(quote);
        }
        line.push(byte);
    }
    line.push(quote);
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{ExportOptions, SourceMode, export, export_to_path};
    use crate::{
        backend::{
            Backend,
            memory::MemoryBackend,
            schema::{Column, Table},
            types::{DataType, Value},
        },
        csv::HeaderMode,
        error::{Error, Result},
    };

    fn setup() -> Result<MemoryBackend> {
        let mut backend = MemoryBackend::new();
        backend.create_table(Table::new(
            "t",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("name", DataType::String),
                Column::new("ok", DataType::Boolean),
            ],
        ))?;
        backend.begin()?;
        backend.insert(
            "t",
            &vec![Value::Integer(1), Value::String("say \"hi\", it's".to_string()), Value::Boolean(true)],
        )?;
        backend.insert("t", &vec![Value::Integer(2), Value::Null, Value::Null])?;
        backend.commit()?;
        Ok(backend)
    }

    fn export_string(backend: &MemoryBackend, options: &ExportOptions) -> Result<String> {
        let mut out = Vec::new();
        export(backend, "t", &mut out, options)?;
        String::from_utf8(out).map_err(|err| Error::Internal(err.to_string()))
    }

    #[test]
    fn test_export() -> Result<()> {
        let backend = setup()?;
        let mut out = Vec::new();
        let rows = export(&backend, "t", &mut out, &ExportOptions::default())?;
        assert_eq!(rows, 2);
        assert_eq!(
            out,
            b"\"id\",\"name\",\"ok\"\r\n\"1\",\"say \"\"hi\"\", it's\",\"TRUE\"\r\n\"2\",\"\",\"\"\r\n"
        );
        Ok(())
    }

    #[test]
    fn test_sql_insert() -> Result<()> {
        let backend = setup()?;
        assert_eq!(
            export_string(&backend, &ExportOptions::sql_insert("t"))?,
            "INSERT INTO t VALUES( '1','say \"hi\", it''s','TRUE' );\r\n\
             INSERT INTO t VALUES( '2','','' );\r\n"
        );
        Ok(())
    }

    #[test]
    fn test_header_modes() -> Result<()> {
        let mut backend = MemoryBackend::new();
        backend.create_table(Table::new(
            "t",
            vec![Column::new("id", DataType::Integer).primary_key()],
        ))?;
        assert_eq!(export_string(&backend, &ExportOptions::default())?, "\"id\"\r\n");
        for header_mode in [HeaderMode::NoHeader, HeaderMode::IgnoreHeader] {
            let options = ExportOptions {
                header_mode,
                ..ExportOptions::default()
            };
            assert_eq!(export_string(&backend, &options)?, "");
        }
        Ok(())
    }

    #[test]
    fn test_unsupported_and_missing() -> Result<()> {
        let backend = setup()?;
        let options = ExportOptions {
            source_mode: SourceMode::Sql,
            ..ExportOptions::default()
        };
        assert!(matches!(export_string(&backend, &options), Err(Error::Unsupported(_))));

        let dir = tempfile::tempdir().map_err(|err| Error::Io(err.to_string()))?;
        let path = dir.path().join("never.csv");
        assert!(export_to_path(&backend, "t", &path, &options).is_err());
        assert!(!path.exists());

        let mut out = Vec::new();
        assert!(export(&backend, "missing", &mut out, &ExportOptions::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_field_limit() -> Result<()> {
        let backend = setup()?;
        let options = ExportOptions {
            max_field_bytes: 4,
            ..ExportOptions::default()
        };
        let mut out = Vec::new();
        assert!(matches!(export(&backend, "t", &mut out, &options), Err(Error::Value(_))));
        // The header made it out before the long field was hit.
        assert!(out.starts_with(b"\"id\""));
        Ok(())
    }

    #[test]
    fn test_export_to_path() -> Result<()> {
        let backend = setup()?;
        let dir = tempfile::tempdir().map_err(|err| Error::Io(err.to_string()))?;
        let path = dir.path().join("t.csv");
        let rows = export_to_path(&backend, "t", &path, &ExportOptions::default())?;
        assert_eq!(rows, 2);
        let written = fs::read_to_string(&path)?;
        assert_eq!(written, export_string(&backend, &ExportOptions::default())?);
        Ok(())
    }
}
