use std::{
    collections::{BTreeMap, btree_map},
    fmt::Write,
    ops::Bound,
};

use serde::{Deserialize, Serialize};

use crate::{
    backend::{
        Backend, Cursor,
        schema::{Column, Table},
        types::{Row, Value},
    },
    error::{Error, Result},
};

/// In-memory backend
///
/// Catalog entries and rows live in one ordered byte map, both encoded with
/// bincode: `Key::Table(name)` holds the table schema and
/// `Key::Row(name, primary_key)` holds a row. Writes made inside a
/// transaction are recorded in an undo list so `abort` can restore the map.
pub struct MemoryBackend {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    txn: Option<Vec<Undo>>,
    last_error: Option<Error>,
}

/// Previous state of a key written by the active transaction
struct Undo {
    key: Vec<u8>,
    previous: Option<Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            txn: None,
            last_error: None,
        }
    }

    /// Creates a table. Schema changes are applied immediately, outside
    /// any transaction.
    pub fn create_table(&mut self, table: Table) -> Result<()> {
        let result = self.create_table_inner(table);
        self.record(result)
    }

    fn create_table_inner(&mut self, table: Table) -> Result<()> {
        table.validate()?;
        if self.get_table(&table.name)?.is_some() {
            return Err(Error::Value(format!(
                "table {} already exists",
                table.name
            )));
        }
        let key = Key::Table(table.name.clone()).encode()?;
        self.data.insert(key, bincode::serialize(&table)?);
        Ok(())
    }

    pub fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        let key = Key::Table(table_name.to_string()).encode()?;
        Ok(self
            .data
            .get(&key)
            .map(|v| bincode::deserialize(v))
            .transpose()?)
    }

    /// Returns table info, returns error if table doesn't exist
    pub fn must_get_table(&self, table_name: &str) -> Result<Table> {
        self.get_table(table_name)?.ok_or(Error::Internal(format!(
            "table {} does not exist",
            table_name
        )))
    }

    /// Reads every committed or pending row of a table
    pub fn scan(&self, table_name: &str) -> Result<Vec<Row>> {
        self.must_get_table(table_name)?;
        let prefix = KeyPrefix::Row(table_name.to_string()).encode()?;
        self.data
            .range(prefix_range(prefix))
            .map(|(_, v)| Ok(bincode::deserialize(v)?))
            .collect()
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    fn insert_inner(&mut self, table_name: &str, row: &Row) -> Result<()> {
        if self.txn.is_none() {
            return Err(Error::Internal(format!(
                "insert into {} outside a transaction",
                table_name
            )));
        }
        let table = self.must_get_table(table_name)?;
        table.check_row(row)?;

        let id = table.get_primary_key(row)?;
        let key = Key::Row(table.name.clone(), id.clone()).encode()?;
        if self.data.contains_key(&key) {
            return Err(Error::Value(format!(
                "duplicate primary key {} in table {}",
                id, table.name
            )));
        }
        let value = bincode::serialize(row)?;
        self.write(key, value);
        Ok(())
    }

    fn write(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let previous = self.data.insert(key.clone(), value);
        if let Some(undo) = self.txn.as_mut() {
            undo.push(Undo { key, previous });
        }
    }
}

impl Backend for MemoryBackend {
    type Cursor<'a> = MemoryCursor<'a>;

    fn columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(self.must_get_table(table)?.columns)
    }

    fn open_cursor(&self, table: &str) -> Result<Self::Cursor<'_>> {
        let table = self.must_get_table(table)?;
        let prefix = KeyPrefix::Row(table.name.clone()).encode()?;
        Ok(MemoryCursor {
            columns: table.columns,
            inner: self.data.range(prefix_range(prefix)),
            current: None,
        })
    }

    fn begin(&mut self) -> Result<()> {
        let result = match self.txn {
            Some(_) => Err(Error::Internal("transaction already active".to_string())),
            None => {
                self.txn = Some(Vec::new());
                Ok(())
            }
        };
        self.record(result)
    }

    fn commit(&mut self) -> Result<()> {
        let result = match self.txn.take() {
            Some(_) => Ok(()),
            None => Err(Error::Internal("no active transaction to commit".to_string())),
        };
        self.record(result)
    }

    fn abort(&mut self) -> Result<()> {
        let Some(undo) = self.txn.take() else {
            return self.record(Err(Error::Internal(
                "no active transaction to abort".to_string(),
            )));
        };
        for Undo { key, previous } in undo.into_iter().rev() {
            match previous {
                Some(value) => self.data.insert(key, value),
                None => self.data.remove(&key),
            };
        }
        Ok(())
    }

    fn coerce(&mut self, column: &Column, text: &str) -> Result<Value> {
        let result = Value::parse(column.datatype, text)
            .map_err(|err| match err {
                Error::Parse(msg) => Error::Parse(format!("column {}: {}", column.name, msg)),
                other => other,
            })
            .and_then(|value| column.check_length(&value).map(|_| value));
        self.record(result)
    }

    fn insert(&mut self, table: &str, row: &Row) -> Result<()> {
        let result = self.insert_inner(table, row);
        self.record(result)
    }

    fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    fn clear_error(&mut self) {
        self.last_error = None;
    }
}

/// Cursor over the rows of one table, in key order
pub struct MemoryCursor<'a> {
    columns: Vec<Column>,
    inner: btree_map::Range<'a, Vec<u8>, Vec<u8>>,
    current: Option<Row>,
}

impl<'a> MemoryCursor<'a> {
    fn value(&self, field: usize) -> Result<&Value> {
        self.current
            .as_ref()
            .ok_or(Error::Internal("cursor is not on a row".to_string()))?
            .get(field)
            .ok_or(Error::Internal(format!("row has no field {}", field)))
    }
}

impl<'a> Cursor for MemoryCursor<'a> {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn fetch(&mut self) -> Result<bool> {
        self.current = match self.inner.next() {
            Some((_, value)) => Some(bincode::deserialize(value)?),
            None => None,
        };
        Ok(self.current.is_some())
    }

    fn is_null(&self, field: usize) -> Result<bool> {
        Ok(self.value(field)?.is_null())
    }

    fn read_text(&self, field: usize, max_len: usize, buf: &mut String) -> Result<()> {
        buf.clear();
        match self.value(field)? {
            Value::Null => {}
            Value::String(s) => buf.push_str(s),
            value => write!(buf, "{}", value)
                .map_err(|err| Error::Internal(err.to_string()))?,
        }
        if buf.len() > max_len {
            return Err(Error::Value(format!(
                "field {} is {} bytes, limit is {}",
                field,
                buf.len(),
                max_len
            )));
        }
        Ok(())
    }
}

/// Key types for the byte map
#[derive(Debug, Serialize, Deserialize)]
enum Key {
    Table(String),
    Row(String, Value),
}

impl Key {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Key prefix types for prefix scanning
///
/// In bincode, enums are serialized as [variant_index][variant_data...],
/// and strings carry a length prefix, so `Row(name)` is a prefix of every
/// `Key::Row(name, _)` and of nothing else.
#[derive(Debug, Serialize, Deserialize)]
enum KeyPrefix {
    #[allow(dead_code)]
    Table,
    Row(String),
}

impl KeyPrefix {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Converts a prefix to the range of keys starting with it, e.g. prefix
/// "apple" becomes ["apple", "applf").
fn prefix_range(prefix: Vec<u8>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let mut end = prefix.clone();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return (Bound::Included(prefix), Bound::Excluded(end));
        }
    }
    (Bound::Included(prefix), Bound::Unbounded)
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use crate::{
        backend::{
            Backend, Cursor,
            schema::{Column, Table},
            types::{DataType, Value},
        },
        error::{Error, Result},
    };

    fn backend() -> Result<MemoryBackend> {
        let mut backend = MemoryBackend::new();
        backend.create_table(Table::new(
            "people",
            vec![
                Column::new("id", DataType::Integer).primary_key(),
                Column::new("name", DataType::String).max_length(8),
                Column::new("score", DataType::Float),
            ],
        ))?;
        backend.create_table(Table::new(
            "pets",
            vec![Column::new("id", DataType::Integer).primary_key()],
        ))?;
        Ok(backend)
    }

    fn person(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Integer(id), Value::String(name.into()), Value::Null]
    }

    #[test]
    fn test_create_table() -> Result<()> {
        let mut backend = backend()?;
        assert_eq!(backend.columns("people")?.len(), 3);
        assert!(backend.get_table("nope")?.is_none());
        assert!(backend.columns("nope").is_err());

        let err = backend.create_table(Table::new(
            "pets",
            vec![Column::new("id", DataType::Integer).primary_key()],
        ));
        assert!(matches!(err, Err(Error::Value(_))));
        assert!(backend.last_error().is_some());
        Ok(())
    }

    #[test]
    fn test_commit_and_abort() -> Result<()> {
        let mut backend = backend()?;
        assert!(backend.insert("people", &person(1, "a")).is_err());

        backend.begin()?;
        assert!(backend.begin().is_err());
        backend.insert("people", &person(1, "a"))?;
        backend.commit()?;

        backend.begin()?;
        backend.insert("people", &person(2, "b"))?;
        backend.insert("people", &person(3, "c"))?;
        backend.insert("pets", &vec![Value::Integer(1)])?;
        backend.abort()?;

        assert_eq!(backend.scan("people")?, vec![person(1, "a")]);
        assert!(backend.scan("pets")?.is_empty());
        assert!(!backend.in_transaction());
        assert!(backend.commit().is_err());
        Ok(())
    }

    #[test]
    fn test_insert_checks() -> Result<()> {
        let mut backend = backend()?;
        backend.begin()?;
        backend.insert("people", &person(1, "a"))?;

        let dup = backend.insert("people", &person(1, "b"));
        assert!(matches!(dup, Err(Error::Value(_))));
        assert_eq!(backend.last_error(), dup.as_ref().err());

        backend.clear_error();
        assert!(backend.last_error().is_none());

        let null_key = vec![Value::Null, Value::Null, Value::Null];
        assert!(backend.insert("people", &null_key).is_err());
        backend.commit()?;
        assert_eq!(backend.scan("people")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_coerce() -> Result<()> {
        let mut backend = backend()?;
        let columns = backend.columns("people")?;

        assert_eq!(backend.coerce(&columns[0], "12")?, Value::Integer(12));
        assert_eq!(backend.coerce(&columns[2], "2.5")?, Value::Float(2.5));
        assert!(backend.last_error().is_none());

        assert!(matches!(backend.coerce(&columns[0], "x"), Err(Error::Parse(_))));
        assert!(backend.last_error().is_some());
        backend.clear_error();

        assert!(matches!(
            backend.coerce(&columns[1], "much too long"),
            Err(Error::Value(_))
        ));
        Ok(())
    }

    #[test]
    fn test_cursor() -> Result<()> {
        let mut backend = backend()?;
        backend.begin()?;
        backend.insert("people", &person(2, "bo"))?;
        backend.insert(
            "people",
            &vec![Value::Integer(1), Value::String("al".into()), Value::Float(0.5)],
        )?;
        backend.insert("pets", &vec![Value::Integer(9)])?;
        backend.commit()?;

        let mut cursor = backend.open_cursor("people")?;
        assert_eq!(cursor.columns().len(), 3);
        let mut text = String::new();
        let mut seen = Vec::new();
        while cursor.fetch()? {
            cursor.read_text(0, 16, &mut text)?;
            seen.push((text.clone(), cursor.is_null(2)?));
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![("1".to_string(), false), ("2".to_string(), true)]
        );
        assert!(!cursor.fetch()?);
        assert!(cursor.is_null(0).is_err());
        Ok(())
    }

    #[test]
    fn test_read_text_limit() -> Result<()> {
        let mut backend = backend()?;
        backend.begin()?;
        backend.insert("people", &person(1, "abcdef"))?;
        backend.commit()?;

        let mut cursor = backend.open_cursor("people")?;
        let mut text = String::new();
        assert!(cursor.fetch()?);
        cursor.read_text(1, 6, &mut text)?;
        assert_eq!(text, "abcdef");
        assert!(cursor.read_text(1, 5, &mut text).is_err());
        Ok(())
    }
}
