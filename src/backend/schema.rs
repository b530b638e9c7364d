use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    backend::types::{DataType, Row, Value},
    error::{Error, Result},
};

/// Table schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }

    /// Validates table schema
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Value(format!(
                "table {} has no columns",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for column in &self.columns {
            if !names.insert(column.name.as_str()) {
                return Err(Error::Value(format!(
                    "duplicate column {} in table {}",
                    column.name, self.name
                )));
            }
        }

        match self.columns.iter().filter(|c| c.primary_key).count() {
            1 => {}
            0 => {
                return Err(Error::Value(format!(
                    "No primary key for table {}",
                    self.name
                )))
            }
            _ => {
                return Err(Error::Value(format!(
                    "Multiple primary keys for table {}",
                    self.name
                )))
            }
        }

        if self.columns.iter().any(|c| c.primary_key && c.nullable) {
            return Err(Error::Value(format!(
                "primary key of table {} cannot be nullable",
                self.name
            )));
        }

        Ok(())
    }

    /// Extracts primary key value from a row
    pub fn get_primary_key(&self, row: &Row) -> Result<Value> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.primary_key)
            .ok_or(Error::Internal(format!(
                "No primary key for table {}",
                self.name
            )))?;
        row.get(pos)
            .cloned()
            .ok_or(Error::Internal(format!("row has no column {}", pos)))
    }

    /// Checks a row against the column definitions before it is stored
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Value(format!(
                "table {} expects {} values, got {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        for (col, value) in self.columns.iter().zip(row) {
            match value.datatype() {
                None if col.nullable => {}
                None => {
                    return Err(Error::Value(format!(
                        "column {} cannot be null",
                        col.name
                    )))
                }
                Some(dt) if dt != col.datatype => {
                    return Err(Error::Value(format!(
                        "column {} type mismatch",
                        col.name
                    )))
                }
                _ => col.check_length(value)?,
            }
        }
        Ok(())
    }
}

/// Column schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    /// Maximum length in bytes for string values
    pub max_length: Option<usize>,
    /// Whether this column is the primary key
    pub primary_key: bool,
}

impl Column {
    /// A nullable column without a length limit
    pub fn new(name: &str, datatype: DataType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            nullable: true,
            max_length: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as primary key, which implies NOT NULL
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Rejects string values longer than the column allows
    pub fn check_length(&self, value: &Value) -> Result<()> {
        match (value, self.max_length) {
            (Value::String(s), Some(max)) if s.len() > max => Err(Error::Value(format!(
                "value for column {} is {} bytes, limit is {}",
                self.name,
                s.len(),
                max
            ))),
            _ => Ok(()),
        }
    }
}
