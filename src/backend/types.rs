use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Column type tags understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::String => write!(f, "STRING"),
        }
    }
}

/// Typed column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Converts field text into a value of the given type.
    ///
    /// Booleans accept `true`/`false` in any case as well as `1`/`0`.
    /// Numbers go through the standard library parsers, so surrounding
    /// whitespace is rejected.
    pub fn parse(datatype: DataType, text: &str) -> Result<Self> {
        Ok(match datatype {
            DataType::Boolean => match text {
                "1" => Self::Boolean(true),
                "0" => Self::Boolean(false),
                t if t.eq_ignore_ascii_case("true") => Self::Boolean(true),
                t if t.eq_ignore_ascii_case("false") => Self::Boolean(false),
                t => return Err(Error::Parse(format!("invalid boolean {:?}", t))),
            },
            DataType::Integer => Self::Integer(text.parse()?),
            DataType::Float => Self::Float(text.parse()?),
            DataType::String => Self::String(text.to_string()),
        })
    }

    /// Returns the data type of the value, or None if it's Null
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::String(_) => Some(DataType::String),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) if *b => write!(f, "TRUE"),
            Value::Boolean(_) => write!(f, "FALSE"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

/// Orders values of the same type; NULL sorts first
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (_, _) => None,
        }
    }
}

/// A row is a vector of values, one per table column
pub type Row = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::{DataType, Value};
    use crate::error::{Error, Result};

    #[test]
    fn test_parse() -> Result<()> {
        assert_eq!(Value::parse(DataType::Integer, "-42")?, Value::Integer(-42));
        assert_eq!(Value::parse(DataType::Float, "1.243")?, Value::Float(1.243));
        assert_eq!(Value::parse(DataType::Boolean, "True")?, Value::Boolean(true));
        assert_eq!(Value::parse(DataType::Boolean, "0")?, Value::Boolean(false));
        assert_eq!(
            Value::parse(DataType::String, " padded ")?,
            Value::String(" padded ".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_parse_rejects() {
        assert!(matches!(Value::parse(DataType::Integer, "abc"), Err(Error::Parse(_))));
        assert!(matches!(Value::parse(DataType::Integer, " 1"), Err(Error::Parse(_))));
        assert!(matches!(Value::parse(DataType::Integer, ""), Err(Error::Parse(_))));
        assert!(matches!(Value::parse(DataType::Boolean, "yes"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_display_parses_back() -> Result<()> {
        for value in [
            Value::Integer(i64::MIN),
            Value::Float(0.1),
            Value::Float(-3.0),
            Value::Boolean(false),
        ] {
            let datatype = value.datatype().expect("typed value");
            assert_eq!(Value::parse(datatype, &value.to_string())?, value);
        }
        Ok(())
    }
}
