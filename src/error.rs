use std::{collections::TryReserveError, fmt::Display, str::Utf8Error};

use bincode::ErrorKind;

/// Custom Result type for import/export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for text exchange
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Text could not be converted to a column value
    Parse(String),
    /// Value rejected by the column definition (type, length, nullability, key)
    Value(String),
    /// Reading the input or writing the output failed
    Io(String),
    /// Field buffer could not grow
    OutOfMemory(String),
    /// Header names could not be mapped onto the target table
    Mapping(String),
    /// Invalid format or option combination
    Config(String),
    /// A file-commit import was rolled back because of a failed line
    Aborted { line: u64, message: String },
    /// Requested mode is not available
    Unsupported(String),
    /// Internal error (storage, serialization, etc.)
    Internal(String),
}

impl From<std::num::ParseIntError> for Error {
    fn from(value: std::num::ParseIntError) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(value: std::num::ParseFloatError) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

impl From<TryReserveError> for Error {
    fn from(value: TryReserveError) -> Self {
        Error::OutOfMemory(value.to_string())
    }
}

impl From<Box<ErrorKind>> for Error {
    fn from(value: Box<ErrorKind>) -> Self {
        Error::Internal(value.to_string())
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "parse error {}", err),
            Error::Value(err) => write!(f, "value error {}", err),
            Error::Io(err) => write!(f, "io error {}", err),
            Error::OutOfMemory(err) => write!(f, "out of memory {}", err),
            Error::Mapping(err) => write!(f, "mapping error {}", err),
            Error::Config(err) => write!(f, "config error {}", err),
            Error::Aborted { line, message } => {
                write!(f, "import aborted at line {}: {}", line, message)
            }
            Error::Unsupported(err) => write!(f, "unsupported {}", err),
            Error::Internal(err) => write!(f, "internal error {}", err),
        }
    }
}
