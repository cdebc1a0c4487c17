use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure to read, create or rewrite a table file.
///
/// A missing file is never reported through this type by [`crate::read`];
/// it is an empty table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("field `{field}` does not exist in {path}")]
    UnknownKeyField { path: PathBuf, field: String },
}

impl TableError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// A recoverable problem with a single field of a single row.
///
/// Field writes never fail the whole row: the field is skipped (unknown
/// name) or written shortened (too long), and the caller gets one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldWarning {
    /// The table has no column with this name; the value was not written.
    UnknownField { field: String, value: String },
    /// The value did not fit the column and was cut to `width` bytes.
    Truncated {
        field: String,
        width: usize,
        length: usize,
    },
}

impl FieldWarning {
    pub fn field(&self) -> &str {
        match self {
            Self::UnknownField { field, .. } | Self::Truncated { field, .. } => field,
        }
    }
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField { field, value } => {
                write!(f, "field {field} not in table schema, dropped value {value:?}")
            }
            Self::Truncated {
                field,
                width,
                length,
            } => write!(f, "field {field} truncated from {length} to {width} bytes"),
        }
    }
}
