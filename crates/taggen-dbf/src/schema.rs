//! Column definitions
//!
//! [`FieldSpec`] is the static form used to create a table; [`FieldDescriptor`]
//! is what was actually found in a file header, including the byte offset of
//! the column inside a row.

use serde::Serialize;

use crate::error::TableError;

/// Longest column name a descriptor can hold (11 bytes, NUL terminated).
pub const MAX_FIELD_NAME_LEN: usize = 10;

/// Widest character column the one-byte length can describe.
pub const MAX_FIELD_WIDTH: u8 = 254;

/// Column type code as stored in byte 11 of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Character,
    Numeric,
    Float,
    Logical,
    Date,
    Memo,
    Other(u8),
}

impl FieldKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            b'C' => Self::Character,
            b'N' => Self::Numeric,
            b'F' => Self::Float,
            b'L' => Self::Logical,
            b'D' => Self::Date,
            b'M' => Self::Memo,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Character => b'C',
            Self::Numeric => b'N',
            Self::Float => b'F',
            Self::Logical => b'L',
            Self::Date => b'D',
            Self::Memo => b'M',
            Self::Other(code) => code,
        }
    }
}

/// A column in a fixed per-family schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub width: u8,
}

impl FieldSpec {
    /// Fixed-width character column, the only kind this system creates.
    pub const fn character(name: &'static str, width: u8) -> Self {
        Self {
            name,
            kind: FieldKind::Character,
            width,
        }
    }
}

/// Check that a schema can be laid out as a table header.
pub fn validate_schema(schema: &[FieldSpec]) -> Result<(), TableError> {
    if schema.is_empty() {
        return Err(TableError::InvalidSchema("schema has no fields".into()));
    }

    let mut seen = std::collections::HashSet::new();
    for spec in schema {
        if spec.name.is_empty() || spec.name.len() > MAX_FIELD_NAME_LEN || !spec.name.is_ascii() {
            return Err(TableError::InvalidSchema(format!(
                "field name {:?} must be 1..={} ASCII characters",
                spec.name, MAX_FIELD_NAME_LEN
            )));
        }
        if spec.width == 0 || spec.width > MAX_FIELD_WIDTH {
            return Err(TableError::InvalidSchema(format!(
                "field {} has width {}, expected 1..={}",
                spec.name, spec.width, MAX_FIELD_WIDTH
            )));
        }
        if !seen.insert(spec.name) {
            return Err(TableError::InvalidSchema(format!(
                "field {} declared twice",
                spec.name
            )));
        }
    }

    Ok(())
}

/// A column as laid out in an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub width: usize,
    pub decimals: u8,
    /// Byte offset inside a row; the deletion marker occupies offset 0.
    pub offset: usize,
}

impl FieldDescriptor {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.width
    }
}
