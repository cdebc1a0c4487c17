//! File header and field descriptor array.
//!
//! Layout (little-endian integers):
//! - `[0]` version byte
//! - `[1..4]` last update as `year - 1900`, month, day
//! - `[4..8]` record count, u32
//! - `[8..10]` header length, u16; the first row starts here
//! - `[10..12]` record length, u16, including the deletion byte
//! - `[12..32]` reserved
//!
//! Followed by one 32-byte descriptor per column and a `0x0D` terminator.

use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::TableError;
use crate::schema::{validate_schema, FieldDescriptor, FieldKind, FieldSpec};

pub const HEADER_BYTES: usize = 32;
pub const DESCRIPTOR_BYTES: usize = 32;
pub const DESCRIPTOR_TERMINATOR: u8 = 0x0D;
/// Plain dBase III file without memo.
pub const VERSION_DBASE3: u8 = 0x03;

const NAME_BYTES: usize = 11;
const TYPE_OFFSET: usize = 11;
const LENGTH_OFFSET: usize = 16;
const DECIMALS_OFFSET: usize = 17;

/// The decoded fixed part of a table header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableHeader {
    pub version: u8,
    pub last_update: Option<NaiveDate>,
    pub record_count: u32,
    pub header_len: u16,
    pub record_len: u16,
}

impl TableHeader {
    /// Decode the first 32 bytes of a file.
    pub fn decode(path: &Path, bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.len() < HEADER_BYTES {
            return Err(TableError::malformed(
                path,
                format!(
                    "header too short: expected {HEADER_BYTES} bytes, got {}",
                    bytes.len()
                ),
            ));
        }

        let last_update = NaiveDate::from_ymd_opt(
            1900 + i32::from(bytes[1]),
            u32::from(bytes[2]),
            u32::from(bytes[3]),
        );

        Ok(Self {
            version: bytes[0],
            last_update,
            record_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            header_len: u16::from_le_bytes([bytes[8], bytes[9]]),
            record_len: u16::from_le_bytes([bytes[10], bytes[11]]),
        })
    }

    /// Write the mutable header fields into an existing header block,
    /// leaving the reserved bytes as they were.
    pub fn encode_into(&self, out: &mut [u8]) {
        out[0] = self.version;
        if let Some(date) = self.last_update {
            let (y, m, d) = date_bytes(date);
            out[1] = y;
            out[2] = m;
            out[3] = d;
        }
        out[4..8].copy_from_slice(&self.record_count.to_le_bytes());
        out[8..10].copy_from_slice(&self.header_len.to_le_bytes());
        out[10..12].copy_from_slice(&self.record_len.to_le_bytes());
    }
}

fn date_bytes(date: NaiveDate) -> (u8, u8, u8) {
    let year = u8::try_from((date.year() - 1900).clamp(0, 255)).unwrap_or(u8::MAX);
    // month and day are always < 32
    (year, date.month() as u8, date.day() as u8)
}

/// Decode the descriptor array that starts at byte 32.
pub fn decode_descriptors(
    path: &Path,
    bytes: &[u8],
    header: &TableHeader,
) -> Result<Vec<FieldDescriptor>, TableError> {
    let header_len = usize::from(header.header_len);
    if header_len > bytes.len() {
        return Err(TableError::malformed(
            path,
            format!(
                "header length {header_len} exceeds file size {}",
                bytes.len()
            ),
        ));
    }

    let mut fields = Vec::new();
    let mut offset = 1;
    let mut pos = HEADER_BYTES;

    loop {
        if pos >= header_len {
            return Err(TableError::malformed(
                path,
                "field descriptor array is not terminated",
            ));
        }
        if bytes[pos] == DESCRIPTOR_TERMINATOR {
            break;
        }
        if pos + DESCRIPTOR_BYTES > header_len {
            return Err(TableError::malformed(
                path,
                format!("field descriptor at byte {pos} runs past the header"),
            ));
        }

        let raw = &bytes[pos..pos + DESCRIPTOR_BYTES];
        let name_end = raw[..NAME_BYTES]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_BYTES);
        let name = crate::text::decode(&raw[..name_end]).trim().to_string();
        let width = usize::from(raw[LENGTH_OFFSET]);

        if name.is_empty() {
            return Err(TableError::malformed(
                path,
                format!("field descriptor at byte {pos} has no name"),
            ));
        }

        fields.push(FieldDescriptor {
            name,
            kind: FieldKind::from_code(raw[TYPE_OFFSET]),
            width,
            decimals: raw[DECIMALS_OFFSET],
            offset,
        });

        offset += width;
        pos += DESCRIPTOR_BYTES;
    }

    if fields.is_empty() {
        return Err(TableError::malformed(path, "table declares no fields"));
    }
    if offset != usize::from(header.record_len) {
        return Err(TableError::malformed(
            path,
            format!(
                "record length {} does not match field widths ({offset})",
                header.record_len
            ),
        ));
    }

    Ok(fields)
}

/// Build the complete header block (fixed header, descriptors, terminator)
/// for a new empty table.
pub fn encode_new(
    schema: &[FieldSpec],
    today: NaiveDate,
) -> Result<(Vec<u8>, TableHeader), TableError> {
    validate_schema(schema)?;

    let header_len = HEADER_BYTES + DESCRIPTOR_BYTES * schema.len() + 1;
    let record_len = 1 + schema.iter().map(|f| usize::from(f.width)).sum::<usize>();

    let header = TableHeader {
        version: VERSION_DBASE3,
        last_update: Some(today),
        record_count: 0,
        header_len: u16::try_from(header_len)
            .map_err(|_| TableError::InvalidSchema("too many fields".into()))?,
        record_len: u16::try_from(record_len)
            .map_err(|_| TableError::InvalidSchema("record too wide".into()))?,
    };

    let mut out = vec![0u8; header_len];
    header.encode_into(&mut out[..HEADER_BYTES]);

    for (i, spec) in schema.iter().enumerate() {
        let pos = HEADER_BYTES + i * DESCRIPTOR_BYTES;
        let raw = &mut out[pos..pos + DESCRIPTOR_BYTES];
        raw[..spec.name.len()].copy_from_slice(spec.name.as_bytes());
        raw[TYPE_OFFSET] = spec.kind.code();
        raw[LENGTH_OFFSET] = spec.width;
    }
    out[header_len - 1] = DESCRIPTOR_TERMINATOR;

    Ok((out, header))
}
