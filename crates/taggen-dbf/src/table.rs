//! In-memory table with in-place row mutation.
//!
//! The whole file is loaded, rows are edited as raw fixed-width byte blocks,
//! and [`Table::save`] writes everything back through a temp file in the same
//! directory. Header bytes this module does not own (reserved header bytes,
//! descriptor padding, anything between the terminator and the first row)
//! are carried over untouched.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{FieldWarning, TableError};
use crate::header::{self, TableHeader, HEADER_BYTES};
use crate::schema::{FieldDescriptor, FieldSpec};
use crate::text;

/// Field name to trimmed value.
pub type Row = BTreeMap<String, String>;

/// First byte of a live row.
pub const LIVE_MARKER: u8 = b' ';
/// First byte of a logically deleted row.
pub const DELETED_MARKER: u8 = b'*';
/// Written after the last row.
pub const EOF_MARKER: u8 = 0x1A;

/// Result of setting fields on the rows matching a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Number of live rows that matched the key.
    pub rows: usize,
    pub warnings: Vec<FieldWarning>,
}

#[derive(Debug, Clone)]
pub struct Table {
    path: PathBuf,
    header: TableHeader,
    prologue: Vec<u8>,
    fields: Vec<FieldDescriptor>,
    records: Vec<Vec<u8>>,
}

impl Table {
    /// Load an existing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| TableError::io(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    /// Decode a table image that came from `path`.
    pub fn from_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> Result<Self, TableError> {
        let path = path.as_ref();
        let header = TableHeader::decode(path, bytes)?;
        let fields = header::decode_descriptors(path, bytes, &header)?;

        let header_len = usize::from(header.header_len);
        let record_len = usize::from(header.record_len);
        let count = header.record_count as usize;
        let data_end = header_len + count * record_len;

        if data_end > bytes.len() {
            return Err(TableError::malformed(
                path,
                format!(
                    "header declares {count} rows of {record_len} bytes but file has {} data bytes",
                    bytes.len().saturating_sub(header_len)
                ),
            ));
        }

        let records = bytes[header_len..data_end]
            .chunks_exact(record_len)
            .map(<[u8]>::to_vec)
            .collect();

        debug!(
            "Opened {:?}: {} fields, {} rows",
            path,
            fields.len(),
            count
        );

        Ok(Self {
            path: path.to_path_buf(),
            header,
            prologue: bytes[..header_len].to_vec(),
            fields,
            records,
        })
    }

    /// Start a new empty table with the given schema. Nothing is written
    /// until [`Table::save`].
    pub fn create(path: impl AsRef<Path>, schema: &[FieldSpec]) -> Result<Self, TableError> {
        let path = path.as_ref();
        let today = chrono::Local::now().date_naive();
        let (prologue, header) = header::encode_new(schema, today)?;
        let fields = header::decode_descriptors(path, &prologue, &header)?;

        Ok(Self {
            path: path.to_path_buf(),
            header,
            prologue,
            fields,
            records: Vec::new(),
        })
    }

    /// Open `path` if it exists, otherwise start a new table with `schema`.
    pub fn open_or_create(path: impl AsRef<Path>, schema: &[FieldSpec]) -> Result<Self, TableError> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            debug!("Creating new table {:?} with {} fields", path, schema.len());
            Self::create(path, schema)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Number of rows, deleted ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.records.iter().filter(|r| !is_deleted(r)).count()
    }

    pub fn is_deleted(&self, index: usize) -> bool {
        self.records.get(index).is_some_and(|r| is_deleted(r))
    }

    /// Decode one row, deleted or not.
    pub fn row(&self, index: usize) -> Option<Row> {
        self.records.get(index).map(|r| self.decode_row(r))
    }

    /// Decode every live row in file order.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.records
            .iter()
            .filter(|r| !is_deleted(r))
            .map(|r| self.decode_row(r))
    }

    fn decode_row(&self, record: &[u8]) -> Row {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), cell_value(record, f)))
            .collect()
    }

    /// Indices of the live rows whose `key_field` reads back as `key`.
    pub fn find_live(&self, key_field: &str, key: &str) -> Result<Vec<usize>, TableError> {
        let field = self
            .field(key_field)
            .ok_or_else(|| TableError::UnknownKeyField {
                path: self.path.clone(),
                field: key_field.to_string(),
            })?;
        let wanted = text::fit_to_width(key, field.width);

        Ok(self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| !is_deleted(r) && cell_value(r, field) == wanted)
            .map(|(i, _)| i)
            .collect())
    }

    /// Logically delete every live row matching the key. Returns how many.
    pub fn mark_deleted_by_key(&mut self, key_field: &str, key: &str) -> Result<usize, TableError> {
        let hits = self.find_live(key_field, key)?;
        for &i in &hits {
            self.records[i][0] = DELETED_MARKER;
        }
        Ok(hits.len())
    }

    /// Overwrite the named fields on every live row matching the key.
    ///
    /// Unknown field names and over-long values do not stop the update;
    /// they come back as warnings and the remaining fields are still written.
    pub fn set_fields_by_key<I, K, V>(
        &mut self,
        key_field: &str,
        key: &str,
        values: I,
    ) -> Result<UpdateOutcome, TableError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let hits = self.find_live(key_field, key)?;
        let mut outcome = UpdateOutcome {
            rows: hits.len(),
            warnings: Vec::new(),
        };
        if hits.is_empty() {
            return Ok(outcome);
        }

        for (name, value) in values {
            let (name, value) = (name.as_ref(), value.as_ref());
            let Some(field) = self.fields.iter().find(|f| f.name == name) else {
                outcome.warnings.push(FieldWarning::UnknownField {
                    field: name.to_string(),
                    value: value.to_string(),
                });
                continue;
            };
            for &i in &hits {
                if let Some(w) = write_cell(&mut self.records[i], field, value) {
                    outcome.warnings.push(w);
                }
            }
        }

        Ok(outcome)
    }

    /// Append a live row. Fields the table does not have are dropped;
    /// those carrying a value are reported.
    pub fn append<I, K, V>(&mut self, values: I) -> Vec<FieldWarning>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut record = vec![b' '; usize::from(self.header.record_len)];
        record[0] = LIVE_MARKER;
        let mut warnings = Vec::new();

        for (name, value) in values {
            let (name, value) = (name.as_ref(), value.as_ref());
            match self.fields.iter().find(|f| f.name == name) {
                Some(field) => {
                    if let Some(w) = write_cell(&mut record, field, value) {
                        warnings.push(w);
                    }
                }
                None if text::trim_cell(value).is_empty() => {}
                None => warnings.push(FieldWarning::UnknownField {
                    field: name.to_string(),
                    value: value.to_string(),
                }),
            }
        }

        self.records.push(record);
        warnings
    }

    /// Physically drop deleted rows, keeping live rows in order.
    pub fn pack(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !is_deleted(r));
        before - self.records.len()
    }

    /// Write the table back to its path.
    pub fn save(&mut self) -> Result<(), TableError> {
        self.header.record_count = u32::try_from(self.records.len())
            .map_err(|_| TableError::malformed(&self.path, "too many rows for u32 count"))?;
        self.header.last_update = Some(chrono::Local::now().date_naive());
        self.header.encode_into(&mut self.prologue[..HEADER_BYTES]);

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| TableError::io(&dir, e))?;
        // keep the existing table's mode across the rename
        match std::fs::metadata(&self.path) {
            Ok(meta) => tmp
                .as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| TableError::io(&self.path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TableError::io(&self.path, e)),
        }
        {
            let file = tmp.as_file_mut();
            file.write_all(&self.prologue)
                .map_err(|e| TableError::io(&self.path, e))?;
            for record in &self.records {
                file.write_all(record)
                    .map_err(|e| TableError::io(&self.path, e))?;
            }
            file.write_all(&[EOF_MARKER])
                .map_err(|e| TableError::io(&self.path, e))?;
            file.sync_all().map_err(|e| TableError::io(&self.path, e))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| TableError::io(&self.path, e.error))?;

        debug!("Saved {:?}: {} rows", self.path, self.records.len());
        Ok(())
    }
}

fn is_deleted(record: &[u8]) -> bool {
    record.first() == Some(&DELETED_MARKER)
}

fn cell_value(record: &[u8], field: &FieldDescriptor) -> String {
    text::trim_cell(&text::decode(&record[field.range()])).to_string()
}

fn write_cell(record: &mut [u8], field: &FieldDescriptor, value: &str) -> Option<FieldWarning> {
    let (cell, length) = text::fit_cell(value, field.width);
    record[field.range()].copy_from_slice(&cell);

    if length > field.width {
        warn!(
            "Truncated {} from {} to {} bytes",
            field.name, length, field.width
        );
        Some(FieldWarning::Truncated {
            field: field.name.clone(),
            width: field.width,
            length,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCHEMA: &[FieldSpec] = &[
        FieldSpec::character("NAME", 8),
        FieldSpec::character("ADDR", 12),
        FieldSpec::character("COMMENT", 20),
    ];

    fn table_with(dir: &TempDir, names: &[&str]) -> Table {
        let mut table = Table::create(dir.path().join("variable.dbf"), SCHEMA).unwrap();
        for name in names {
            let warnings = table.append([("NAME", *name), ("ADDR", "40001")]);
            assert!(warnings.is_empty());
        }
        table
    }

    #[test]
    fn test_append_then_read_rows() {
        let dir = TempDir::new().unwrap();
        let table = table_with(&dir, &["Pump1", "Pump2"]);

        let rows: Vec<Row> = table.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["NAME"], "Pump1");
        assert_eq!(rows[0]["ADDR"], "40001");
        assert_eq!(rows[0]["COMMENT"], "");
    }

    #[test]
    fn test_mark_deleted_hides_row() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1", "Pump2", "Pump3"]);

        assert_eq!(table.mark_deleted_by_key("NAME", "Pump2").unwrap(), 1);
        assert_eq!(table.len(), 3);
        assert_eq!(table.live_count(), 2);
        assert!(table.is_deleted(1));
        assert_eq!(table.mark_deleted_by_key("NAME", "Pump2").unwrap(), 0);

        let names: Vec<String> = table.rows().map(|r| r["NAME"].clone()).collect();
        assert_eq!(names, vec!["Pump1", "Pump3"]);
    }

    #[test]
    fn test_set_fields_skips_unknown_and_keeps_others() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1"]);

        let outcome = table
            .set_fields_by_key(
                "NAME",
                "Pump1",
                [("GUID", "abc"), ("COMMENT", "Main pump"), ("ADDR", "40002")],
            )
            .unwrap();

        assert_eq!(outcome.rows, 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].field(), "GUID");

        let row = table.row(0).unwrap();
        assert_eq!(row["COMMENT"], "Main pump");
        assert_eq!(row["ADDR"], "40002");
    }

    #[test]
    fn test_set_fields_on_missing_key_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1"]);

        let outcome = table
            .set_fields_by_key("NAME", "Nope", [("ADDR", "1")])
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
        assert_eq!(table.row(0).unwrap()["ADDR"], "40001");
    }

    #[test]
    fn test_unknown_key_field_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1"]);

        assert!(matches!(
            table.mark_deleted_by_key("TAG", "Pump1"),
            Err(TableError::UnknownKeyField { .. })
        ));
    }

    #[test]
    fn test_append_truncates_with_warning() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &[]);

        let warnings = table.append([("NAME", "VeryLongName"), ("EQUIP", "")]);
        assert_eq!(
            warnings,
            vec![FieldWarning::Truncated {
                field: "NAME".into(),
                width: 8,
                length: 12,
            }]
        );
        assert_eq!(table.row(0).unwrap()["NAME"], "VeryLong");
    }

    #[test]
    fn test_pack_removes_deleted_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["A", "B", "C", "D"]);
        table.mark_deleted_by_key("NAME", "B").unwrap();
        table.mark_deleted_by_key("NAME", "D").unwrap();

        assert_eq!(table.pack(), 2);
        let names: Vec<String> = table.rows().map(|r| r["NAME"].clone()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1", "Pump2"]);
        table.mark_deleted_by_key("NAME", "Pump1").unwrap();
        table.save().unwrap();

        let bytes = std::fs::read(table.path()).unwrap();
        let header_len = 32 + 3 * 32 + 1;
        let record_len = 1 + 8 + 12 + 20;
        assert_eq!(bytes.len(), header_len + 2 * record_len + 1);
        assert_eq!(bytes[bytes.len() - 1], EOF_MARKER);
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 2);
        assert_eq!(bytes[header_len], DELETED_MARKER);

        let reopened = Table::open(table.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.live_count(), 1);
        assert_eq!(reopened.field_names(), vec!["NAME", "ADDR", "COMMENT"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1"]);
        table.save().unwrap();
        std::fs::set_permissions(table.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut table = Table::open(table.path()).unwrap();
        table.append([("NAME", "Pump2")]);
        table.save().unwrap();

        let mode = std::fs::metadata(table.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(Table::open(table.path()).unwrap().live_count(), 2);
    }

    #[test]
    fn test_open_rejects_truncated_data() {
        let dir = TempDir::new().unwrap();
        let mut table = table_with(&dir, &["Pump1", "Pump2"]);
        table.save().unwrap();

        let mut bytes = std::fs::read(table.path()).unwrap();
        bytes.truncate(bytes.len() - 20);
        assert!(matches!(
            Table::from_bytes(table.path(), &bytes),
            Err(TableError::Malformed { .. })
        ));
    }

    #[test]
    fn test_extra_header_bytes_are_preserved() {
        let dir = TempDir::new().unwrap();
        let (mut prologue, _) =
            header::encode_new(SCHEMA, chrono::NaiveDate::default()).unwrap();
        // Pad the header the way some writers do after the terminator.
        prologue.extend_from_slice(&[0xAB; 7]);
        let header_len = prologue.len() as u16;
        prologue[8..10].copy_from_slice(&header_len.to_le_bytes());
        prologue.push(EOF_MARKER);

        let path = dir.path().join("trend.dbf");
        std::fs::write(&path, &prologue).unwrap();

        let mut table = Table::open(&path).unwrap();
        table.append([("NAME", "T1")]);
        table.save().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let start = usize::from(header_len) - 7;
        assert_eq!(&bytes[start..usize::from(header_len)], &[0xAB; 7]);
        assert_eq!(Table::open(&path).unwrap().row(0).unwrap()["NAME"], "T1");
    }
}
