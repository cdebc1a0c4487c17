//! Fixed-width binary table codec
//!
//! Reads and writes the dBase III style tables a SCADA project keeps its tag
//! database in (`variable.dbf`, `trend.dbf`, `digalm.dbf`):
//!
//! - a 32-byte header (record count, header length, record length)
//! - one 32-byte descriptor per column, terminated by `0x0D`
//! - fixed-width rows whose first byte is the deletion marker
//!
//! Only character columns are ever created, but any column type is read back
//! as trimmed text.
//!
//! # Example
//!
//! ```no_run
//! use taggen_dbf::{FieldSpec, Table};
//!
//! const SCHEMA: &[FieldSpec] = &[FieldSpec::character("NAME", 79)];
//!
//! let mut table = Table::open_or_create("variable.dbf", SCHEMA)?;
//! table.append([("NAME", "Pump1_Run")]);
//! table.save()?;
//!
//! for row in taggen_dbf::read("variable.dbf")? {
//!     println!("{}", row["NAME"]);
//! }
//! # Ok::<(), taggen_dbf::TableError>(())
//! ```

mod error;
mod header;
mod schema;
mod table;
mod text;

use std::path::Path;

use tracing::debug;

pub use error::{FieldWarning, TableError};
pub use header::{TableHeader, DESCRIPTOR_TERMINATOR, VERSION_DBASE3};
pub use schema::{
    validate_schema, FieldDescriptor, FieldKind, FieldSpec, MAX_FIELD_NAME_LEN, MAX_FIELD_WIDTH,
};
pub use table::{Row, Table, UpdateOutcome, DELETED_MARKER, EOF_MARKER, LIVE_MARKER};
pub use text::{fit_to_width, trim_cell};

/// Read every live row of a table.
///
/// A missing file is an empty table. A file that exists but cannot be read
/// or decoded is an error, never an empty result.
pub fn read(path: impl AsRef<Path>) -> Result<Vec<Row>, TableError> {
    let path = path.as_ref();
    match Table::open(path) {
        Ok(table) => Ok(table.rows().collect()),
        Err(e) if e.is_not_found() => {
            debug!("Table {:?} does not exist, treating as empty", path);
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Append `rows` to the table at `path`, creating it with `schema` if it
/// does not exist yet.
///
/// An existing file keeps its own layout; `schema` only applies on create.
pub fn write(
    path: impl AsRef<Path>,
    schema: &[FieldSpec],
    rows: &[Row],
) -> Result<Vec<FieldWarning>, TableError> {
    let mut table = Table::open_or_create(path, schema)?;
    let mut warnings = Vec::new();

    for row in rows {
        warnings.extend(table.append(row.iter().map(|(k, v)| (k.as_str(), v.as_str()))));
    }

    table.save()?;
    Ok(warnings)
}
