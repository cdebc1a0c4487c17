//! Diff Applier
//!
//! Commits a [`DiffResult`] to a table file: back up, delete orphans, update
//! changed columns in place, append new rows, pack, save.
//!
//! Row-level problems (a key that is no longer in the table, a column the
//! file does not have, a value cut to fit) do not stop the apply; they are
//! returned in [`ApplyReport::warnings`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taggen_dbf::{FieldWarning, Table, TableError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::reconcile::DiffResult;
use crate::records::{Family, TableRecord};

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The live table was not touched.
    #[error("failed to back up {path} to {backup}: {source}")]
    Backup {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to apply {family} changes: {source}")]
    Table {
        family: Family,
        #[source]
        source: TableError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyWarning {
    /// An orphan or modified record whose key no longer matches a live row.
    KeyNotFound { key: String },
    /// A column was skipped or a value cut short.
    Field {
        key: String,
        field: String,
        message: String,
    },
}

impl ApplyWarning {
    fn field(key: &str, warning: &FieldWarning) -> Self {
        Self::Field {
            key: key.to_string(),
            field: warning.field().to_string(),
            message: warning.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub family: Family,
    pub path: PathBuf,
    /// Copy of the table taken before any change, if there was a table
    pub backup: Option<PathBuf>,
    pub deleted: usize,
    pub updated: usize,
    pub appended: usize,
    pub warnings: Vec<ApplyWarning>,
}

/// `<path>.bak`, next to the table.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Apply `diff` to the table at `target_path`, creating it with the
/// family's schema if it does not exist.
pub fn apply<R: TableRecord>(
    diff: &DiffResult<R>,
    target_path: &Path,
) -> Result<ApplyReport, ApplyError> {
    let family = R::FAMILY;
    let key_field = R::KEY_FIELD;
    let table_err = |source: TableError| ApplyError::Table { family, source };

    let backup = if target_path.exists() {
        let backup = backup_path(target_path);
        std::fs::copy(target_path, &backup).map_err(|source| ApplyError::Backup {
            path: target_path.to_path_buf(),
            backup: backup.clone(),
            source,
        })?;
        debug!("Backed up {:?} to {:?}", target_path, backup);
        Some(backup)
    } else {
        None
    };

    let mut table = Table::open_or_create(target_path, R::SCHEMA).map_err(table_err)?;
    let mut report = ApplyReport {
        family,
        path: target_path.to_path_buf(),
        backup,
        deleted: 0,
        updated: 0,
        appended: 0,
        warnings: Vec::new(),
    };

    for orphan in &diff.orphaned {
        let key = orphan.key();
        let deleted = table
            .mark_deleted_by_key(key_field, key)
            .map_err(table_err)?;
        if deleted == 0 {
            warn!("{} {}: orphan not found in {:?}", family, key, target_path);
            report.warnings.push(ApplyWarning::KeyNotFound { key: key.into() });
        }
        report.deleted += deleted;
    }

    for modified in &diff.modified {
        let record = &modified.record;
        let key = record.key();
        let values = modified.changes.iter().map(|change| {
            let value = record.get(&change.field).unwrap_or(change.new.as_str());
            (change.field.as_str(), value)
        });

        let outcome = table
            .set_fields_by_key(key_field, key, values)
            .map_err(table_err)?;
        if outcome.rows == 0 {
            warn!("{} {}: modified record not found in {:?}", family, key, target_path);
            report.warnings.push(ApplyWarning::KeyNotFound { key: key.into() });
        }
        report
            .warnings
            .extend(outcome.warnings.iter().map(|w| ApplyWarning::field(key, w)));
        report.updated += outcome.rows;
    }

    for record in &diff.new {
        let warnings = table.append(record.fields());
        report.warnings.extend(
            warnings
                .iter()
                .map(|w| ApplyWarning::field(record.key(), w)),
        );
        report.appended += 1;
    }

    if report.deleted > 0 {
        let packed = table.pack();
        debug!("Packed {} deleted rows from {:?}", packed, target_path);
    }

    table.save().map_err(table_err)?;

    info!(
        "Applied {} to {:?}: {} deleted, {} updated, {} appended ({} warnings)",
        family,
        target_path,
        report.deleted,
        report.updated,
        report.appended,
        report.warnings.len()
    );

    Ok(report)
}
