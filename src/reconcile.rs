//! Reconciler
//!
//! Classifies staged records against the current contents of a table:
//! new, modified (with the changed columns), unchanged, and orphaned
//! existing rows whose key is no longer staged.
//!
//! Values are compared the way they would read back after a write: cut to
//! the column width and trimmed. Only columns present in the existing file
//! are compared, and the legacy `OID` only when the file also has `GUID` to
//! receive it.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use taggen_dbf::{fit_to_width, Row, Table, TableError};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::records::{Family, TableRecord, GUID_FIELD, LEGACY_ID_FIELD};

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The existing table is present but could not be read. Never treated
    /// as empty.
    #[error("cannot reconcile {family}: {source}")]
    Table {
        family: Family,
        #[source]
        source: TableError,
    },

    #[error("{family} records have no column {field}")]
    UnknownKeyField { family: Family, field: String },

    /// Apply locates rows by the family's own key, so a diff keyed on any
    /// other column could not be applied.
    #[error("{family} records are keyed by {expected}, not {found}")]
    KeyFieldMismatch {
        family: Family,
        expected: &'static str,
        found: String,
    },
}

/// One column that differs between the staged and the existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedRecord<R> {
    pub record: R,
    pub changes: Vec<FieldChange>,
}

/// Outcome of reconciling one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: Deserialize<'de>"))]
pub struct DiffResult<R> {
    #[serde(default)]
    pub new: Vec<R>,
    #[serde(default)]
    pub modified: Vec<ModifiedRecord<R>>,
    /// Existing records, as read from the table
    #[serde(default)]
    pub orphaned: Vec<R>,
    #[serde(default)]
    pub unchanged: Vec<R>,
}

impl<R> Default for DiffResult<R> {
    fn default() -> Self {
        Self {
            new: Vec::new(),
            modified: Vec::new(),
            orphaned: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub new: usize,
    pub modified: usize,
    pub orphaned: usize,
    pub unchanged: usize,
}

impl<R> DiffResult<R> {
    /// True when applying this diff would change nothing.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.orphaned.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            new: self.new.len(),
            modified: self.modified.len(),
            orphaned: self.orphaned.len(),
            unchanged: self.unchanged.len(),
        }
    }
}

/// Reconcile `staged` against the table at `existing_path`.
///
/// A missing table is empty. With `stabilize` set, point GUIDs are carried
/// over from the existing row (or its legacy OID) and fresh ones are
/// generated for new keys; with it unset every staged record is new.
pub fn reconcile<R: TableRecord>(
    staged: Vec<R>,
    existing_path: &Path,
    key_field: &str,
    stabilize: bool,
) -> Result<DiffResult<R>, ReconcileError> {
    reconcile_with(staged, existing_path, key_field, stabilize, &mut || {
        Uuid::new_v4().to_string()
    })
}

/// [`reconcile`] with a caller-supplied identifier generator.
///
/// `key_field` must be the family's key ([`TableRecord::KEY_FIELD`]).
pub fn reconcile_with<R: TableRecord>(
    staged: Vec<R>,
    existing_path: &Path,
    key_field: &str,
    stabilize: bool,
    new_id: &mut dyn FnMut() -> String,
) -> Result<DiffResult<R>, ReconcileError> {
    let family = R::FAMILY;
    let key_width = R::SCHEMA
        .iter()
        .find(|f| f.name == key_field)
        .map(|f| usize::from(f.width))
        .ok_or_else(|| ReconcileError::UnknownKeyField {
            family,
            field: key_field.to_string(),
        })?;
    if key_field != R::KEY_FIELD {
        return Err(ReconcileError::KeyFieldMismatch {
            family,
            expected: R::KEY_FIELD,
            found: key_field.to_string(),
        });
    }

    let existing = Existing::load(existing_path, key_field, key_width)
        .map_err(|source| ReconcileError::Table { family, source })?;

    let mut diff = DiffResult::default();
    let mut staged_keys = HashSet::new();

    for mut record in staged {
        let key = fit_to_width(record.get(key_field).unwrap_or_default(), existing.key_width);
        staged_keys.insert(key.clone());

        if !stabilize {
            diff.new.push(record);
            continue;
        }

        let matched = existing.get(&key);
        stabilize_identifier(&mut record, matched, new_id);

        match matched {
            None => {
                debug!("{} {}: new", family, key);
                diff.new.push(record);
            }
            Some(row) => {
                let changes = compare(&record, row, &existing.widths);
                if changes.is_empty() {
                    diff.unchanged.push(record);
                } else {
                    debug!("{} {}: {} fields changed", family, key, changes.len());
                    diff.modified.push(ModifiedRecord { record, changes });
                }
            }
        }
    }

    for (key, row) in &existing.rows {
        if !staged_keys.contains(key) {
            debug!("{} {}: orphaned", family, key);
            diff.orphaned.push(R::from_row(row));
        }
    }

    let s = diff.summary();
    info!(
        "Reconciled {} against {:?}: {} new, {} modified, {} orphaned, {} unchanged",
        family, existing_path, s.new, s.modified, s.orphaned, s.unchanged
    );

    Ok(diff)
}

/// Live rows of the existing table, keyed, in file order.
struct Existing {
    rows: Vec<(String, Row)>,
    index: HashMap<String, usize>,
    widths: HashMap<String, usize>,
    key_width: usize,
}

impl Existing {
    fn load(path: &Path, key_field: &str, default_key_width: usize) -> Result<Self, TableError> {
        let table = match Table::open(path) {
            Ok(table) => table,
            Err(e) if e.is_not_found() => {
                debug!("{:?} does not exist, reconciling against an empty table", path);
                return Ok(Self {
                    rows: Vec::new(),
                    index: HashMap::new(),
                    widths: HashMap::new(),
                    key_width: default_key_width,
                });
            }
            Err(e) => return Err(e),
        };

        let key_width = table
            .field(key_field)
            .map(|f| f.width)
            .ok_or_else(|| TableError::UnknownKeyField {
                path: path.to_path_buf(),
                field: key_field.to_string(),
            })?;

        let widths = table
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.width))
            .collect();

        let mut rows = Vec::new();
        let mut index = HashMap::new();
        for row in table.rows() {
            let key = row.get(key_field).cloned().unwrap_or_default();
            if key.is_empty() {
                continue;
            }
            if index.contains_key(&key) {
                warn!("{:?}: duplicate key {}, keeping the first row", path, key);
                continue;
            }
            index.insert(key.clone(), rows.len());
            rows.push((key, row));
        }

        Ok(Self {
            rows,
            index,
            widths,
            key_width,
        })
    }

    fn get(&self, key: &str) -> Option<&Row> {
        self.index.get(key).map(|&i| &self.rows[i].1)
    }
}

fn stabilize_identifier<R: TableRecord>(
    record: &mut R,
    existing: Option<&Row>,
    new_id: &mut dyn FnMut() -> String,
) {
    let Some(slot) = record.field_mut(GUID_FIELD) else {
        return;
    };

    let inherited = existing.and_then(|row| {
        [GUID_FIELD, LEGACY_ID_FIELD]
            .iter()
            .find_map(|f| row.get(*f).filter(|v| !v.is_empty()))
    });

    match inherited {
        Some(id) => *slot = id.clone(),
        None if slot.trim().is_empty() => *slot = new_id(),
        None => {}
    }
}

fn compare<R: TableRecord>(
    record: &R,
    existing: &Row,
    widths: &HashMap<String, usize>,
) -> Vec<FieldChange> {
    // Without a GUID column the legacy id is the only stored identifier.
    let migrates_legacy_id = widths.contains_key(GUID_FIELD);

    R::SCHEMA
        .iter()
        .filter(|spec| spec.name != LEGACY_ID_FIELD || migrates_legacy_id)
        .filter_map(|spec| {
            let old = existing.get(spec.name)?;
            let width = *widths.get(spec.name)?;
            let new = fit_to_width(record.get(spec.name)?, width);
            (new != *old).then(|| FieldChange {
                field: spec.name.to_string(),
                old: old.clone(),
                new,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AlarmRecord, PointRecord, POINT_SCHEMA};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn point(name: &str, addr: &str) -> PointRecord {
        PointRecord {
            name: name.into(),
            addr: addr.into(),
            data_type: "DIGITAL".into(),
            ..Default::default()
        }
    }

    fn write_points(path: &Path, points: &[PointRecord]) {
        let mut table = Table::create(path, POINT_SCHEMA).unwrap();
        for p in points {
            table.append(p.fields());
        }
        table.save().unwrap();
    }

    fn counter() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("id-{n}")
        }
    }

    #[test]
    fn test_missing_table_makes_everything_new() {
        let temp = TempDir::new().unwrap();
        let mut ids = counter();
        let diff = reconcile_with(
            vec![point("P1", "1"), point("P2", "2")],
            &temp.path().join("variable.dbf"),
            "NAME",
            true,
            &mut ids,
        )
        .unwrap();

        assert_eq!(diff.summary().new, 2);
        assert_eq!(diff.new[0].guid, "id-1");
        assert_eq!(diff.new[1].guid, "id-2");
    }

    #[test]
    fn test_classifies_against_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        let mut existing = vec![point("P1", "1"), point("P2", "2"), point("P3", "3")];
        existing[0].guid = "g-1".into();
        existing[1].oid = "42".into();
        write_points(&path, &existing);

        let staged = vec![point("P1", "1"), point("P2", "20"), point("P4", "4")];
        let mut ids = counter();
        let diff = reconcile_with(staged, &path, "NAME", true, &mut ids).unwrap();

        assert_eq!(diff.unchanged.len(), 1);
        assert_eq!(diff.unchanged[0].guid, "g-1");

        assert_eq!(diff.modified.len(), 1);
        let modified = &diff.modified[0];
        assert_eq!(modified.record.guid, "42");
        assert_eq!(
            modified.changes,
            vec![
                FieldChange {
                    field: "ADDR".into(),
                    old: "2".into(),
                    new: "20".into(),
                },
                FieldChange {
                    field: "OID".into(),
                    old: "42".into(),
                    new: "".into(),
                },
                FieldChange {
                    field: "GUID".into(),
                    old: "".into(),
                    new: "42".into(),
                },
            ]
        );

        assert_eq!(diff.new.len(), 1);
        assert_eq!(diff.new[0].guid, "id-1");

        assert_eq!(diff.orphaned.len(), 1);
        assert_eq!(diff.orphaned[0].name, "P3");
    }

    #[test]
    fn test_existing_identifier_overrides_staged() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        let mut existing = point("P1", "1");
        existing.guid = "keep-me".into();
        write_points(&path, &[existing]);

        let mut staged = point("P1", "1");
        staged.guid = "other".into();
        let diff = reconcile(vec![staged], &path, "NAME", true).unwrap();

        assert_eq!(diff.unchanged[0].guid, "keep-me");
    }

    #[test]
    fn test_staged_identifier_kept_for_new_key() {
        let temp = TempDir::new().unwrap();
        let mut staged = point("P1", "1");
        staged.guid = "mine".into();
        let diff = reconcile(vec![staged], &temp.path().join("v.dbf"), "NAME", true).unwrap();
        assert_eq!(diff.new[0].guid, "mine");
    }

    #[test]
    fn test_generated_identifier_is_uuid() {
        let temp = TempDir::new().unwrap();
        let diff =
            reconcile(vec![point("P1", "1")], &temp.path().join("v.dbf"), "NAME", true).unwrap();
        assert!(Uuid::parse_str(&diff.new[0].guid).is_ok());
    }

    #[test]
    fn test_without_stabilize_everything_is_new() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        write_points(&path, &[point("P1", "1"), point("P2", "2")]);

        let diff = reconcile(vec![point("P1", "1")], &path, "NAME", false).unwrap();

        assert_eq!(diff.new.len(), 1);
        assert_eq!(diff.new[0].guid, "");
        assert!(diff.unchanged.is_empty());
        assert_eq!(diff.orphaned.len(), 1);
        assert_eq!(diff.orphaned[0].name, "P2");
    }

    #[test]
    fn test_compare_uses_column_width() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        let long = "L".repeat(300);
        let mut existing = point("P1", &long);
        existing.guid = "g".into();
        write_points(&path, &[existing]);

        let mut staged = point("P1", &long);
        staged.comment = "  ".into();
        let diff = reconcile(vec![staged], &path, "NAME", true).unwrap();

        assert_eq!(diff.unchanged.len(), 1);
    }

    #[test]
    fn test_only_existing_columns_compared() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        let narrow = [
            taggen_dbf::FieldSpec::character("NAME", 79),
            taggen_dbf::FieldSpec::character("ADDR", 254),
        ];
        let mut table = Table::create(&path, &narrow).unwrap();
        table.append([("NAME", "P1"), ("ADDR", "1")]);
        table.save().unwrap();

        let mut staged = point("P1", "1");
        staged.comment = "not in file".into();
        let diff = reconcile(vec![staged], &path, "NAME", true).unwrap();

        assert_eq!(diff.unchanged.len(), 1);
    }

    #[test]
    fn test_malformed_table_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        std::fs::write(&path, b"garbage").unwrap();

        let result = reconcile(vec![point("P1", "1")], &path, "NAME", true);
        assert!(matches!(
            result,
            Err(ReconcileError::Table {
                family: Family::Point,
                ..
            })
        ));
    }

    #[test]
    fn test_legacy_id_survives_without_guid_column() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("variable.dbf");
        let legacy = [
            taggen_dbf::FieldSpec::character("NAME", 79),
            taggen_dbf::FieldSpec::character("ADDR", 254),
            taggen_dbf::FieldSpec::character("OID", 10),
        ];
        let mut table = Table::create(&path, &legacy).unwrap();
        table.append([("NAME", "P1"), ("ADDR", "1"), ("OID", "42")]);
        table.save().unwrap();

        let unchanged = reconcile(vec![point("P1", "1")], &path, "NAME", true).unwrap();
        assert_eq!(unchanged.unchanged.len(), 1);
        assert_eq!(unchanged.unchanged[0].guid, "42");

        let diff = reconcile(vec![point("P1", "2")], &path, "NAME", true).unwrap();
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].record.guid, "42");
        assert_eq!(
            diff.modified[0].changes,
            vec![FieldChange {
                field: "ADDR".into(),
                old: "1".into(),
                new: "2".into(),
            }]
        );
        crate::apply::apply(&diff, &path).unwrap();

        let rows = taggen_dbf::read(&path).unwrap();
        assert_eq!(rows[0]["OID"], "42");
        assert_eq!(rows[0]["ADDR"], "2");

        let again = reconcile(vec![point("P1", "2")], &path, "NAME", true).unwrap();
        assert!(again.is_empty());
        assert_eq!(again.unchanged[0].guid, "42");
    }

    #[test]
    fn test_key_field_must_be_family_key() {
        let temp = TempDir::new().unwrap();
        let result = reconcile(
            vec![point("P1", "1")],
            &temp.path().join("variable.dbf"),
            "ADDR",
            true,
        );
        assert!(matches!(
            result,
            Err(ReconcileError::KeyFieldMismatch {
                family: Family::Point,
                expected: "NAME",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_key_field() {
        let temp = TempDir::new().unwrap();
        let result = reconcile(
            vec![AlarmRecord::default()],
            &temp.path().join("digalm.dbf"),
            "GUID",
            true,
        );
        assert!(matches!(result, Err(ReconcileError::UnknownKeyField { .. })));
    }

    #[test]
    fn test_alarms_get_no_identifier() {
        let temp = TempDir::new().unwrap();
        let alarm = AlarmRecord {
            tag: "P1_Alm".into(),
            ..Default::default()
        };
        let diff = reconcile(vec![alarm.clone()], &temp.path().join("digalm.dbf"), "TAG", true)
            .unwrap();
        assert_eq!(diff.new, vec![alarm]);
    }
}
