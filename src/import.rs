//! Project import
//!
//! Reads an existing project's three tables back into single-tag entries, so
//! a project built elsewhere can be brought under generation. Each entry
//! carries every column as a field override: expanding the imported entries
//! and reconciling against the same files shows no changes.
//!
//! Trend rows link to a point by `NAME`, alarm rows by `VAR_A`. Rows that do
//! not link, or link to a point that already has one, are reported and left
//! out. Those whose key no imported entry regenerates are listed in
//! [`ImportedProject::left_out`]: a plan built from the imported entries
//! orphans exactly these rows.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use taggen_dbf::{Row, TableError};
use thiserror::Error;
use tracing::{info, warn};

use crate::entry::{SingleTag, TagDefinitionEntry};
use crate::project::ProjectFiles;
use crate::records::{AlarmRecord, Family, PointRecord, TableRecord, TrendRecord};

#[derive(Debug, Error)]
#[error("failed to import {family} table: {source}")]
pub struct ImportError {
    pub family: Family,
    #[source]
    pub source: TableError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportWarning {
    /// A second point with the same name; only the first was imported.
    DuplicatePoint { name: String },
    /// No point with this name.
    UnlinkedTrend { name: String },
    /// No point named by the alarm's `VAR_A`.
    UnlinkedAlarm { tag: String, var_a: String },
    /// The point already has a linked row of this family.
    AlreadyLinked {
        family: Family,
        point: String,
        key: String,
    },
}

/// A trend or alarm row no imported entry regenerates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeftOutRow {
    pub family: Family,
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportedProject {
    pub entries: Vec<TagDefinitionEntry>,
    pub warnings: Vec<ImportWarning>,
    /// Rows the next plan from `entries` will classify as orphaned
    #[serde(default)]
    pub left_out: Vec<LeftOutRow>,
}

pub fn import_project(files: &ProjectFiles) -> Result<ImportedProject, ImportError> {
    let points: Vec<PointRecord> = read_family(files)?;
    let trends: Vec<TrendRecord> = read_family(files)?;
    let alarms: Vec<AlarmRecord> = read_family(files)?;

    let mut warnings = Vec::new();
    let mut skipped: BTreeSet<LeftOutRow> = BTreeSet::new();
    let mut tags: Vec<SingleTag> = Vec::with_capacity(points.len());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for point in points {
        if by_name.contains_key(&point.name) {
            warn!("Duplicate point {}, keeping the first", point.name);
            warnings.push(ImportWarning::DuplicatePoint { name: point.name });
            continue;
        }
        by_name.insert(point.name.clone(), tags.len());
        tags.push(single_from_point(point));
    }

    for trend in trends {
        let Some(&i) = by_name.get(&trend.name) else {
            warn!("Trend {} has no matching point", trend.name);
            skipped.insert(LeftOutRow {
                family: Family::Trend,
                key: trend.name.clone(),
            });
            warnings.push(ImportWarning::UnlinkedTrend { name: trend.name });
            continue;
        };
        let tag = &mut tags[i];
        if tag.is_trend {
            warn!("Point {} already has a trend, skipping {}", tag.name, trend.name);
            skipped.insert(LeftOutRow {
                family: Family::Trend,
                key: trend.name.clone(),
            });
            warnings.push(ImportWarning::AlreadyLinked {
                family: Family::Trend,
                point: tag.name.clone(),
                key: trend.name,
            });
            continue;
        }
        tag.is_trend = true;
        tag.trend_name = Some(trend.name.clone());
        tag.sample_period = Some(trend.sampleper.clone());
        tag.fields.trend = trend.to_row();
    }

    for alarm in alarms {
        let Some(&i) = by_name.get(&alarm.var_a) else {
            warn!("Alarm {} has no matching point ({})", alarm.tag, alarm.var_a);
            skipped.insert(LeftOutRow {
                family: Family::Alarm,
                key: alarm.tag.clone(),
            });
            warnings.push(ImportWarning::UnlinkedAlarm {
                tag: alarm.tag,
                var_a: alarm.var_a,
            });
            continue;
        };
        let tag = &mut tags[i];
        if tag.is_alarm {
            warn!("Point {} already has an alarm, skipping {}", tag.name, alarm.tag);
            skipped.insert(LeftOutRow {
                family: Family::Alarm,
                key: alarm.tag.clone(),
            });
            warnings.push(ImportWarning::AlreadyLinked {
                family: Family::Alarm,
                point: tag.name.clone(),
                key: alarm.tag,
            });
            continue;
        }
        tag.is_alarm = true;
        tag.alarm_name = Some(alarm.tag.clone());
        tag.alarm_category = Some(alarm.category.clone());
        tag.alarm_help = alarm.help.clone();
        tag.fields.alarm = alarm.to_row();
    }

    // a skipped row sharing its key with an imported one is matched, not orphaned
    let regenerated: BTreeSet<LeftOutRow> = tags
        .iter()
        .flat_map(|tag| {
            let trend = tag.trend_name.clone().filter(|_| tag.is_trend).map(|key| LeftOutRow {
                family: Family::Trend,
                key,
            });
            let alarm = tag.alarm_name.clone().filter(|_| tag.is_alarm).map(|key| LeftOutRow {
                family: Family::Alarm,
                key,
            });
            trend.into_iter().chain(alarm)
        })
        .collect();
    let left_out: Vec<LeftOutRow> = skipped.difference(&regenerated).cloned().collect();

    info!(
        "Imported {} points from {:?} ({} warnings, {} rows left out)",
        tags.len(),
        files.root,
        warnings.len(),
        left_out.len()
    );

    Ok(ImportedProject {
        entries: tags.into_iter().map(TagDefinitionEntry::Single).collect(),
        warnings,
        left_out,
    })
}

fn read_family<R: TableRecord>(files: &ProjectFiles) -> Result<Vec<R>, ImportError> {
    let rows: Vec<Row> = taggen_dbf::read(files.path(R::FAMILY)).map_err(|source| ImportError {
        family: R::FAMILY,
        source,
    })?;
    Ok(rows.iter().map(R::from_row).collect())
}

fn single_from_point(point: PointRecord) -> SingleTag {
    let fields = point.to_row();
    let mut tag = SingleTag {
        name: point.name,
        address: point.addr,
        data_type: Some(point.data_type),
        description: point.comment,
        cluster: Some(point.cluster),
        equipment: Some(point.equip),
        item: Some(point.item),
        eng_units: point.eng_units,
        eng_zero: point.eng_zero,
        eng_full: point.eng_full,
        ..Default::default()
    };
    tag.fields.point = fields;
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply;
    use crate::reconcile::DiffResult;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn seed<R: TableRecord>(files: &ProjectFiles, records: Vec<R>) {
        let diff = DiffResult {
            new: records,
            ..Default::default()
        };
        apply(&diff, files.path(R::FAMILY)).unwrap();
    }

    #[test]
    fn test_links_trends_and_alarms() {
        let temp = TempDir::new().unwrap();
        let files = ProjectFiles::resolve(temp.path());

        seed(
            &files,
            vec![
                PointRecord {
                    name: "P1".into(),
                    addr: "40001".into(),
                    custom1: "site data".into(),
                    ..Default::default()
                },
                PointRecord {
                    name: "P2".into(),
                    ..Default::default()
                },
            ],
        );
        seed(
            &files,
            vec![
                TrendRecord {
                    name: "P1".into(),
                    sampleper: "00:00:05".into(),
                    ..Default::default()
                },
                TrendRecord {
                    name: "Ghost".into(),
                    ..Default::default()
                },
            ],
        );
        seed(
            &files,
            vec![
                AlarmRecord {
                    tag: "P2_HI".into(),
                    var_a: "P2".into(),
                    category: "3".into(),
                    ..Default::default()
                },
                AlarmRecord {
                    tag: "P2_HIHI".into(),
                    var_a: "P2".into(),
                    ..Default::default()
                },
            ],
        );

        let imported = import_project(&files).unwrap();

        assert_eq!(imported.entries.len(), 2);
        let TagDefinitionEntry::Single(p1) = &imported.entries[0] else {
            panic!("expected single tag");
        };
        assert!(p1.is_trend);
        assert!(!p1.is_alarm);
        assert_eq!(p1.sample_period.as_deref(), Some("00:00:05"));
        assert_eq!(p1.fields.point["CUSTOM1"], "site data");

        let TagDefinitionEntry::Single(p2) = &imported.entries[1] else {
            panic!("expected single tag");
        };
        assert!(p2.is_alarm);
        assert_eq!(p2.alarm_name.as_deref(), Some("P2_HI"));
        assert_eq!(p2.fields.alarm["CATEGORY"], "3");

        assert_eq!(
            imported.warnings,
            vec![
                ImportWarning::UnlinkedTrend {
                    name: "Ghost".into()
                },
                ImportWarning::AlreadyLinked {
                    family: Family::Alarm,
                    point: "P2".into(),
                    key: "P2_HIHI".into(),
                },
            ]
        );
        assert_eq!(
            imported.left_out,
            vec![
                LeftOutRow {
                    family: Family::Trend,
                    key: "Ghost".into(),
                },
                LeftOutRow {
                    family: Family::Alarm,
                    key: "P2_HIHI".into(),
                },
            ]
        );
    }

    #[test]
    fn test_second_trend_with_linked_name_is_not_left_out() {
        let temp = TempDir::new().unwrap();
        let files = ProjectFiles::resolve(temp.path());
        seed(
            &files,
            vec![PointRecord {
                name: "P1".into(),
                ..Default::default()
            }],
        );
        seed(
            &files,
            vec![
                TrendRecord {
                    name: "P1".into(),
                    ..Default::default()
                },
                TrendRecord {
                    name: "P1".into(),
                    ..Default::default()
                },
            ],
        );

        let imported = import_project(&files).unwrap();

        assert_eq!(imported.warnings.len(), 1);
        assert!(imported.left_out.is_empty());
    }

    #[test]
    fn test_empty_project() {
        let temp = TempDir::new().unwrap();
        let imported = import_project(&ProjectFiles::resolve(temp.path())).unwrap();
        assert!(imported.entries.is_empty());
        assert!(imported.warnings.is_empty());
    }

    #[test]
    fn test_unreadable_table_names_family() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("trend.dbf"), b"junk").unwrap();

        let err = import_project(&ProjectFiles::resolve(temp.path())).unwrap_err();
        assert_eq!(err.family, Family::Trend);
    }
}
