//! Importing a project and regenerating from the imported entries leaves the
//! tables untouched.

use pretty_assertions::assert_eq;
use taggen::{
    apply, commit_project, import_project, plan_project, DiffResult, Expander, Family,
    LeftOutRow, ProjectFiles, TableRecord, TagDefinitionEntry, TemplateInstance,
    TemplateRegistry, TrendRecord,
};
use tempfile::TempDir;

fn seed_project(files: &ProjectFiles) {
    let registry = TemplateRegistry::new();
    let expander = Expander::new(&registry);
    let entries: Vec<TagDefinitionEntry> = ["Conveyor1", "Conveyor2"]
        .into_iter()
        .map(|name| {
            TemplateInstance {
                name: name.into(),
                template: "Motor_Basic".into(),
                address: "40001".into(),
                description: format!("{name} drive"),
                is_trend: true,
                is_alarm: true,
                ..Default::default()
            }
            .into()
        })
        .collect();

    let plan = plan_project(files, &entries, &expander, true).unwrap();
    commit_project(files, &plan).unwrap();
}

#[test]
fn imported_entries_regenerate_the_same_tables() {
    let temp = TempDir::new().unwrap();
    let files = ProjectFiles::resolve(temp.path());
    seed_project(&files);

    let imported = import_project(&files).unwrap();
    assert_eq!(imported.entries.len(), 6);
    assert!(imported.warnings.is_empty(), "{:?}", imported.warnings);

    let registry = TemplateRegistry::empty();
    let expander = Expander::new(&registry);
    let plan = plan_project(&files, &imported.entries, &expander, true).unwrap();

    assert!(plan.is_empty(), "{:?}", plan.summary());
    assert_eq!(plan.point.unchanged.len(), 6);
    assert_eq!(plan.trend.unchanged.len(), 4);
    assert_eq!(plan.alarm.unchanged.len(), 2);
}

#[test]
fn dropping_an_imported_entry_orphans_its_rows() {
    let temp = TempDir::new().unwrap();
    let files = ProjectFiles::resolve(temp.path());
    seed_project(&files);

    let mut imported = import_project(&files).unwrap();
    imported
        .entries
        .retain(|entry| !entry.name().starts_with("Conveyor2"));

    let registry = TemplateRegistry::empty();
    let plan = plan_project(&files, &imported.entries, &Expander::new(&registry), true).unwrap();

    assert_eq!(plan.point.orphaned.len(), 3);
    assert_eq!(plan.trend.orphaned.len(), 2);
    assert_eq!(plan.alarm.orphaned.len(), 1);
    assert!(plan.point.new.is_empty());

    commit_project(&files, &plan).unwrap();
    let again = import_project(&files).unwrap();
    assert_eq!(again.entries.len(), 3);
}

#[test]
fn rows_left_out_of_an_import_are_what_the_next_plan_orphans() {
    let temp = TempDir::new().unwrap();
    let files = ProjectFiles::resolve(temp.path());
    seed_project(&files);
    apply(
        &DiffResult {
            new: vec![TrendRecord {
                name: "Spare_Trend".into(),
                ..Default::default()
            }],
            ..Default::default()
        },
        files.path(Family::Trend),
    )
    .unwrap();

    let imported = import_project(&files).unwrap();
    assert_eq!(
        imported.left_out,
        vec![LeftOutRow {
            family: Family::Trend,
            key: "Spare_Trend".into(),
        }]
    );

    let registry = TemplateRegistry::empty();
    let plan = plan_project(&files, &imported.entries, &Expander::new(&registry), true).unwrap();

    let orphaned: Vec<&str> = plan.trend.orphaned.iter().map(|r| r.key()).collect();
    assert_eq!(orphaned, vec!["Spare_Trend"]);
    assert!(plan.point.is_empty());
    assert!(plan.alarm.is_empty());
    assert!(plan.trend.new.is_empty() && plan.trend.modified.is_empty());
}
