//! Project-level plan and commit
//!
//! Sequences expand, reconcile and apply over the three families of one
//! project. A plan is plain data: it can be written out, reviewed, and
//! committed later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::apply::{apply, ApplyError, ApplyReport};
use crate::entry::TagDefinitionEntry;
use crate::expand::{Expander, ExpansionWarning};
use crate::project::ProjectFiles;
use crate::reconcile::{reconcile, DiffResult, DiffSummary, ReconcileError};
use crate::records::{AlarmRecord, Family, PointRecord, TableRecord, TrendRecord};

/// Diffs for all three families of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDiff {
    pub generated_at: DateTime<Utc>,
    pub point: DiffResult<PointRecord>,
    pub trend: DiffResult<TrendRecord>,
    pub alarm: DiffResult<AlarmRecord>,
    #[serde(default)]
    pub warnings: Vec<ExpansionWarning>,
}

impl ProjectDiff {
    pub fn is_empty(&self) -> bool {
        self.point.is_empty() && self.trend.is_empty() && self.alarm.is_empty()
    }

    pub fn summary(&self) -> Vec<(Family, DiffSummary)> {
        vec![
            (Family::Point, self.point.summary()),
            (Family::Trend, self.trend.summary()),
            (Family::Alarm, self.alarm.summary()),
        ]
    }
}

/// Expand `entries` and reconcile each family against the project tables.
pub fn plan_project(
    files: &ProjectFiles,
    entries: &[TagDefinitionEntry],
    expander: &Expander<'_>,
    stabilize: bool,
) -> Result<ProjectDiff, ReconcileError> {
    let expansion = expander.expand(entries);

    let diff = ProjectDiff {
        generated_at: Utc::now(),
        point: reconcile_family(expansion.point, files, stabilize)?,
        trend: reconcile_family(expansion.trend, files, stabilize)?,
        alarm: reconcile_family(expansion.alarm, files, stabilize)?,
        warnings: expansion.warnings,
    };

    info!(
        "Planned {:?}: {}",
        files.root,
        if diff.is_empty() { "no changes" } else { "changes pending" }
    );
    Ok(diff)
}

fn reconcile_family<R: TableRecord>(
    staged: Vec<R>,
    files: &ProjectFiles,
    stabilize: bool,
) -> Result<DiffResult<R>, ReconcileError> {
    reconcile(staged, files.path(R::FAMILY), R::KEY_FIELD, stabilize)
}

/// Apply a plan family by family, points first. A failure stops before the
/// remaining families; families already applied stay applied.
pub fn commit_project(
    files: &ProjectFiles,
    diff: &ProjectDiff,
) -> Result<Vec<ApplyReport>, ApplyError> {
    let reports = vec![
        apply(&diff.point, files.path(Family::Point))?,
        apply(&diff.trend, files.path(Family::Trend))?,
        apply(&diff.alarm, files.path(Family::Alarm))?,
    ];

    info!("Committed plan for {:?}", files.root);
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TemplateInstance;
    use taggen_templates::TemplateRegistry;
    use tempfile::TempDir;

    fn motor(name: &str) -> TagDefinitionEntry {
        TemplateInstance {
            name: name.into(),
            template: "Motor_Basic".into(),
            address: "40001".into(),
            description: name.into(),
            is_trend: true,
            is_alarm: true,
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn test_plan_commit_plan_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = ProjectFiles::resolve(temp.path());
        let registry = TemplateRegistry::new();
        let expander = Expander::new(&registry);

        let first = plan_project(&files, &[motor("M1")], &expander, true).unwrap();
        assert_eq!(first.point.new.len(), 3);
        assert_eq!(first.trend.new.len(), 2);
        assert_eq!(first.alarm.new.len(), 1);

        let reports = commit_project(&files, &first).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].appended, 3);

        let second = plan_project(&files, &[motor("M1")], &expander, true).unwrap();
        assert!(second.is_empty(), "{:?}", second.summary());
        assert_eq!(second.point.unchanged.len(), 3);
    }

    #[test]
    fn test_plan_round_trips_through_json() {
        let temp = TempDir::new().unwrap();
        let files = ProjectFiles::resolve(temp.path());
        let registry = TemplateRegistry::new();
        let expander = Expander::new(&registry);

        let plan = plan_project(&files, &[motor("M1")], &expander, true).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: ProjectDiff = serde_json::from_str(&json).unwrap();

        assert_eq!(back, plan);
    }
}
