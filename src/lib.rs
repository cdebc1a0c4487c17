//! SCADA tag generation
//!
//! Turns tag definitions (single points and equipment template instances)
//! into point, trend and alarm records, and keeps a project's three table
//! files in step with them across repeated runs:
//!
//! ```text
//! entries ─► expand ─► records ─► reconcile (reads table) ─► diff ─► apply (writes table)
//! ```
//!
//! - [`normalize()`] maps synthesized name parts into the tag alphabet
//! - [`expand()`] derives records from entries and a [`TemplateRegistry`]
//! - [`reconcile()`] classifies records against an existing table
//! - [`apply()`] commits a diff, keeping a `.bak` of the previous table
//! - [`sync`] runs the above for all three families of a project
//! - [`import_project`] reads a project back into entries
//!
//! The fixed-width table codec lives in `taggen-dbf`, templates in
//! `taggen-templates`.

pub mod apply;
pub mod config;
pub mod entry;
pub mod expand;
pub mod import;
pub mod normalize;
pub mod project;
pub mod reconcile;
pub mod records;
pub mod sync;

pub use apply::{apply, backup_path, ApplyError, ApplyReport, ApplyWarning};
pub use config::{ConfigError, ExpansionDefaults, Settings};
pub use entry::{load_entries, FieldOverrides, SingleTag, TagDefinitionEntry, TemplateInstance};
pub use expand::{expand, Expander, Expansion, ExpansionWarning};
pub use import::{import_project, ImportError, ImportWarning, ImportedProject, LeftOutRow};
pub use normalize::{normalize, Normalizer, Replacement};
pub use project::ProjectFiles;
pub use reconcile::{
    reconcile, reconcile_with, DiffResult, DiffSummary, FieldChange, ModifiedRecord,
    ReconcileError,
};
pub use records::{
    AlarmRecord, Family, PointRecord, TableRecord, TrendRecord, ALARM_SCHEMA, POINT_SCHEMA,
    TREND_SCHEMA,
};
pub use sync::{commit_project, plan_project, ProjectDiff};

pub use taggen_dbf as dbf;
pub use taggen_templates::{TemplateDefinition, TemplateMember, TemplateRegistry};
