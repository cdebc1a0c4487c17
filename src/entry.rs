//! Tag definition entries
//!
//! What a user authors: standalone points, or instances of an equipment
//! template. Entries files are a YAML or JSON list:
//!
//! ```yaml
//! - kind: single
//!   name: LT101
//!   address: "40010"
//!   data_type: INT
//!   is_trend: true
//! - kind: template_instance
//!   name: Pump1
//!   template: Motor_Basic
//!   address: "40001"
//!   description: Main Pump
//!   is_trend: true
//!   is_alarm: true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagDefinitionEntry {
    Single(SingleTag),
    TemplateInstance(TemplateInstance),
}

impl TagDefinitionEntry {
    /// Point name for a single tag, prefix for a template instance.
    pub fn name(&self) -> &str {
        match self {
            Self::Single(tag) => &tag.name,
            Self::TemplateInstance(instance) => &instance.name,
        }
    }
}

impl From<SingleTag> for TagDefinitionEntry {
    fn from(tag: SingleTag) -> Self {
        Self::Single(tag)
    }
}

impl From<TemplateInstance> for TagDefinitionEntry {
    fn from(instance: TemplateInstance) -> Self {
        Self::TemplateInstance(instance)
    }
}

/// A standalone point with optional trend and alarm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleTag {
    pub name: String,
    pub address: String,
    pub data_type: Option<String>,
    pub description: String,
    pub cluster: Option<String>,
    /// Defaults to the tag name
    pub equipment: Option<String>,
    pub item: Option<String>,
    pub eng_units: String,
    pub eng_zero: String,
    pub eng_full: String,

    pub is_trend: bool,
    /// Trend NAME and FILENAME; defaults to the tag name
    pub trend_name: Option<String>,
    pub sample_period: Option<String>,
    pub trend_type: Option<String>,
    pub trend_files: Option<String>,
    pub trend_storage: Option<String>,
    pub trend_trigger: Option<String>,

    pub is_alarm: bool,
    /// Alarm TAG and NAME; defaults to the tag name plus the alarm suffix
    pub alarm_name: Option<String>,
    pub alarm_category: Option<String>,
    pub alarm_help: String,
    pub alarm_delay: Option<String>,

    /// Raw column values applied after everything else
    #[serde(skip_serializing_if = "FieldOverrides::is_empty")]
    pub fields: FieldOverrides,
}

/// Column name to value, per family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOverrides {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub point: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub trend: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub alarm: BTreeMap<String, String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.point.is_empty() && self.trend.is_empty() && self.alarm.is_empty()
    }
}

/// An instance of a named template under a name prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateInstance {
    /// Prefix for every derived point name, and the EQUIP of every record
    pub name: String,
    pub template: String,
    /// Base address the member offsets are appended to
    pub address: String,
    pub description: String,
    pub cluster: Option<String>,
    /// Master switch; a member trends only if it opts in too
    pub is_trend: bool,
    /// Master switch; a member alarms only if it opts in too
    pub is_alarm: bool,
    pub sample_period: Option<String>,
    pub alarm_category: Option<String>,
}

/// Read entries from a `.json` file, or YAML for any other extension.
pub fn load_entries(path: &Path) -> Result<Vec<TagDefinitionEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}
