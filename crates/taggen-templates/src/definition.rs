//! Template and member definitions

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// Substituted with the instance description in a member's comment template.
pub const PARENT_DESC_PLACEHOLDER: &str = "{parent_desc}";

/// A reusable equipment template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Template name; filled from the map key when loaded from YAML
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<TemplateMember>,
}

/// One member of a template, expanded once per instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMember {
    /// Appended (normalized) to the instance prefix, e.g. `.Run`
    pub suffix: String,
    /// Point TYPE, e.g. `DIGITAL`, `INT`
    #[serde(rename = "type")]
    pub data_type: String,
    /// Appended verbatim to the instance address
    #[serde(default)]
    pub address_offset: String,
    /// Point comment with [`PARENT_DESC_PLACEHOLDER`]
    #[serde(default)]
    pub comment_template: String,
    #[serde(default)]
    pub is_trend: bool,
    #[serde(default)]
    pub is_alarm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_help: Option<String>,
}

impl TemplateMember {
    /// Comment for an instance described as `parent_desc`.
    pub fn render_comment(&self, parent_desc: &str) -> String {
        self.comment_template
            .replace(PARENT_DESC_PLACEHOLDER, parent_desc)
    }

    /// Equipment item name: the suffix without its leading dots.
    pub fn item(&self) -> &str {
        self.suffix.trim_start_matches('.')
    }
}

impl TemplateDefinition {
    pub fn member(&self, suffix: &str) -> Option<&TemplateMember> {
        self.members.iter().find(|m| m.suffix == suffix)
    }

    /// Structural checks. Members with duplicate suffixes would derive
    /// duplicate point names for every instance.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |reason: String| TemplateError::Invalid {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("template has no name".into()));
        }
        if self.members.is_empty() {
            return Err(invalid("template has no members".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for (i, member) in self.members.iter().enumerate() {
            if member.suffix.is_empty() {
                return Err(invalid(format!("member {i} has an empty suffix")));
            }
            if member.data_type.trim().is_empty() {
                return Err(invalid(format!("member {} has no type", member.suffix)));
            }
            if !seen.insert(member.suffix.as_str()) {
                return Err(invalid(format!("duplicate member suffix {}", member.suffix)));
            }
        }

        Ok(())
    }
}
