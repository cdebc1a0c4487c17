//! Template Registry
//!
//! Built-in templates are registered in code; project or site overrides come
//! from YAML (a map of template name to definition) and replace built-ins of
//! the same name. Expansion only ever sees a `&TemplateRegistry`.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::definition::{TemplateDefinition, TemplateMember};
use crate::error::TemplateError;

#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateDefinition>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    /// Registry holding the built-in templates
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Registry with nothing in it
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Parse a YAML map of name -> definition into a registry of just those
    /// templates.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TemplateError> {
        let mut registry = Self::empty();
        registry.add_yaml(yaml)?;
        Ok(registry)
    }

    /// Load every `*.yaml` / `*.yml` file under `dir` (recursive).
    ///
    /// A missing directory is an empty registry. A file that fails to parse
    /// is logged and skipped.
    pub fn load_from_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut registry = Self::empty();

        if !dir.exists() {
            warn!("Templates directory does not exist: {:?}", dir);
            return Ok(registry);
        }

        registry.load_dir_recursive(dir)?;

        info!("Loaded {} templates from {:?}", registry.len(), dir);
        Ok(registry)
    }

    fn load_dir_recursive(&mut self, dir: &Path) -> Result<(), TemplateError> {
        let io = |e: std::io::Error| TemplateError::Io {
            path: dir.to_path_buf(),
            source: e,
        };

        let mut paths = std::fs::read_dir(dir)
            .map_err(io)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(io)?;
        // later files override earlier ones, so keep the order stable
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.load_dir_recursive(&path)?;
            } else if path
                .extension()
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false)
            {
                match self.load_file(&path) {
                    Ok(count) => debug!("Loaded {} templates from {:?}", count, path),
                    Err(e) => warn!("Failed to load templates from {:?}: {}", path, e),
                }
            }
        }

        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<usize, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.add_yaml(&content).map_err(|e| match e {
            TemplateError::Parse(source) => TemplateError::ParseFile {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    fn add_yaml(&mut self, yaml: &str) -> Result<usize, TemplateError> {
        let parsed: BTreeMap<String, TemplateDefinition> = serde_yaml::from_str(yaml)?;

        // validate the whole document before registering any of it
        let mut defs = Vec::with_capacity(parsed.len());
        for (name, mut def) in parsed {
            def.name = name;
            def.validate()?;
            defs.push(def);
        }

        let count = defs.len();
        for def in defs {
            self.register(def);
        }
        Ok(count)
    }

    /// Register a template, returning the one it replaced.
    pub fn register(&mut self, template: TemplateDefinition) -> Option<TemplateDefinition> {
        let replaced = self.templates.insert(template.name.clone(), template);
        if let Some(old) = &replaced {
            debug!("Template {} overridden", old.name);
        }
        replaced
    }

    /// Register every template of `overrides`, replacing same-named ones.
    pub fn merge(&mut self, overrides: TemplateRegistry) {
        for (_, template) in overrides.templates {
            self.register(template);
        }
    }

    pub fn get(&self, name: &str) -> Option<&TemplateDefinition> {
        self.templates.get(name)
    }

    /// Template names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(|s| s.as_str()).collect()
    }

    pub fn list(&self) -> Vec<&TemplateDefinition> {
        self.templates.values().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn register_builtins(&mut self) {
        self.register(Self::motor_basic());
        self.register(Self::valve_basic());
    }

    // =========================================================================
    // Built-in templates
    // =========================================================================

    fn motor_basic() -> TemplateDefinition {
        TemplateDefinition {
            name: "Motor_Basic".into(),
            description: "Basic Motor Control".into(),
            members: vec![
                TemplateMember {
                    suffix: ".Run".into(),
                    data_type: "DIGITAL".into(),
                    address_offset: ".RunStatus".into(),
                    comment_template: "{parent_desc} Run Status".into(),
                    is_trend: true,
                    ..Default::default()
                },
                TemplateMember {
                    suffix: ".Fault".into(),
                    data_type: "DIGITAL".into(),
                    address_offset: ".Fault".into(),
                    comment_template: "{parent_desc} Fault".into(),
                    is_trend: true,
                    is_alarm: true,
                    alarm_category: Some("ALM_CRIT".into()),
                    alarm_help: Some("Check motor breaker".into()),
                    ..Default::default()
                },
                TemplateMember {
                    suffix: ".Mode".into(),
                    data_type: "INT".into(),
                    address_offset: ".Mode".into(),
                    comment_template: "{parent_desc} Control Mode".into(),
                    ..Default::default()
                },
            ],
        }
    }

    fn valve_basic() -> TemplateDefinition {
        TemplateDefinition {
            name: "Valve_Basic".into(),
            description: "Basic Valve Control".into(),
            members: vec![
                TemplateMember {
                    suffix: ".Open".into(),
                    data_type: "DIGITAL".into(),
                    address_offset: ".Opened".into(),
                    comment_template: "{parent_desc} Open Limit".into(),
                    is_trend: true,
                    ..Default::default()
                },
                TemplateMember {
                    suffix: ".Closed".into(),
                    data_type: "DIGITAL".into(),
                    address_offset: ".Closed".into(),
                    comment_template: "{parent_desc} Closed Limit".into(),
                    is_trend: true,
                    ..Default::default()
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PUMP_YAML: &str = r#"
Pump_Basic:
  description: Basic pump
  members:
    - suffix: .Run
      type: DIGITAL
      address_offset: .RunStatus
      comment_template: "{parent_desc} Run Status"
      is_trend: true
"#;

    fn create_test_yaml(dir: &Path, name: &str, content: &str) {
        let path = dir.join(format!("{}.yaml", name));
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TemplateRegistry::new();
        assert_eq!(registry.names(), vec!["Motor_Basic", "Valve_Basic"]);

        let motor = registry.get("Motor_Basic").unwrap();
        assert_eq!(motor.members.len(), 3);
        let fault = motor.member(".Fault").unwrap();
        assert!(fault.is_alarm && fault.is_trend);
        assert_eq!(fault.alarm_category.as_deref(), Some("ALM_CRIT"));

        for template in registry.list() {
            template.validate().unwrap();
        }
    }

    #[test]
    fn test_from_yaml_str_names_from_keys() {
        let registry = TemplateRegistry::from_yaml_str(PUMP_YAML).unwrap();
        assert_eq!(registry.len(), 1);

        let pump = registry.get("Pump_Basic").unwrap();
        assert_eq!(pump.name, "Pump_Basic");
        assert_eq!(pump.members[0].address_offset, ".RunStatus");
    }

    #[test]
    fn test_from_yaml_str_rejects_invalid_template() {
        let yaml = r#"
Broken:
  members: []
"#;
        assert!(matches!(
            TemplateRegistry::from_yaml_str(yaml),
            Err(TemplateError::Invalid { .. })
        ));
        assert!(matches!(
            TemplateRegistry::from_yaml_str("- not a map"),
            Err(TemplateError::Parse(_))
        ));
    }

    #[test]
    fn test_merge_overrides_builtin() {
        let mut registry = TemplateRegistry::new();
        let overrides = TemplateRegistry::from_yaml_str(
            r#"
Valve_Basic:
  description: Valve with travel alarm
  members:
    - suffix: .Travel
      type: DIGITAL
      is_alarm: true
"#,
        )
        .unwrap();

        registry.merge(overrides);

        assert_eq!(registry.len(), 2);
        let valve = registry.get("Valve_Basic").unwrap();
        assert_eq!(valve.description, "Valve with travel alarm");
        assert_eq!(valve.members.len(), 1);
    }

    #[test]
    fn test_load_from_dir() {
        let temp = TempDir::new().unwrap();
        create_test_yaml(temp.path(), "pump", PUMP_YAML);
        std::fs::create_dir(temp.path().join("site")).unwrap();
        create_test_yaml(
            &temp.path().join("site"),
            "fan",
            r#"
Fan:
  members:
    - suffix: .Speed
      type: REAL
"#,
        );
        create_test_yaml(temp.path(), "broken", "Oops: [");
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let registry = TemplateRegistry::load_from_dir(temp.path()).unwrap();
        assert_eq!(registry.names(), vec!["Fan", "Pump_Basic"]);
    }

    #[test]
    fn test_load_from_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = TemplateRegistry::load_from_dir(&temp.path().join("nope")).unwrap();
        assert!(registry.is_empty());
    }
}
