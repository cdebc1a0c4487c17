//! Settings loader
//!
//! Expansion defaults, normalizer rules and template overrides, read from a
//! YAML file. Every key is optional; a missing file means built-in defaults.
//!
//! Path resolution order for [`Settings::from_env`]:
//! 1. `TAGGEN_CONFIG` environment variable
//! 2. `taggen.yaml` in the working directory
//! 3. built-in defaults

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use taggen_templates::{TemplateDefinition, TemplateError, TemplateRegistry};
use thiserror::Error;
use tracing::{debug, info};

use crate::expand::Expander;
use crate::normalize::{default_replacements, Normalizer, Replacement, DEFAULT_ALLOWED_SYMBOLS};

pub const CONFIG_ENV_VAR: &str = "TAGGEN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "taggen.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("template `{0}` is defined more than once")]
    DuplicateTemplate(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Values used for every field an entry does not set itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionDefaults {
    pub cluster: String,
    /// Point UNIT column
    pub io_device: String,
    pub data_type: String,
    pub item: String,
    pub sample_period: String,
    pub trend_type: String,
    pub trend_files: String,
    pub trend_storage: String,
    pub alarm_category: String,
    pub alarm_delay: String,
    /// Appended to a point name to form its alarm tag
    pub alarm_suffix: String,
}

impl Default for ExpansionDefaults {
    fn default() -> Self {
        Self {
            cluster: "Cluster1".into(),
            io_device: "IO_DEV_1".into(),
            data_type: "DIGITAL".into(),
            item: "Value".into(),
            sample_period: "00:00:01".into(),
            trend_type: "TRN_PERIODIC".into(),
            trend_files: "2".into(),
            trend_storage: "Scaled".into(),
            alarm_category: "1".into(),
            alarm_delay: "0".into(),
            alarm_suffix: "_Alm".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub defaults: ExpansionDefaults,
    /// Normalizer substitutions, applied in order
    pub replacements: Vec<Replacement>,
    /// Symbols the normalizer passes through besides letters, digits and `_`
    pub allowed_symbols: String,
    /// Templates merged over the built-ins
    pub templates: Vec<TemplateDefinition>,
    /// Directory of template YAML files, merged after `templates`
    pub templates_dir: Option<PathBuf>,
    /// Keep point GUIDs stable across regenerations
    pub stabilize_identifiers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            defaults: ExpansionDefaults::default(),
            replacements: default_replacements(),
            allowed_symbols: DEFAULT_ALLOWED_SYMBOLS.into(),
            templates: Vec::new(),
            templates_dir: None,
            stabilize_identifiers: true,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// A relative `templates_dir` is taken relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading settings from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut settings = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load {}", path.display()))?;

        if let (Some(dir), Some(base)) = (&settings.templates_dir, path.parent()) {
            if dir.is_relative() {
                settings.templates_dir = Some(base.join(dir));
            }
        }

        Ok(settings)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml).context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve the settings file from the environment, falling back to
    /// defaults when there is none.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        debug!("No settings file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for template in &self.templates {
            template.validate()?;
            if !names.insert(template.name.as_str()) {
                return Err(ConfigError::DuplicateTemplate(template.name.clone()));
            }
        }

        if self.defaults.alarm_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "defaults.alarm_suffix",
                reason: "alarm tags would collide with point names".into(),
            });
        }
        if self.allowed_symbols.contains('^') {
            return Err(ConfigError::Invalid {
                key: "allowed_symbols",
                reason: "`^` is the escape marker".into(),
            });
        }

        Ok(())
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.replacements.clone(), &self.allowed_symbols)
    }

    /// Built-in templates, then `templates`, then `templates_dir`.
    pub fn template_registry(&self) -> Result<TemplateRegistry> {
        let mut registry = TemplateRegistry::new();

        for template in &self.templates {
            registry.register(template.clone());
        }

        if let Some(dir) = &self.templates_dir {
            let loaded = TemplateRegistry::load_from_dir(dir)
                .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
            registry.merge(loaded);
        }

        debug!("Template registry: {:?}", registry.names());
        Ok(registry)
    }

    pub fn expander<'a>(&self, templates: &'a TemplateRegistry) -> Expander<'a> {
        Expander::new(templates)
            .with_normalizer(self.normalizer())
            .with_defaults(self.defaults.clone())
    }
}
