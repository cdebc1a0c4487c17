//! Expansion Engine
//!
//! Turns tag definition entries into point, trend and alarm records. Single
//! tags map one to one; a template instance yields one point per member and
//! trend/alarm records only where both the member and the instance opt in.
//!
//! Output is deterministic: records come out in entry order, then member
//! order. Problems that do not stop expansion (unknown templates, unknown
//! override columns, over-wide values, duplicate keys) are collected as
//! [`ExpansionWarning`]s.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use taggen_dbf::FieldWarning;
use taggen_templates::{TemplateMember, TemplateRegistry};
use tracing::{debug, info, warn};

use crate::config::ExpansionDefaults;
use crate::entry::{SingleTag, TagDefinitionEntry, TemplateInstance};
use crate::normalize::Normalizer;
use crate::records::{AlarmRecord, Family, PointRecord, TableRecord, TrendRecord};

/// Records produced by one expansion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    pub point: Vec<PointRecord>,
    pub trend: Vec<TrendRecord>,
    pub alarm: Vec<AlarmRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ExpansionWarning>,
}

impl Expansion {
    pub fn len(&self) -> usize {
        self.point.len() + self.trend.len() + self.alarm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionWarning {
    /// The instance names a template the registry does not have; it
    /// contributed no records.
    UnknownTemplate { entry: String, template: String },
    /// A field override names a column the family does not have.
    UnknownField {
        entry: String,
        family: Family,
        field: String,
    },
    /// A value is longer than its column and will be cut when written.
    ValueTooWide {
        family: Family,
        key: String,
        field: String,
        width: usize,
        length: usize,
    },
    /// Two records of one family share a key.
    DuplicateKey { family: Family, key: String },
    /// An entry without a name.
    EmptyName { index: usize },
}

impl fmt::Display for ExpansionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTemplate { entry, template } => {
                write!(f, "{entry}: unknown template {template}, no records produced")
            }
            Self::UnknownField {
                entry,
                family,
                field,
            } => write!(f, "{entry}: {family} has no column {field}, override ignored"),
            Self::ValueTooWide {
                family,
                key,
                field,
                width,
                length,
            } => write!(
                f,
                "{family} {key}: {field} is {length} characters, column holds {width}"
            ),
            Self::DuplicateKey { family, key } => write!(f, "duplicate {family} key {key}"),
            Self::EmptyName { index } => write!(f, "entry {index} has no name"),
        }
    }
}

/// Expands entries against an immutable template registry.
#[derive(Debug, Clone)]
pub struct Expander<'a> {
    templates: &'a TemplateRegistry,
    normalizer: Normalizer,
    defaults: ExpansionDefaults,
}

impl<'a> Expander<'a> {
    pub fn new(templates: &'a TemplateRegistry) -> Self {
        Self {
            templates,
            normalizer: Normalizer::default(),
            defaults: ExpansionDefaults::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_defaults(mut self, defaults: ExpansionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn templates(&self) -> &TemplateRegistry {
        self.templates
    }

    pub fn expand(&self, entries: &[TagDefinitionEntry]) -> Expansion {
        let mut out = Expansion::default();

        for (index, entry) in entries.iter().enumerate() {
            if entry.name().trim().is_empty() {
                warn!("Entry {} has no name", index);
                out.warnings.push(ExpansionWarning::EmptyName { index });
            }
            match entry {
                TagDefinitionEntry::Single(tag) => self.expand_single(tag, &mut out),
                TagDefinitionEntry::TemplateInstance(instance) => {
                    self.expand_instance(instance, &mut out)
                }
            }
        }

        check_records(&out.point, &mut out.warnings);
        check_records(&out.trend, &mut out.warnings);
        check_records(&out.alarm, &mut out.warnings);

        info!(
            "Expanded {} entries into {} points, {} trends, {} alarms ({} warnings)",
            entries.len(),
            out.point.len(),
            out.trend.len(),
            out.alarm.len(),
            out.warnings.len()
        );
        out
    }

    // =========================================================================
    // Single tags
    // =========================================================================

    fn expand_single(&self, tag: &SingleTag, out: &mut Expansion) {
        let d = &self.defaults;
        let name = tag.name.as_str();
        let cluster = tag.cluster.as_deref().unwrap_or(&d.cluster);
        let equip = tag.equipment.as_deref().unwrap_or(name);
        let item = tag.item.as_deref().unwrap_or(&d.item);

        debug!(
            "Single {}: trend={} alarm={}",
            name, tag.is_trend, tag.is_alarm
        );

        let mut point = PointRecord {
            name: name.into(),
            data_type: tag.data_type.as_deref().unwrap_or(&d.data_type).into(),
            unit: d.io_device.clone(),
            addr: tag.address.clone(),
            comment: tag.description.clone(),
            equip: equip.into(),
            item: item.into(),
            cluster: cluster.into(),
            eng_units: tag.eng_units.clone(),
            eng_zero: tag.eng_zero.clone(),
            eng_full: tag.eng_full.clone(),
            ..Default::default()
        };
        apply_overrides(&mut point, name, &tag.fields.point, &mut out.warnings);
        out.point.push(point);

        if tag.is_trend {
            let trend_name = tag.trend_name.as_deref().unwrap_or(name);
            let mut trend = TrendRecord {
                name: trend_name.into(),
                expr: name.into(),
                trig: tag.trend_trigger.clone().unwrap_or_default(),
                sampleper: tag
                    .sample_period
                    .as_deref()
                    .unwrap_or(&d.sample_period)
                    .into(),
                trend_type: tag.trend_type.as_deref().unwrap_or(&d.trend_type).into(),
                comment: tag.description.clone(),
                equip: equip.into(),
                item: item.into(),
                cluster: cluster.into(),
                filename: trend_name.into(),
                files: tag.trend_files.as_deref().unwrap_or(&d.trend_files).into(),
                stormethod: tag
                    .trend_storage
                    .as_deref()
                    .unwrap_or(&d.trend_storage)
                    .into(),
                ..Default::default()
            };
            apply_overrides(&mut trend, name, &tag.fields.trend, &mut out.warnings);
            out.trend.push(trend);
        }

        if tag.is_alarm {
            let alarm_name = match &tag.alarm_name {
                Some(n) => n.clone(),
                None => format!("{}{}", name, d.alarm_suffix),
            };
            let mut alarm = AlarmRecord {
                tag: alarm_name.clone(),
                name: alarm_name,
                desc: tag.alarm_help.clone(),
                var_a: name.into(),
                category: tag
                    .alarm_category
                    .as_deref()
                    .unwrap_or(&d.alarm_category)
                    .into(),
                comment: tag.description.clone(),
                equip: equip.into(),
                item: item.into(),
                cluster: cluster.into(),
                help: tag.alarm_help.clone(),
                delay: tag.alarm_delay.as_deref().unwrap_or(&d.alarm_delay).into(),
                ..Default::default()
            };
            apply_overrides(&mut alarm, name, &tag.fields.alarm, &mut out.warnings);
            out.alarm.push(alarm);
        }
    }

    // =========================================================================
    // Template instances
    // =========================================================================

    fn expand_instance(&self, instance: &TemplateInstance, out: &mut Expansion) {
        let Some(template) = self.templates.get(&instance.template) else {
            warn!(
                "{}: unknown template {}, skipping",
                instance.name, instance.template
            );
            out.warnings.push(ExpansionWarning::UnknownTemplate {
                entry: instance.name.clone(),
                template: instance.template.clone(),
            });
            return;
        };

        debug!(
            "Instance {} of {}: {} members, trend={} alarm={}",
            instance.name,
            template.name,
            template.members.len(),
            instance.is_trend,
            instance.is_alarm
        );

        for member in &template.members {
            self.expand_member(instance, member, out);
        }
    }

    fn expand_member(&self, instance: &TemplateInstance, member: &TemplateMember, out: &mut Expansion) {
        let d = &self.defaults;
        let tag_name = format!("{}{}", instance.name, self.normalizer.normalize(&member.suffix));
        let address = format!("{}{}", instance.address, member.address_offset);
        let description = member.render_comment(&instance.description);
        let cluster = instance.cluster.as_deref().unwrap_or(&d.cluster);
        let equip = instance.name.as_str();
        let item = member.item();

        out.point.push(PointRecord {
            name: tag_name.clone(),
            data_type: member.data_type.clone(),
            unit: d.io_device.clone(),
            addr: address,
            comment: description.clone(),
            equip: equip.into(),
            item: item.into(),
            cluster: cluster.into(),
            ..Default::default()
        });

        if member.is_trend && instance.is_trend {
            let sample_period = instance
                .sample_period
                .as_deref()
                .or(member.sample_period.as_deref())
                .unwrap_or(&d.sample_period);

            out.trend.push(TrendRecord {
                name: tag_name.clone(),
                expr: tag_name.clone(),
                sampleper: sample_period.into(),
                trend_type: d.trend_type.clone(),
                comment: description.clone(),
                equip: equip.into(),
                item: item.into(),
                cluster: cluster.into(),
                filename: tag_name.clone(),
                files: d.trend_files.clone(),
                stormethod: d.trend_storage.clone(),
                ..Default::default()
            });
        }

        if member.is_alarm && instance.is_alarm {
            let alarm_name = format!("{}{}", tag_name, d.alarm_suffix);
            let category = instance
                .alarm_category
                .as_deref()
                .or(member.alarm_category.as_deref())
                .unwrap_or(&d.alarm_category);

            out.alarm.push(AlarmRecord {
                tag: alarm_name.clone(),
                name: alarm_name,
                desc: member
                    .alarm_help
                    .clone()
                    .unwrap_or_else(|| description.clone()),
                var_a: tag_name.clone(),
                category: category.into(),
                comment: description.clone(),
                equip: equip.into(),
                item: item.into(),
                cluster: cluster.into(),
                help: member.alarm_help.clone().unwrap_or_default(),
                delay: d.alarm_delay.clone(),
                ..Default::default()
            });
        }
    }
}

/// Expand with default settings.
pub fn expand(entries: &[TagDefinitionEntry], templates: &TemplateRegistry) -> Expansion {
    Expander::new(templates).expand(entries)
}

fn apply_overrides<R: TableRecord>(
    record: &mut R,
    entry: &str,
    overrides: &BTreeMap<String, String>,
    warnings: &mut Vec<ExpansionWarning>,
) {
    for (field, value) in overrides {
        if !record.set(field, value.as_str()) {
            warn!("{}: {} has no column {}", entry, R::FAMILY, field);
            warnings.push(ExpansionWarning::UnknownField {
                entry: entry.to_string(),
                family: R::FAMILY,
                field: field.clone(),
            });
        }
    }
}

fn check_records<R: TableRecord>(records: &[R], warnings: &mut Vec<ExpansionWarning>) {
    let mut seen = HashSet::new();

    for record in records {
        let key = record.key();
        if !key.is_empty() && !seen.insert(key) {
            warn!("Duplicate {} key {}", R::FAMILY, key);
            warnings.push(ExpansionWarning::DuplicateKey {
                family: R::FAMILY,
                key: key.to_string(),
            });
        }

        for violation in record.width_violations() {
            if let FieldWarning::Truncated {
                field,
                width,
                length,
            } = violation
            {
                warn!(
                    "{} {}: {} exceeds {} characters",
                    R::FAMILY,
                    key,
                    field,
                    width
                );
                warnings.push(ExpansionWarning::ValueTooWide {
                    family: R::FAMILY,
                    key: key.to_string(),
                    field,
                    width,
                    length,
                });
            }
        }
    }
}
