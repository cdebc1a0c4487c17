//! Typed records for the three table families
//!
//! One struct per family carrying exactly the family's columns. Serde names
//! every field after its column, so a record serializes as the row it becomes.
//! [`TableRecord`] is the exhaustive column mapping used by the reconciler,
//! the applier and import.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use taggen_dbf::{FieldSpec, FieldWarning, Row};

/// Opaque identifier column on point records.
pub const GUID_FIELD: &str = "GUID";
/// Identifier column older projects carry instead of [`GUID_FIELD`].
pub const LEGACY_ID_FIELD: &str = "OID";

// =============================================================================
// Family
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Point,
    Trend,
    Alarm,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Point, Family::Trend, Family::Alarm];

    /// File name stem inside a project directory.
    pub fn file_stem(self) -> &'static str {
        match self {
            Family::Point => "variable",
            Family::Trend => "trend",
            Family::Alarm => "digalm",
        }
    }

    pub fn key_field(self) -> &'static str {
        match self {
            Family::Point => PointRecord::KEY_FIELD,
            Family::Trend => TrendRecord::KEY_FIELD,
            Family::Alarm => AlarmRecord::KEY_FIELD,
        }
    }

    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            Family::Point => POINT_SCHEMA,
            Family::Trend => TREND_SCHEMA,
            Family::Alarm => ALARM_SCHEMA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Family::Point => "point",
            Family::Trend => "trend",
            Family::Alarm => "alarm",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "point" | "variable" => Ok(Family::Point),
            "trend" => Ok(Family::Trend),
            "alarm" | "digalm" => Ok(Family::Alarm),
            other => Err(format!("unknown table family: {other}")),
        }
    }
}

// =============================================================================
// TableRecord
// =============================================================================

/// A record of one family, convertible to and from a table row.
pub trait TableRecord:
    Clone + Default + fmt::Debug + PartialEq + Serialize + DeserializeOwned
{
    const FAMILY: Family;
    /// Columns in file order, used when a table has to be created.
    const SCHEMA: &'static [FieldSpec];
    /// Column that identifies a record within its table.
    const KEY_FIELD: &'static str;

    /// Value of `column`, `None` if the family has no such column.
    fn get(&self, column: &str) -> Option<&str>;

    fn field_mut(&mut self, column: &str) -> Option<&mut String>;

    fn key(&self) -> &str {
        self.get(Self::KEY_FIELD).unwrap_or_default()
    }

    /// Set `column`, returning false if the family has no such column.
    fn set(&mut self, column: &str, value: impl Into<String>) -> bool {
        match self.field_mut(column) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Every column with its value, in schema order.
    fn fields(&self) -> Vec<(&'static str, &str)> {
        Self::SCHEMA
            .iter()
            .map(|spec| (spec.name, self.get(spec.name).unwrap_or_default()))
            .collect()
    }

    /// Build from a decoded row; columns the family does not define are
    /// ignored.
    fn from_row(row: &Row) -> Self {
        let mut record = Self::default();
        for (column, value) in row {
            record.set(column, value.as_str());
        }
        record
    }

    fn to_row(&self) -> Row {
        self.fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Values that do not fit their column and would be cut on write.
    fn width_violations(&self) -> Vec<FieldWarning> {
        Self::SCHEMA
            .iter()
            .filter_map(|spec| {
                let length = self.get(spec.name)?.chars().count();
                let width = usize::from(spec.width);
                (length > width).then(|| FieldWarning::Truncated {
                    field: spec.name.to_string(),
                    width,
                    length,
                })
            })
            .collect()
    }
}

macro_rules! table_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident : $family:expr, key = $key:literal, schema = $schema:ident {
            $( $field:ident => $column:literal ( $width:literal ) ),* $(,)?
        }
    ) => {
        pub const $schema: &[FieldSpec] = &[ $( FieldSpec::character($column, $width) ),* ];

        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $(
                #[serde(rename = $column)]
                pub $field: String,
            )*
        }

        impl TableRecord for $name {
            const FAMILY: Family = $family;
            const SCHEMA: &'static [FieldSpec] = $schema;
            const KEY_FIELD: &'static str = $key;

            fn get(&self, column: &str) -> Option<&str> {
                match column {
                    $( $column => Some(self.$field.as_str()), )*
                    _ => None,
                }
            }

            fn field_mut(&mut self, column: &str) -> Option<&mut String> {
                match column {
                    $( $column => Some(&mut self.$field), )*
                    _ => None,
                }
            }
        }
    };
}

table_record! {
    /// One addressable process value (`variable.dbf`).
    pub struct PointRecord: Family::Point, key = "NAME", schema = POINT_SCHEMA {
        name => "NAME"(79),
        data_type => "TYPE"(16),
        unit => "UNIT"(31),
        addr => "ADDR"(254),
        raw_zero => "RAW_ZERO"(11),
        raw_full => "RAW_FULL"(11),
        eng_zero => "ENG_ZERO"(11),
        eng_full => "ENG_FULL"(11),
        eng_units => "ENG_UNITS"(8),
        format => "FORMAT"(11),
        comment => "COMMENT"(254),
        editcode => "EDITCODE"(16),
        linked => "LINKED"(1),
        oid => "OID"(10),
        ref1 => "REF1"(11),
        ref2 => "REF2"(11),
        deadband => "DEADBAND"(11),
        custom => "CUSTOM"(128),
        taggenlink => "TAGGENLINK"(32),
        cluster => "CLUSTER"(16),
        equip => "EQUIP"(254),
        item => "ITEM"(63),
        historian => "HISTORIAN"(6),
        custom1 => "CUSTOM1"(254),
        custom2 => "CUSTOM2"(254),
        custom3 => "CUSTOM3"(254),
        custom4 => "CUSTOM4"(254),
        custom5 => "CUSTOM5"(254),
        custom6 => "CUSTOM6"(254),
        custom7 => "CUSTOM7"(254),
        custom8 => "CUSTOM8"(254),
        writeroles => "WRITEROLES"(254),
        guid => "GUID"(36),
    }
}

table_record! {
    /// Historian configuration for a point (`trend.dbf`).
    pub struct TrendRecord: Family::Trend, key = "NAME", schema = TREND_SCHEMA {
        name => "NAME"(79),
        expr => "EXPR"(254),
        trig => "TRIG"(254),
        sampleper => "SAMPLEPER"(16),
        priv_ => "PRIV"(16),
        area => "AREA"(16),
        eng_units => "ENG_UNITS"(8),
        format => "FORMAT"(11),
        filename => "FILENAME"(253),
        files => "FILES"(4),
        time => "TIME"(32),
        period => "PERIOD"(32),
        comment => "COMMENT"(254),
        trend_type => "TYPE"(32),
        spcflag => "SPCFLAG"(4),
        lsl => "LSL"(16),
        usl => "USL"(16),
        subgrpsize => "SUBGRPSIZE"(8),
        xdoublebar => "XDOUBLEBAR"(16),
        range => "RANGE"(16),
        sdeviation => "SDEVIATION"(16),
        stormethod => "STORMETHOD"(64),
        cluster => "CLUSTER"(16),
        taggenlink => "TAGGENLINK"(32),
        editcode => "EDITCODE"(16),
        linked => "LINKED"(1),
        deadband => "DEADBAND"(16),
        equip => "EQUIP"(254),
        item => "ITEM"(63),
        historian => "HISTORIAN"(6),
        eng_zero => "ENG_ZERO"(11),
        eng_full => "ENG_FULL"(11),
    }
}

table_record! {
    /// Digital alarm on a point (`digalm.dbf`).
    pub struct AlarmRecord: Family::Alarm, key = "TAG", schema = ALARM_SCHEMA {
        tag => "TAG"(79),
        name => "NAME"(79),
        desc => "DESC"(254),
        var_a => "VAR_A"(254),
        var_b => "VAR_B"(254),
        category => "CATEGORY"(16),
        help => "HELP"(64),
        priv_ => "PRIV"(16),
        area => "AREA"(16),
        comment => "COMMENT"(254),
        sequence => "SEQUENCE"(16),
        delay => "DELAY"(16),
        custom1 => "CUSTOM1"(64),
        custom2 => "CUSTOM2"(64),
        custom3 => "CUSTOM3"(64),
        custom4 => "CUSTOM4"(64),
        custom5 => "CUSTOM5"(64),
        custom6 => "CUSTOM6"(64),
        custom7 => "CUSTOM7"(64),
        custom8 => "CUSTOM8"(64),
        cluster => "CLUSTER"(16),
        taggenlink => "TAGGENLINK"(32),
        paging => "PAGING"(8),
        paginggrp => "PAGINGGRP"(80),
        editcode => "EDITCODE"(16),
        linked => "LINKED"(1),
        equip => "EQUIP"(254),
        item => "ITEM"(63),
        historian => "HISTORIAN"(6),
    }
}
