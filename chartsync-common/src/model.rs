//! Chart server wire model
//!
//! Score structure returned by the chart server: a score holds staves, a staff
//! holds periods, and each period resolves (via a separate call) to a batch of
//! elements. Field names follow the server's JSON keys, so several Rust names
//! differ from their wire names (`Staff::class_name` is `"name"` on the wire).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Error, Result};

/// Staff form used for gameplay chart data. Only staves of this form take
/// part in downstream filtering.
pub const GAMEPLAY_FORM: &str = "Dremu";

/// Element class tag of a judgement line (main lane)
pub const JUDGEMENT_LINE_CLASS: &str = "Dremu.DremuMainLane";

/// Root snapshot of the chart server's score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreInformation {
    #[serde(default)]
    pub staves: Vec<Staff>,
}

/// A named chart track containing an ordered set of periods
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    /// Unique staff identifier (wire key `name`)
    #[serde(rename = "name", default)]
    pub class_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    /// Category tag, compared against [`GAMEPLAY_FORM`]
    #[serde(default)]
    pub form: String,
    #[serde(default)]
    pub periods: Vec<Period>,
}

/// A named, time-bounded section of a staff
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Lookup token for element retrieval (wire key `name`)
    #[serde(rename = "name", default)]
    pub method_name: String,
    /// Offset in seconds
    #[serde(rename = "timeOffset", default)]
    pub time_offset: f64,
}

/// A typed chart object belonging to a period
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    /// Dotted type tag, e.g. `Dremu.DremuTap`
    #[serde(rename = "className", default)]
    pub class_name: String,
}

impl ScoreInformation {
    pub fn is_empty(&self) -> bool {
        self.staves.is_empty()
    }

    /// Staves whose form matches `form`, in stored order
    pub fn staves_of_form<'a>(&'a self, form: &'a str) -> impl Iterator<Item = &'a Staff> + 'a {
        self.staves.iter().filter(move |staff| staff.form == form)
    }

    pub fn find_staff(&self, class_name: &str) -> Option<&Staff> {
        self.staves.iter().find(|staff| staff.class_name == class_name)
    }

    /// Total number of periods across all staves
    pub fn period_count(&self) -> usize {
        self.staves.iter().map(|staff| staff.periods.len()).sum()
    }

    /// Check identifier uniqueness: staff names across the score, period
    /// names within each staff.
    pub fn validate(&self) -> Result<()> {
        let mut staff_names = HashSet::new();
        for staff in &self.staves {
            if !staff_names.insert(staff.class_name.as_str()) {
                return Err(Error::Domain(format!(
                    "duplicate staff '{}' in score",
                    staff.class_name
                )));
            }

            let mut period_names = HashSet::new();
            for period in &staff.periods {
                if !period_names.insert(period.method_name.as_str()) {
                    return Err(Error::Domain(format!(
                        "duplicate period '{}' in staff '{}'",
                        period.method_name, staff.class_name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Staff {
    pub fn find_period(&self, method_name: &str) -> Option<&Period> {
        self.periods.iter().find(|period| period.method_name == method_name)
    }
}

impl Element {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }

    pub fn is_kind(&self, tag: &str) -> bool {
        self.class_name == tag
    }
}

// ============================================================================
// Editor metadata payloads
// ============================================================================

/// Element type the editor can place, with its injectable fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditableElementInformation {
    #[serde(rename = "className", default)]
    pub class_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub fields: Vec<EditableInjectorFieldInformation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditableInjectorInformation {
    #[serde(rename = "className", default)]
    pub class_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub fields: Vec<EditableInjectorFieldInformation>,
}

/// One injectable field of an element or injector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditableInjectorFieldInformation {
    #[serde(rename = "fieldType", default)]
    pub field_type: String,
    #[serde(rename = "fieldName", default)]
    pub field_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "allowDefault", default)]
    pub allow_default: bool,
}

// ============================================================================
// Note payloads
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TapNote {
    pub insert_index: i32,
    /// Seconds
    pub hit_time: f32,
    pub position: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaplikNote {
    pub insert_index: i32,
    pub hit_time: f32,
    pub position: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DragNote {
    pub insert_index: i32,
    pub hit_time: f32,
    pub position: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldNote {
    pub insert_index: i32,
    pub hit_time: f32,
    pub position: f32,
    /// Hold duration in seconds
    pub hold_time: f32,
}

/// Element placed into a period by injector code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPlacement {
    pub insert_index: i32,
    pub injector_code: String,
}
