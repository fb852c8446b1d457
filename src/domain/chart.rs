// Chart domain model - chart kinds and rendered components
use serde::{Deserialize, Serialize};

/// Chart variant. Drives the default reduction recipe and the adapter's styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Line,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AxisAssignment {
    #[default]
    Left,
    Right,
}

/// One logical series a chart renders, matched to a `DataSet` by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartComponentInfo {
    pub label: String,
    pub unit: String,
    pub color: Option<String>,
    #[serde(default)]
    pub axis: AxisAssignment,
}

impl ChartComponentInfo {
    pub fn new(label: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            unit: unit.into(),
            color: None,
            axis: AxisAssignment::Left,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn on_axis(mut self, axis: AxisAssignment) -> Self {
        self.axis = axis;
        self
    }

    /// Legend text, e.g. "Battery (V)".
    pub fn legend(&self) -> String {
        if self.unit.is_empty() {
            self.label.clone()
        } else {
            format!("{} ({})", self.label, self.unit)
        }
    }
}
