// Period table - quantity options and axis label formats per period
use super::period::Period;
use crate::error::{ChartError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One row of the table, as it appears in configuration.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PeriodOptions {
    pub period: Period,
    #[serde(default)]
    pub quantities: Vec<u32>,
    pub display_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct PeriodEntry {
    quantities: Vec<u32>,
    display_format: String,
}

/// Immutable lookup built once at startup and shared by the charts that need it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTable {
    entries: BTreeMap<Period, PeriodEntry>,
}

impl Default for PeriodTable {
    fn default() -> Self {
        let rows: [(Period, &[u32], &str); 7] = [
            (Period::Millisecond, &[100, 250, 500], "%H:%M:%S%.3f"),
            (Period::Second, &[1, 5, 10, 30], "%H:%M:%S"),
            (Period::Minute, &[1, 5, 10, 15, 30], "%H:%M"),
            (Period::Hour, &[1, 3, 6, 12], "%H:%M"),
            (Period::Day, &[1, 2, 7, 14], "%d/%m %H:%M"),
            (Period::Month, &[1, 3, 6], "%d/%m"),
            (Period::Year, &[1, 2, 5], "%m/%Y"),
        ];

        let entries = rows
            .into_iter()
            .map(|(period, quantities, format)| {
                (
                    period,
                    PeriodEntry {
                        quantities: quantities.to_vec(),
                        display_format: format.to_string(),
                    },
                )
            })
            .collect();

        Self { entries }
    }
}

impl PeriodTable {
    /// Default table with the given rows layered on top.
    pub fn with_overrides(overrides: &[PeriodOptions]) -> Result<Self> {
        let mut table = Self::default();
        for row in overrides {
            if let Some(bad) = row.quantities.iter().find(|q| **q == 0) {
                return Err(ChartError::InvalidQuantity(*bad as i64));
            }
            let entry = table
                .entries
                .get_mut(&row.period)
                .ok_or_else(|| ChartError::InvalidPeriod(row.period.to_string()))?;
            if !row.quantities.is_empty() {
                let mut quantities = row.quantities.clone();
                quantities.sort_unstable();
                quantities.dedup();
                entry.quantities = quantities;
            }
            if let Some(format) = &row.display_format {
                entry.display_format = format.clone();
            }
        }
        Ok(table)
    }

    pub fn quantities(&self, period: Period) -> &[u32] {
        self.entries
            .get(&period)
            .map(|e| e.quantities.as_slice())
            .unwrap_or(&[])
    }

    pub fn display_format(&self, period: Period) -> &str {
        self.entries
            .get(&period)
            .map(|e| e.display_format.as_str())
            .unwrap_or("%Y-%m-%d %H:%M:%S")
    }

    pub fn default_quantity(&self, period: Period) -> u32 {
        self.quantities(period).first().copied().unwrap_or(1)
    }
}
