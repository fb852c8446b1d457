// Telemetry data domain models
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One historical reading of a component, as delivered by a data source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySample {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl HistorySample {
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self { time, value }
    }
}

/// A chart point. `x` is the formatter's position for the sample time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Entry {
    pub x: f64,
    pub y: f64,
}

impl Entry {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// What the `x` values of a data set represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum XKeys {
    /// Positions produced by an `XFormatter` from dates.
    Date,
    /// Plain indexes with no time meaning.
    Index,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSet {
    pub name: String,
    pub label: String,
    pub keys: XKeys,
    pub entries: Vec<Entry>,
}

impl DataSet {
    pub fn new(name: impl Into<String>, label: impl Into<String>, keys: XKeys, entries: Vec<Entry>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            keys,
            entries,
        }
    }

    pub fn empty(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, XKeys::Date, Vec::new())
    }

    /// Same identity, new entries.
    pub fn with_entries(&self, entries: Vec<Entry>) -> Self {
        Self {
            name: self.name.clone(),
            label: self.label.clone(),
            keys: self.keys,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&Entry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].x <= w[1].x)
    }
}

/// Aggregation bucket used while reducing a data set.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub x: f64,
    pub values: Vec<f64>,
}

impl Partition {
    pub fn new(x: f64) -> Self {
        Self { x, values: Vec::new() }
    }

    pub fn average(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Consumes the bucket, producing its averaged entry (`empty` when no values fell in).
    pub fn into_entry(self, empty: Option<f64>) -> Option<Entry> {
        self.average().or(empty).map(|y| Entry::new(self.x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_average() {
        let mut partition = Partition::new(5.0);
        assert_eq!(partition.average(), None);
        partition.values.extend([1.0, 2.0, 6.0]);
        assert_eq!(partition.into_entry(None), Some(Entry::new(5.0, 3.0)));
    }

    #[test]
    fn test_empty_partition_uses_fallback() {
        assert_eq!(Partition::new(1.0).into_entry(Some(0.0)), Some(Entry::new(1.0, 0.0)));
        assert_eq!(Partition::new(1.0).into_entry(None), None);
    }

    #[test]
    fn test_with_entries_keeps_identity() {
        let ds = DataSet::new("battery", "Battery", XKeys::Date, vec![Entry::new(0.0, 1.0)]);
        let replaced = ds.with_entries(vec![]);
        assert_eq!(replaced.name, "battery");
        assert_eq!(replaced.label, "Battery");
        assert!(replaced.is_empty());
    }
}
