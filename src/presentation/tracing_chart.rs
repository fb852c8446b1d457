// Tracing chart - headless chart adapter that logs what a widget would draw
use crate::application::chart_adapter::{ChartAdapter, DateXFormatter, XFormatter};
use crate::domain::chart::{ChartComponentInfo, ChartKind};
use crate::domain::period::Period;
use crate::domain::telemetry::DataSet;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct TracingChart {
    id: String,
    kind: ChartKind,
    period: Period,
    formatter: Arc<DateXFormatter>,
    components: HashMap<String, ChartComponentInfo>,
    data_sets: BTreeMap<String, DataSet>,
    redraws: usize,
}

impl TracingChart {
    pub fn new(id: impl Into<String>, kind: ChartKind, period: Period, formatter: DateXFormatter) -> Self {
        Self {
            id: id.into(),
            kind,
            period,
            formatter: Arc::new(formatter),
            components: HashMap::new(),
            data_sets: BTreeMap::new(),
            redraws: 0,
        }
    }

    pub fn with_component(mut self, name: impl Into<String>, info: ChartComponentInfo) -> Self {
        self.components.insert(name.into(), info);
        self
    }

    pub fn data_set(&self, name: &str) -> Option<&DataSet> {
        self.data_sets.get(name)
    }

    pub fn data_sets(&self) -> impl Iterator<Item = &DataSet> {
        self.data_sets.values()
    }

    pub fn redraws(&self) -> usize {
        self.redraws
    }

    /// One line per data set: legend, point count and x range as axis labels.
    pub fn summary(&self) -> Vec<String> {
        self.data_sets
            .values()
            .map(|ds| match (ds.first(), ds.last()) {
                (Some(first), Some(last)) => format!(
                    "{}: {} points, {} .. {}",
                    ds.label,
                    ds.len(),
                    self.formatter.format_label(first.x, self.period),
                    self.formatter.format_label(last.x, self.period)
                ),
                _ => format!("{}: no data", ds.label),
            })
            .collect()
    }
}

impl ChartAdapter for TracingChart {
    fn kind(&self) -> ChartKind {
        self.kind
    }

    fn x_formatter(&self) -> Arc<dyn XFormatter> {
        self.formatter.clone()
    }

    fn data_set_label(&self, name: &str) -> String {
        self.components
            .get(name)
            .map(ChartComponentInfo::legend)
            .unwrap_or_else(|| name.to_string())
    }

    fn add_data_set(&mut self, data_set: DataSet) {
        tracing::debug!(
            "Chart {} adding {} with {} points",
            self.id,
            data_set.name,
            data_set.len()
        );
        self.data_sets.insert(data_set.name.clone(), data_set);
    }

    fn remove_data_set(&mut self, name: &str) {
        if self.data_sets.remove(name).is_some() {
            tracing::debug!("Chart {} removed {}", self.id, name);
        }
    }

    fn invalidate(&mut self) {
        self.redraws += 1;
        tracing::info!(
            "Chart {} redraw #{} with {} data sets",
            self.id,
            self.redraws,
            self.data_sets.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::period_table::PeriodTable;
    use crate::domain::telemetry::{Entry, XKeys};
    use chrono::{TimeZone, Utc};

    fn chart() -> TracingChart {
        let origin = Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap();
        let formatter = DateXFormatter::new(origin, Arc::new(PeriodTable::default()));
        TracingChart::new("power", ChartKind::Line, Period::Hour, formatter)
            .with_component("battery_voltage", ChartComponentInfo::new("Battery", "V"))
    }

    #[test]
    fn test_labels_come_from_components() {
        let chart = chart();
        assert_eq!(chart.data_set_label("battery_voltage"), "Battery (V)");
        assert_eq!(chart.data_set_label("solar"), "solar");
    }

    #[test]
    fn test_replaces_data_sets_by_name() {
        let mut chart = chart();
        let first = DataSet::new("battery_voltage", "Battery (V)", XKeys::Date, vec![Entry::new(0.0, 12.0)]);
        let second = first.with_entries(vec![Entry::new(0.0, 12.5), Entry::new(3_600_000.0, 12.4)]);

        chart.add_data_set(first);
        chart.remove_data_set("battery_voltage");
        chart.add_data_set(second);
        chart.invalidate();

        assert_eq!(chart.redraws(), 1);
        assert_eq!(chart.data_sets().count(), 1);
        assert_eq!(chart.data_set("battery_voltage").map(DataSet::len), Some(2));
        assert_eq!(chart.summary(), vec!["Battery (V): 2 points, 00:00 .. 01:00"]);
    }

    #[test]
    fn test_summary_of_empty_data_set() {
        let mut chart = chart();
        chart.add_data_set(DataSet::empty("fridge_door", "Fridge door"));
        assert_eq!(chart.summary(), vec!["Fridge door: no data"]);
    }
}
