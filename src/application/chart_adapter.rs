// Chart adapter boundary - the seam to the rendering widget
use crate::domain::chart::ChartKind;
use crate::domain::period::Period;
use crate::domain::period_table::PeriodTable;
use crate::domain::telemetry::DataSet;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Maps dates to chart x positions and back.
pub trait XFormatter: Send + Sync {
    fn from_date(&self, date: DateTime<Utc>) -> f64;

    fn to_date(&self, x: f64) -> DateTime<Utc>;

    /// Axis label for `x` when the chart shows `period` windows.
    fn format_label(&self, x: f64, period: Period) -> String;
}

/// Milliseconds since `origin`. Keeps x values small enough for single
/// precision renderers.
#[derive(Debug, Clone)]
pub struct DateXFormatter {
    origin: DateTime<Utc>,
    periods: Arc<PeriodTable>,
}

impl DateXFormatter {
    pub fn new(origin: DateTime<Utc>, periods: Arc<PeriodTable>) -> Self {
        Self { origin, periods }
    }
}

impl XFormatter for DateXFormatter {
    fn from_date(&self, date: DateTime<Utc>) -> f64 {
        (date - self.origin).num_milliseconds() as f64
    }

    fn to_date(&self, x: f64) -> DateTime<Utc> {
        let millis = if x.is_finite() { x.round() as i64 } else { 0 };
        self.origin + chrono::Duration::milliseconds(millis)
    }

    fn format_label(&self, x: f64, period: Period) -> String {
        self.to_date(x)
            .format(self.periods.display_format(period))
            .to_string()
    }
}

/// The rendering widget as seen by the orchestrator.
///
/// Every method is called from the orchestrator task only, so implementations
/// never see concurrent calls.
pub trait ChartAdapter: Send + 'static {
    fn kind(&self) -> ChartKind;

    fn x_formatter(&self) -> Arc<dyn XFormatter>;

    /// Human readable label for a data set name.
    fn data_set_label(&self, name: &str) -> String {
        name.to_string()
    }

    /// Style hook applied to every finished data set before it is added.
    fn prepare_data_set(&mut self, data_set: DataSet) -> DataSet {
        data_set
    }

    fn add_data_set(&mut self, data_set: DataSet);

    fn remove_data_set(&mut self, name: &str);

    fn invalidate(&mut self);
}
