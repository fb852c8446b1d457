// Data source traits for chart history
use crate::domain::period::TimeRangeLimits;
use crate::domain::telemetry::HistorySample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Raw history record as the remote object service reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub time: DateTime<Utc>,
    pub payload: String,
}

impl HistoryRecord {
    pub fn new(time: DateTime<Utc>, payload: impl Into<String>) -> Self {
        Self {
            time,
            payload: payload.into(),
        }
    }
}

/// Where a chart gets the samples for one of its data sets.
#[async_trait]
pub trait DataSetSource: Send + Sync {
    /// Fetch the samples of data set `name` inside `limits`.
    async fn fetch(&self, name: &str, limits: TimeRangeLimits) -> anyhow::Result<Vec<HistorySample>>;
}

/// History query of the remote object service.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// List the components that keep history
    async fn list_components(&self) -> anyhow::Result<Vec<String>>;

    /// Time ordered records of `component` inside `limits`
    async fn query_history(
        &self,
        component: &str,
        limits: TimeRangeLimits,
    ) -> anyhow::Result<Vec<HistoryRecord>>;
}
