// In-memory history source, stands in for the remote object service
use crate::application::data_source::{HistoryRecord, HistorySource};
use crate::domain::period::TimeRangeLimits;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: RwLock<BTreeMap<String, Vec<HistoryRecord>>>,
    latency: Option<Duration>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn record(&self, component: &str, time: DateTime<Utc>, payload: impl Into<String>) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let list = records.entry(component.to_string()).or_default();
        let record = HistoryRecord::new(time, payload);
        let idx = list.partition_point(|r| r.time <= time);
        list.insert(idx, record);
    }
}

#[async_trait]
impl HistorySource for MemoryHistory {
    async fn list_components(&self) -> anyhow::Result<Vec<String>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.keys().cloned().collect())
    }

    async fn query_history(
        &self,
        component: &str,
        limits: TimeRangeLimits,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let Some(list) = records.get(component) else {
            tracing::debug!("No history for component {}", component);
            return Ok(Vec::new());
        };

        Ok(list
            .iter()
            .filter(|r| limits.contains(r.time))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_records_stay_time_ordered() {
        let t = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let history = MemoryHistory::new();
        history.record("solar", t + chrono::Duration::seconds(20), "3");
        history.record("solar", t, "1");
        history.record("solar", t + chrono::Duration::seconds(10), "2");
        history.record("water", t, "80");

        let limits = TimeRangeLimits::new(t, t + chrono::Duration::seconds(15)).unwrap();
        let records = history.query_history("solar", limits).await.unwrap();
        let payloads: Vec<&str> = records.iter().map(|r| r.payload.as_str()).collect();
        assert_eq!(payloads, vec!["1", "2"]);

        assert_eq!(history.list_components().await.unwrap(), vec!["solar", "water"]);
    }
}
