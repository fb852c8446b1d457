// Mapper from remote object history records to chart samples
use crate::application::data_source::{DataSetSource, HistoryRecord, HistorySource};
use crate::domain::period::TimeRangeLimits;
use crate::domain::telemetry::HistorySample;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Numeric value of a state payload.
///
/// Accepts plain numbers, booleans (`true` = 1) and JSON objects carrying a
/// `value` field. Anything else is `None`.
pub fn parse_payload(payload: &str) -> Option<f64> {
    let trimmed = payload.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "on" => return Some(1.0),
        "false" | "off" => return Some(0.0),
        _ => {}
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    let json: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    json_value(&json)
}

fn json_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        serde_json::Value::Object(map) => map.get("value").and_then(json_value),
        _ => None,
    }
}

/// Convert records, skipping the ones whose payload is not a number.
pub fn records_to_samples(component: &str, records: &[HistoryRecord]) -> Vec<HistorySample> {
    let mut skipped = 0usize;
    let samples: Vec<HistorySample> = records
        .iter()
        .filter_map(|record| match parse_payload(&record.payload) {
            Some(value) => Some(HistorySample::new(record.time, value)),
            None => {
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        tracing::debug!("Skipped {} malformed history records of {}", skipped, component);
    }
    samples
}

/// Serves chart data sets from a remote object history source.
///
/// Data set names map to component ids; names without a mapping are used as
/// component ids directly.
pub struct HistoryDataSetSource {
    history: Arc<dyn HistorySource>,
    components: HashMap<String, String>,
}

impl HistoryDataSetSource {
    pub fn new(history: Arc<dyn HistorySource>) -> Self {
        Self {
            history,
            components: HashMap::new(),
        }
    }

    pub fn with_component(mut self, data_set: impl Into<String>, component: impl Into<String>) -> Self {
        self.components.insert(data_set.into(), component.into());
        self
    }

    fn component_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.components.get(name).map(String::as_str).unwrap_or(name)
    }
}

#[async_trait]
impl DataSetSource for HistoryDataSetSource {
    async fn fetch(&self, name: &str, limits: TimeRangeLimits) -> anyhow::Result<Vec<HistorySample>> {
        let component = self.component_for(name);
        tracing::debug!(
            "Querying history of {} from {} to {}",
            component,
            limits.from,
            limits.to
        );
        let records = self.history.query_history(component, limits).await?;
        Ok(records_to_samples(component, &records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_history::MemoryHistory;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload("12.5"), Some(12.5));
        assert_eq!(parse_payload(" -3 "), Some(-3.0));
        assert_eq!(parse_payload("TRUE"), Some(1.0));
        assert_eq!(parse_payload("off"), Some(0.0));
        assert_eq!(parse_payload(r#"{"value": 4.2, "unit": "V"}"#), Some(4.2));
        assert_eq!(parse_payload(r#"{"value": "7"}"#), Some(7.0));
        assert_eq!(parse_payload(r#"{"state": 1}"#), None);
        assert_eq!(parse_payload("NaN"), None);
        assert_eq!(parse_payload("open"), None);
        assert_eq!(parse_payload(""), None);
    }

    #[test]
    fn test_records_to_samples_skips_malformed() {
        let t = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();
        let records = vec![
            HistoryRecord::new(t, "1.0"),
            HistoryRecord::new(t + Duration::seconds(1), "garbage"),
            HistoryRecord::new(t + Duration::seconds(2), "true"),
        ];
        let samples = records_to_samples("door", &records);
        assert_eq!(
            samples,
            vec![
                HistorySample::new(t, 1.0),
                HistorySample::new(t + Duration::seconds(2), 1.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_maps_names_to_components() {
        let t = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();
        let history = MemoryHistory::new();
        history.record("van/battery", t, "12.6");
        history.record("van/battery", t + Duration::minutes(5), "12.4");
        history.record("van/battery", t + Duration::hours(2), "12.1");

        let source = HistoryDataSetSource::new(Arc::new(history)).with_component("battery", "van/battery");
        let limits = TimeRangeLimits::new(t, t + Duration::hours(1)).unwrap();
        let samples = source.fetch("battery", limits).await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].value, 12.4);
        assert!(source.fetch("unknown", limits).await.unwrap().is_empty());
    }
}
