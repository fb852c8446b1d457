// Error types for the chart pipeline
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChartError {
    #[error("invalid period '{0}', expected one of ms, s, min, hour, day, month, year")]
    InvalidPeriod(String),

    #[error("invalid range quantity {0}, must be at least 1")]
    InvalidQuantity(i64),

    #[error("invalid {name} {value}, must be at least 1")]
    InvalidCount { name: &'static str, value: usize },

    #[error("invalid time range: from {from} is after to {to}")]
    InvalidRange { from: String, to: String },

    #[error("window of {amount} {unit} from {date} is out of range")]
    WindowOutOfRange { unit: String, amount: i64, date: String },

    #[error("invalid scale factor {0}")]
    InvalidFactor(f64),

    #[error("invalid gap threshold: {0}")]
    InvalidThreshold(String),

    #[error("chart orchestrator is no longer running")]
    OrchestratorClosed,
}

pub type Result<T> = std::result::Result<T, ChartError>;
