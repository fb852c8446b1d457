// Smart van telemetry charts - period math, data set reduction and fetch orchestration
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;

pub use error::{ChartError, Result};
