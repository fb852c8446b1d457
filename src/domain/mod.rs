// Domain layer - time ranges, data sets and chart descriptions
pub mod chart;
pub mod period;
pub mod period_table;
pub mod telemetry;
