// Presentation layer - status text and the headless chart
pub mod status;
pub mod tracing_chart;
