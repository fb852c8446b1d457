// Application layer - chart ranges, reduction and fetch orchestration
pub mod chart_adapter;
pub mod chart_range;
pub mod data_source;
pub mod fetch_tracker;
pub mod orchestrator;
pub mod recipe;
pub mod reduction;
