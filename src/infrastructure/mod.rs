// Infrastructure layer - configuration, settings and history sources
pub mod config;
pub mod history_mapper;
pub mod memory_history;
pub mod settings;
