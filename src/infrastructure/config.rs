use crate::application::recipe::RecipeSettings;
use crate::domain::chart::{ChartComponentInfo, ChartKind};
use crate::domain::period::Period;
use crate::domain::period_table::{PeriodOptions, PeriodTable};
use crate::error::ChartError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChartsConfig {
    #[serde(default)]
    pub chart: ChartSettings,
    #[serde(default)]
    pub periods: Vec<PeriodOptions>,
    #[serde(default)]
    pub charts: Vec<ChartConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChartSettings {
    pub fetch_timeout_ms: u64,
    pub max_points: usize,
    pub min_points: usize,
    pub gap_factor: f64,
    pub gap_delta_ms: i64,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            max_points: 150,
            min_points: 10,
            gap_factor: 1.5,
            gap_delta_ms: 1_000,
        }
    }
}

impl ChartSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn recipe_settings(&self) -> RecipeSettings {
        RecipeSettings {
            max_points: self.max_points,
            min_points: self.min_points,
            gap_factor: self.gap_factor,
            gap_delta: chrono::Duration::milliseconds(self.gap_delta_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ChartError> {
        if self.max_points == 0 {
            return Err(ChartError::InvalidCount {
                name: "max points",
                value: 0,
            });
        }
        if self.min_points == 0 {
            return Err(ChartError::InvalidCount {
                name: "min points",
                value: 0,
            });
        }
        if !(self.gap_factor.is_finite() && self.gap_factor > 0.0) {
            return Err(ChartError::InvalidThreshold(format!("gap factor {}", self.gap_factor)));
        }
        if self.gap_delta_ms < 0 {
            return Err(ChartError::InvalidThreshold(format!("gap delta {}ms", self.gap_delta_ms)));
        }
        Ok(())
    }
}

/// A chart shown by the client: its kind, default window and components.
#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub period: Period,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ComponentConfig {
    /// Data set name the history source knows the component by.
    pub name: String,
    #[serde(flatten)]
    pub info: ChartComponentInfo,
    pub scale: Option<f64>,
}

impl ChartsConfig {
    pub fn period_table(&self) -> Result<PeriodTable, ChartError> {
        PeriodTable::with_overrides(&self.periods)
    }
}

/// Load `config/charts.*` if present, then `SMARTVAN_*` environment overrides
/// (e.g. `SMARTVAN_CHART__FETCH_TIMEOUT_MS=15000`).
pub fn load_charts_config() -> anyhow::Result<ChartsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/charts").required(false))
        .add_source(
            config::Environment::with_prefix("SMARTVAN")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let charts: ChartsConfig = settings.try_deserialize()?;
    charts.chart.validate()?;
    Ok(charts)
}
