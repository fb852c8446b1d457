// Local settings - user choices persisted between runs
use crate::domain::chart::ChartComponentInfo;
use crate::infrastructure::config::ChartSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per component display override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayOverride {
    pub label: Option<String>,
    pub unit: Option<String>,
    pub color: Option<String>,
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    pub color: Option<String>,
    pub chart_fetch_timeout_ms: Option<u64>,
    #[serde(default)]
    pub overrides: BTreeMap<String, DisplayOverride>,
}

impl LocalSettings {
    /// Missing file means nothing was saved yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn display_override(&self, component: &str) -> Option<&DisplayOverride> {
        self.overrides.get(component)
    }

    pub fn set_display_override(&mut self, component: impl Into<String>, value: DisplayOverride) {
        self.overrides.insert(component.into(), value);
    }

    pub fn remove_display_override(&mut self, component: &str) -> Option<DisplayOverride> {
        self.overrides.remove(component)
    }

    /// Chart settings with the user's fetch timeout applied.
    pub fn apply_to(&self, chart: &ChartSettings) -> ChartSettings {
        let mut chart = chart.clone();
        if let Some(timeout) = self.chart_fetch_timeout_ms.filter(|t| *t > 0) {
            chart.fetch_timeout_ms = timeout;
        }
        chart
    }

    /// Component info with the user's overrides applied.
    pub fn component_info(&self, component: &str, base: &ChartComponentInfo) -> ChartComponentInfo {
        let mut info = base.clone();
        if info.color.is_none() {
            info.color = self.color.clone();
        }
        if let Some(o) = self.display_override(component) {
            if let Some(label) = &o.label {
                info.label = label.clone();
            }
            if let Some(unit) = &o.unit {
                info.unit = unit.clone();
            }
            if let Some(color) = &o.color {
                info.color = Some(color.clone());
            }
        }
        info
    }
}

/// Default location, `$HOME/.config/smartvan/settings.toml`.
pub fn default_settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join("smartvan").join("settings.toml")
}
