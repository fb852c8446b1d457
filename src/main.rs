// Main entry point - wires the configured charts to a synthetic van history
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use smartvan_telemetry::application::chart_adapter::DateXFormatter;
use smartvan_telemetry::application::chart_range::ChartRange;
use smartvan_telemetry::application::data_source::HistorySource;
use smartvan_telemetry::application::orchestrator::{ChartEvent, ChartOrchestrator, OrchestratorOptions};
use smartvan_telemetry::application::recipe::{ReductionRecipe, ReductionStep};
use smartvan_telemetry::domain::period::Period;
use smartvan_telemetry::domain::period_table::PeriodTable;
use smartvan_telemetry::infrastructure::config::{load_charts_config, ChartConfig, ChartSettings};
use smartvan_telemetry::infrastructure::history_mapper::HistoryDataSetSource;
use smartvan_telemetry::infrastructure::memory_history::MemoryHistory;
use smartvan_telemetry::infrastructure::settings::{default_settings_path, LocalSettings};
use smartvan_telemetry::presentation::status::StatusLine;
use smartvan_telemetry::presentation::tracing_chart::TracingChart;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const HISTORY_DAYS: i64 = 8;
const SAMPLE_EVERY_MINUTES: i64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let charts = load_charts_config()?;
    if charts.charts.is_empty() {
        anyhow::bail!("No charts configured, add some to config/charts.toml");
    }
    let settings = LocalSettings::load(&default_settings_path())?;
    let chart_settings = settings.apply_to(&charts.chart);
    let periods = Arc::new(charts.period_table()?);

    // Seed the history (stands in for the remote object service)
    let now = Utc::now();
    let history = Arc::new(MemoryHistory::new().with_latency(Duration::from_millis(50)));
    for chart in &charts.charts {
        for component in &chart.components {
            seed_component(&history, &component.name, now);
        }
    }
    let components = history.list_components().await?;
    tracing::info!("Seeded history for {}", components.join(", "));
    let source = Arc::new(HistoryDataSetSource::new(history));

    for chart in &charts.charts {
        render_chart(chart, &chart_settings, &settings, periods.clone(), source.clone(), now).await?;
    }

    Ok(())
}

async fn render_chart(
    config: &ChartConfig,
    chart_settings: &ChartSettings,
    settings: &LocalSettings,
    periods: Arc<PeriodTable>,
    source: Arc<HistoryDataSetSource>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let range = match config.quantity {
        Some(quantity) => ChartRange::new(config.period, quantity)?,
        None => ChartRange::from_table(&periods, config.period),
    };

    let formatter = DateXFormatter::new(Period::Day.truncate(now), periods);
    let mut chart = TracingChart::new(&config.id, config.kind, config.period, formatter);

    let recipe_settings = chart_settings.recipe_settings();
    let mut options = OrchestratorOptions {
        fetch_timeout: chart_settings.fetch_timeout(),
        recipe_settings,
        ..OrchestratorOptions::default()
    };

    for component in &config.components {
        chart = chart.with_component(&component.name, settings.component_info(&component.name, &component.info));

        let scale = settings
            .display_override(&component.name)
            .and_then(|o| o.scale)
            .or(component.scale);
        if let Some(factor) = scale {
            let recipe = ReductionRecipe::for_kind(config.kind, &recipe_settings)?
                .then(ReductionStep::Scale { factor })?;
            options = options.with_recipe(&component.name, recipe);
        }
    }

    let names: Vec<String> = config.components.iter().map(|c| c.name.clone()).collect();
    let (orchestrator, handle) = ChartOrchestrator::spawn(chart, source, options)?;
    let mut events = orchestrator.subscribe();

    tracing::info!(
        "Chart {} ({}): last {} {}",
        config.id,
        config.title,
        range.quantity(),
        range.period()
    );
    let cycle = orchestrator.fetch_range(names, &range).await?;

    // Follow the cycle until the chart got its batch
    let mut status = StatusLine::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Skipped {} chart events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if let Some(message) = status.apply(&event) {
            tracing::info!("{}", message);
        }
        match event {
            ChartEvent::FetchCompletedBatch { cycle: done, .. } if done == cycle => break,
            ChartEvent::FetchCancelled { cycle: done } if done == cycle => break,
            _ => {}
        }
    }

    orchestrator.shutdown().await?;
    let chart = handle.await.context("Chart task failed")?;
    for line in chart.summary() {
        tracing::info!("  {}", line);
    }
    Ok(())
}

/// Synthetic history: switch-like components toggle, everything else drifts
/// around a base value.
fn seed_component(history: &MemoryHistory, name: &str, now: DateTime<Utc>) {
    let samples = HISTORY_DAYS * 24 * 60 / SAMPLE_EVERY_MINUTES;
    let switch = name.contains("door") || name.contains("pump") || name.contains("light");
    let base = 10.0 + (name.len() % 7) as f64;

    for i in 0..samples {
        // Leave a two hour hole a day ago so gaps show up in line charts
        if (280..304).contains(&(samples - i)) {
            continue;
        }
        let time = now - chrono::Duration::minutes((samples - i) * SAMPLE_EVERY_MINUTES);
        let payload = if switch {
            let on = (i / 7) % 3 == 0;
            if on { "on".to_string() } else { "off".to_string() }
        } else {
            let wave = (i as f64 / 36.0).sin();
            format!("{:.2}", base + wave)
        };
        history.record(name, time, payload);
    }
}
