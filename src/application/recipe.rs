// Reduction recipes - the ordered transforms a fetched data set goes through
use crate::application::chart_adapter::XFormatter;
use crate::application::reduction;
use crate::domain::chart::ChartKind;
use crate::domain::period::TimeRangeLimits;
use crate::domain::telemetry::DataSet;
use crate::error::{ChartError, Result};
use chrono::Duration;

/// How long a stretch without data may be before it is marked with zeros.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapThreshold {
    Fixed(Duration),
    /// `factor` times the nominal sampling period of the series at that point
    /// of the recipe. The period comes from the preceding resampling step, or
    /// from the median spacing of the data when nothing was resampled.
    Sampling { factor: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReductionStep {
    Sort,
    Filter,
    MiddleValues { max_count: usize },
    EqualsPartition { max_count: usize },
    MidPartition { max_count: usize },
    Interpolate { min_count: usize },
    Scale { factor: f64 },
    ZeroFillGaps { threshold: GapThreshold, delta: Duration },
}

impl ReductionStep {
    fn validate(&self) -> Result<()> {
        let count = |name: &'static str, value: usize| {
            if value == 0 {
                Err(ChartError::InvalidCount { name, value })
            } else {
                Ok(())
            }
        };

        match *self {
            ReductionStep::Sort | ReductionStep::Filter => Ok(()),
            ReductionStep::MiddleValues { max_count }
            | ReductionStep::EqualsPartition { max_count }
            | ReductionStep::MidPartition { max_count } => count("max count", max_count),
            ReductionStep::Interpolate { min_count } => count("min count", min_count),
            ReductionStep::Scale { factor } if !factor.is_finite() => {
                Err(ChartError::InvalidFactor(factor))
            }
            ReductionStep::Scale { .. } => Ok(()),
            ReductionStep::ZeroFillGaps { threshold, delta } => {
                if delta < Duration::zero() {
                    return Err(ChartError::InvalidThreshold(format!(
                        "negative delta {}ms",
                        delta.num_milliseconds()
                    )));
                }
                match threshold {
                    GapThreshold::Fixed(range) if range <= Duration::zero() => Err(
                        ChartError::InvalidThreshold(format!("{}ms", range.num_milliseconds())),
                    ),
                    GapThreshold::Sampling { factor } if !(factor.is_finite() && factor > 0.0) => {
                        Err(ChartError::InvalidThreshold(format!("factor {factor}")))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Knobs for the per-kind default recipes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecipeSettings {
    pub max_points: usize,
    pub min_points: usize,
    pub gap_factor: f64,
    pub gap_delta: Duration,
}

impl Default for RecipeSettings {
    fn default() -> Self {
        Self {
            max_points: 150,
            min_points: 10,
            gap_factor: 1.5,
            gap_delta: Duration::seconds(1),
        }
    }
}

/// What a recipe needs from the chart it runs for.
pub struct ReductionContext<'a> {
    pub formatter: &'a dyn XFormatter,
    pub limits: TimeRangeLimits,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReductionRecipe {
    steps: Vec<ReductionStep>,
}

impl ReductionRecipe {
    pub fn new(steps: Vec<ReductionStep>) -> Result<Self> {
        for step in &steps {
            step.validate()?;
        }
        Ok(Self { steps })
    }

    /// Sort only.
    pub fn passthrough() -> Self {
        Self {
            steps: vec![ReductionStep::Sort],
        }
    }

    /// Default pipeline for a chart kind.
    ///
    /// Lines keep their real shape (mid-partition, upsampling of sparse
    /// series, zeros over gaps). Bars need one evenly spaced bar per slot.
    pub fn for_kind(kind: ChartKind, settings: &RecipeSettings) -> Result<Self> {
        let steps = match kind {
            ChartKind::Line => vec![
                ReductionStep::Sort,
                ReductionStep::Filter,
                ReductionStep::MidPartition {
                    max_count: settings.max_points,
                },
                ReductionStep::Interpolate {
                    min_count: settings.min_points,
                },
                ReductionStep::ZeroFillGaps {
                    threshold: GapThreshold::Sampling {
                        factor: settings.gap_factor,
                    },
                    delta: settings.gap_delta,
                },
            ],
            ChartKind::Bar => vec![
                ReductionStep::Sort,
                ReductionStep::Filter,
                ReductionStep::EqualsPartition {
                    max_count: settings.max_points,
                },
            ],
        };
        Self::new(steps)
    }

    pub fn steps(&self) -> &[ReductionStep] {
        &self.steps
    }

    /// Append a step, e.g. a unit scale after the kind's defaults.
    pub fn then(mut self, step: ReductionStep) -> Result<Self> {
        step.validate()?;
        self.steps.push(step);
        Ok(self)
    }

    pub fn apply(&self, data_set: &DataSet, ctx: &ReductionContext<'_>) -> DataSet {
        let mut current = data_set.clone();
        let mut sampling: Option<Duration> = None;

        for step in &self.steps {
            current = match *step {
                ReductionStep::Sort => reduction::sort_entries(&current),
                ReductionStep::Filter => reduction::filter_by_range(&current, ctx.formatter, &ctx.limits),
                ReductionStep::MiddleValues { max_count } => {
                    reduction::reduce_middle_values(&current, max_count)
                }
                ReductionStep::EqualsPartition { max_count } => {
                    let reduced =
                        reduction::reduce_equals_partition(&current, ctx.formatter, &ctx.limits, max_count);
                    let slots = max_count.max(reduction::MIN_PARTITION_COUNT) as i32 - 1;
                    sampling = Some(ctx.limits.span() / slots);
                    reduced
                }
                ReductionStep::MidPartition { max_count } => {
                    if current.len() > max_count.max(reduction::MIN_PARTITION_COUNT) {
                        sampling = reduction::mid_partition_width(&current, ctx.formatter, max_count);
                    }
                    reduction::reduce_mid_partition(&current, max_count)
                }
                ReductionStep::Interpolate { min_count } => reduction::interpolate(&current, min_count),
                ReductionStep::Scale { factor } => reduction::scale(&current, factor),
                ReductionStep::ZeroFillGaps { threshold, delta } => {
                    let max_empty_range = match threshold {
                        GapThreshold::Fixed(range) => Some(range),
                        GapThreshold::Sampling { factor } => sampling
                            .or_else(|| median_spacing(&current, ctx.formatter))
                            .map(|period| scale_duration(period, factor)),
                    };
                    match max_empty_range {
                        Some(range) => {
                            reduction::zero_fill_gaps(&current, ctx.formatter, &ctx.limits, range, delta)
                        }
                        // Single point or empty: only the boundaries can be gaps.
                        None => reduction::zero_fill_gaps(
                            &current,
                            ctx.formatter,
                            &ctx.limits,
                            Duration::zero(),
                            delta,
                        ),
                    }
                }
            };
        }

        current
    }
}

fn median_spacing(data_set: &DataSet, formatter: &dyn XFormatter) -> Option<Duration> {
    let mut spacings: Vec<Duration> = data_set
        .entries
        .windows(2)
        .map(|w| formatter.to_date(w[1].x) - formatter.to_date(w[0].x))
        .filter(|d| *d > Duration::zero())
        .collect();
    if spacings.is_empty() {
        return None;
    }
    spacings.sort();
    Some(spacings[spacings.len() / 2])
}

fn scale_duration(duration: Duration, factor: f64) -> Duration {
    Duration::milliseconds((duration.num_milliseconds() as f64 * factor).round() as i64)
}
