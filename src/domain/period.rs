// Period math - time range windows for charts
use crate::error::{ChartError, Result};
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit used to size a chart window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 7] = [
        Period::Millisecond,
        Period::Second,
        Period::Minute,
        Period::Hour,
        Period::Day,
        Period::Month,
        Period::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Millisecond => "ms",
            Period::Second => "s",
            Period::Minute => "min",
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Month => "month",
            Period::Year => "year",
        }
    }

    /// Nominal length of one unit. Months count as 30 days and years as 365.
    pub fn nominal_duration(&self) -> Duration {
        match self {
            Period::Millisecond => Duration::milliseconds(1),
            Period::Second => Duration::seconds(1),
            Period::Minute => Duration::minutes(1),
            Period::Hour => Duration::hours(1),
            Period::Day => Duration::days(1),
            Period::Month => Duration::days(30),
            Period::Year => Duration::days(365),
        }
    }

    /// Shift `date` by `amount` units, calendar-aware for months and years.
    /// `None` when the result is not a representable date.
    pub fn shift(&self, date: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
        match self {
            Period::Month => shift_months(date, amount),
            Period::Year => shift_months(date, amount.checked_mul(12)?),
            _ => {
                let millis = self.nominal_duration().num_milliseconds().checked_mul(amount)?;
                date.checked_add_signed(Duration::try_milliseconds(millis)?)
            }
        }
    }

    /// Truncate `date` to the start of the unit that contains it.
    pub fn truncate(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        let truncated = match self {
            Period::Millisecond => date.with_nanosecond(date.nanosecond() / 1_000_000 * 1_000_000),
            Period::Second => date.with_nanosecond(0),
            Period::Minute => date.with_nanosecond(0).and_then(|d| d.with_second(0)),
            Period::Hour => date
                .with_nanosecond(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_minute(0)),
            Period::Day => Utc
                .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
                .single(),
            Period::Month => Utc
                .with_ymd_and_hms(date.year(), date.month(), 1, 0, 0, 0)
                .single(),
            Period::Year => Utc.with_ymd_and_hms(date.year(), 1, 1, 0, 0, 0).single(),
        };
        truncated.unwrap_or(date)
    }
}

fn shift_months(date: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "millisecond" | "milliseconds" => Ok(Period::Millisecond),
            "s" | "sec" | "second" | "seconds" => Ok(Period::Second),
            "min" | "minute" | "minutes" => Ok(Period::Minute),
            "h" | "hour" | "hours" => Ok(Period::Hour),
            "d" | "day" | "days" => Ok(Period::Day),
            "month" | "months" => Ok(Period::Month),
            "y" | "year" | "years" => Ok(Period::Year),
            _ => Err(ChartError::InvalidPeriod(s.to_string())),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = ChartError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.as_str().to_string()
    }
}

/// Numeric period codes as stored by the client settings (0 = ms ... 6 = year).
impl TryFrom<i32> for Period {
    type Error = ChartError;

    fn try_from(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Period::ALL.get(idx).copied())
            .ok_or_else(|| ChartError::InvalidPeriod(code.to_string()))
    }
}

/// Half-open window `[from, to)` a chart displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeLimits {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRangeLimits {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(ChartError::InvalidRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(Self { from, to })
    }

    pub fn compute(now: DateTime<Utc>, unit: Period, quantity: i64, offset: i64) -> Result<Self> {
        let from = calculate_from_date(now, unit, quantity, offset)?;
        let to = calculate_to_date(now, unit, quantity, offset)?;
        Self::new(from, to)
    }

    pub fn span(&self) -> Duration {
        self.to - self.from
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.from <= date && date <= self.to
    }
}

fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity < 1 {
        return Err(ChartError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn shift_checked(unit: Period, date: DateTime<Utc>, amount: i64) -> Result<DateTime<Utc>> {
    unit.shift(date, amount).ok_or_else(|| ChartError::WindowOutOfRange {
        unit: unit.to_string(),
        amount,
        date: date.to_rfc3339(),
    })
}

/// End of the window. With `offset == 0` the window ends at `now`; any other
/// offset aligns the window to unit boundaries first.
pub fn calculate_to_date(
    now: DateTime<Utc>,
    unit: Period,
    quantity: i64,
    offset: i64,
) -> Result<DateTime<Utc>> {
    validate_quantity(quantity)?;
    if offset == 0 {
        return Ok(now);
    }
    let end_of_unit = shift_checked(unit, unit.truncate(now), 1)?;
    let amount = offset.checked_mul(quantity).ok_or_else(|| ChartError::WindowOutOfRange {
        unit: unit.to_string(),
        amount: offset,
        date: end_of_unit.to_rfc3339(),
    })?;
    shift_checked(unit, end_of_unit, amount)
}

pub fn calculate_from_date(
    now: DateTime<Utc>,
    unit: Period,
    quantity: i64,
    offset: i64,
) -> Result<DateTime<Utc>> {
    let to = calculate_to_date(now, unit, quantity, offset)?;
    shift_checked(unit, to, -quantity)
}
