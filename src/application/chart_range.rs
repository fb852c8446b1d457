// Chart range - the user facing window parameters of a chart
use crate::domain::period::{Period, TimeRangeLimits};
use crate::domain::period_table::PeriodTable;
use crate::error::{ChartError, Result};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRange {
    reference: Option<DateTime<Utc>>,
    period: Period,
    quantity: i64,
    offset: i64,
}

impl Default for ChartRange {
    fn default() -> Self {
        Self {
            reference: None,
            period: Period::Hour,
            quantity: 6,
            offset: 0,
        }
    }
}

impl ChartRange {
    pub fn new(period: Period, quantity: i64) -> Result<Self> {
        let mut range = Self::default();
        range.set_period(period, quantity)?;
        Ok(range)
    }

    /// Range using the first quantity option of `period`.
    pub fn from_table(table: &PeriodTable, period: Period) -> Self {
        Self {
            period,
            quantity: table.default_quantity(period) as i64,
            ..Self::default()
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn reference(&self) -> Option<DateTime<Utc>> {
        self.reference
    }

    /// Changing the unit or size of the window brings it back to the present.
    pub fn set_period(&mut self, period: Period, quantity: i64) -> Result<()> {
        if quantity < 1 {
            return Err(ChartError::InvalidQuantity(quantity));
        }
        self.period = period;
        self.quantity = quantity;
        self.offset = 0;
        Ok(())
    }

    pub fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    /// Pin the window to a fixed date instead of "now".
    pub fn set_reference(&mut self, reference: Option<DateTime<Utc>>) {
        self.reference = reference;
    }

    pub fn step_back(&mut self) {
        self.offset = self.offset.saturating_sub(1);
    }

    /// Never moves past the present window.
    pub fn step_forward(&mut self) {
        self.offset = (self.offset.saturating_add(1)).min(0);
    }

    pub fn limits(&self, now: DateTime<Utc>) -> Result<TimeRangeLimits> {
        let reference = self.reference.unwrap_or(now);
        TimeRangeLimits::compute(reference, self.period, self.quantity, self.offset)
    }
}
