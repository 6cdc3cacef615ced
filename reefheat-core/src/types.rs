//! Identity types shared by every pipeline stage.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Largest day-of-year index carried by the daily baseline.
pub const DAYS_IN_BASELINE: u32 = 366;

/// One calendar day of work. Identity is the ISO date string.
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkUnit(pub NaiveDate);

impl WorkUnit {
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Day-of-year clamped to the baseline's 1..=366 index space.
    pub fn baseline_day(&self) -> u32 {
        self.0.ordinal().min(DAYS_IN_BASELINE)
    }

    /// Compact `YYYYMMDD` stamp used in export names.
    pub fn stamp(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    pub fn previous(&self) -> Option<Self> {
        self.0.pred_opt().map(Self)
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl From<NaiveDate> for WorkUnit {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

/// Inclusive, ascending range of work units.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(PipelineError::Invalid(format!(
                "date range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of units; never zero.
    pub fn day_count(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// Whole calendar year as a range.
    pub fn year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| {
            PipelineError::Invalid(format!("year {year} out of range"))
        })?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(|| {
            PipelineError::Invalid(format!("year {year} out of range"))
        })?;
        Self::new(start, end)
    }

    /// Trailing window of `days` days ending on (and including) `end`.
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self> {
        let back = u64::from(days.saturating_sub(1));
        let start = end.checked_sub_days(Days::new(back)).ok_or_else(|| {
            PipelineError::Invalid(format!(
                "window of {days} days before {end} leaves the calendar"
            ))
        })?;
        Self::new(start, end)
    }

    pub fn units(&self) -> impl Iterator<Item = WorkUnit> + use<> {
        let end = self.end;
        self.start
            .iter_days()
            .take_while(move |day| *day <= end)
            .map(WorkUnit)
    }
}
