//! Climatology baseline construction.
//!
//! For every calendar month a least-squares trend is fitted to one mean
//! sample per historical year and evaluated at a fixed epoch, giving the
//! Monthly Mean (MM). The Maximum of Monthly Means (MMM) is the per-cell
//! maximum over the twelve MM fields, and the 366-entry daily baseline is
//! interpolated linearly between MM values anchored at mid-month days.
//!
//! The same historical window is applied to every day the pipeline later
//! processes, including days that predate the window itself.

use crate::error::{PipelineError, Result};
use crate::grid::{Band, Grid, Raster};
use crate::types::DAYS_IN_BASELINE;

/// Mid-month day-of-year anchors for January through December.
pub const MONTH_ANCHOR_DAYS: [i32; 12] = [15, 46, 74, 105, 135, 166, 196, 227, 258, 288, 319, 349];

/// December's anchor repeated before day 1.
const LEADING_ANCHOR_DAY: i32 = -16;
/// January's anchor repeated after day 366.
const TRAILING_ANCHOR_DAY: i32 = 380;

pub const MMM_BAND: &str = "mmm_sst";

pub fn monthly_mean_band(month: u32) -> String {
    format!("mm_{month:02}")
}

pub fn daily_band(day: u32) -> String {
    format!("dc_{day:03}")
}

/// Historical window and evaluation epoch of the trend regression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaselineWindow {
    pub first_year: i32,
    pub last_year: i32,
    /// Fractional year at which every monthly trend line is evaluated.
    pub target_epoch: f64,
}

impl BaselineWindow {
    pub fn validate(&self) -> Result<()> {
        if self.last_year <= self.first_year {
            return Err(PipelineError::Invalid(format!(
                "baseline window {}..={} needs at least two years",
                self.first_year, self.last_year
            )));
        }
        if !self.target_epoch.is_finite() {
            return Err(PipelineError::Invalid(
                "baseline target epoch must be finite".into(),
            ));
        }
        Ok(())
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + use<> {
        self.first_year..=self.last_year
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.first_year..=self.last_year).contains(&year)
    }
}

/// Ordinary least-squares line `value = intercept + slope * year`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrendFit {
    pub intercept: f64,
    pub slope: f64,
}

impl TrendFit {
    /// Fits on centered sums. Returns `None` with fewer than two distinct years.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
            let dx = x - mean_x;
            (sxx + dx * dx, sxy + dx * (y - mean_y))
        });
        if sxx == 0.0 {
            return None;
        }

        let slope = sxy / sxx;
        Some(Self {
            intercept: mean_y - slope * mean_x,
            slope,
        })
    }

    pub fn evaluate(&self, epoch: f64) -> f64 {
        self.intercept + self.slope * epoch
    }
}

/// One monthly mean field for one historical year.
#[derive(Clone, Debug)]
pub struct YearSample {
    pub year: i32,
    pub grid: Grid,
}

/// Per-month collections of yearly mean fields.
#[derive(Clone, Debug, Default)]
pub struct MonthlySamples {
    months: [Vec<YearSample>; 12],
}

impl MonthlySamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, month: u32, year: i32, grid: Grid) -> Result<()> {
        let slot = month_slot(month)?;
        self.months[slot].push(YearSample { year, grid });
        Ok(())
    }

    pub fn month(&self, month: u32) -> Result<&[YearSample]> {
        Ok(&self.months[month_slot(month)?])
    }
}

fn month_slot(month: u32) -> Result<usize> {
    if !(1..=12).contains(&month) {
        return Err(PipelineError::Invalid(format!("month {month} out of range")));
    }
    Ok(month as usize - 1)
}

/// The two anchors bracketing a day-of-year.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorSpan {
    pub lo_day: i32,
    pub hi_day: i32,
    /// Zero-based month index of the lower anchor.
    pub lo_month: usize,
    /// Zero-based month index of the upper anchor.
    pub hi_month: usize,
}

impl AnchorSpan {
    /// Locates the span with `lo_day <= day < hi_day`.
    pub fn bracket(day: u32) -> Result<Self> {
        if day == 0 || day > DAYS_IN_BASELINE {
            return Err(PipelineError::Invalid(format!(
                "day-of-year {day} outside 1..=366"
            )));
        }
        let day = day as i32;

        let mut previous = (LEADING_ANCHOR_DAY, 11usize);
        let anchors = MONTH_ANCHOR_DAYS
            .iter()
            .copied()
            .enumerate()
            .map(|(month, anchor)| (anchor, month))
            .chain(std::iter::once((TRAILING_ANCHOR_DAY, 0usize)));

        for (anchor, month) in anchors {
            if previous.0 <= day && day < anchor {
                return Ok(Self {
                    lo_day: previous.0,
                    hi_day: anchor,
                    lo_month: previous.1,
                    hi_month: month,
                });
            }
            previous = (anchor, month);
        }

        Err(PipelineError::Invalid(format!(
            "day-of-year {day} has no bracketing anchors"
        )))
    }

    pub fn fraction(&self, day: u32) -> f64 {
        f64::from(day as i32 - self.lo_day) / f64::from(self.hi_day - self.lo_day)
    }
}

/// MM, MMM and the dense daily baseline. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Climatology {
    monthly_means: Vec<Grid>,
    max_monthly_mean: Grid,
    daily: Vec<Grid>,
}

impl Climatology {
    /// Derives MMM and the daily baseline from twelve MM fields.
    pub fn from_monthly_means(monthly_means: Vec<Grid>) -> Result<Self> {
        if monthly_means.len() != 12 {
            return Err(PipelineError::Invalid(format!(
                "expected 12 monthly means, got {}",
                monthly_means.len()
            )));
        }
        let max_monthly_mean = max_of_monthly_means(&monthly_means)?;
        let daily = interpolate_daily(&monthly_means)?;
        Ok(Self {
            monthly_means,
            max_monthly_mean,
            daily,
        })
    }

    pub fn monthly_mean(&self, month: u32) -> Result<&Grid> {
        Ok(&self.monthly_means[month_slot(month)?])
    }

    pub fn max_monthly_mean(&self) -> &Grid {
        &self.max_monthly_mean
    }

    pub fn daily(&self, day: u32) -> Result<&Grid> {
        if day == 0 || day > DAYS_IN_BASELINE {
            return Err(PipelineError::Invalid(format!(
                "day-of-year {day} outside 1..=366"
            )));
        }
        Ok(&self.daily[day as usize - 1])
    }

    pub fn monthly_mean_raster(&self) -> Result<Raster> {
        Raster::new(
            self.monthly_means
                .iter()
                .enumerate()
                .map(|(idx, grid)| Band {
                    name: monthly_mean_band(idx as u32 + 1),
                    grid: grid.clone(),
                })
                .collect(),
        )
    }

    pub fn max_monthly_mean_raster(&self) -> Result<Raster> {
        Raster::new(vec![Band {
            name: MMM_BAND.to_string(),
            grid: self.max_monthly_mean.clone(),
        }])
    }

    pub fn daily_raster(&self) -> Result<Raster> {
        Raster::new(
            self.daily
                .iter()
                .enumerate()
                .map(|(idx, grid)| Band {
                    name: daily_band(idx as u32 + 1),
                    grid: grid.clone(),
                })
                .collect(),
        )
    }
}

pub fn max_of_monthly_means(monthly_means: &[Grid]) -> Result<Grid> {
    Grid::cellwise_max(monthly_means)
}

/// Interpolates day-of-year 1..=366 between the mid-month anchors.
pub fn interpolate_daily(monthly_means: &[Grid]) -> Result<Vec<Grid>> {
    if monthly_means.len() != 12 {
        return Err(PipelineError::Invalid(format!(
            "expected 12 monthly means, got {}",
            monthly_means.len()
        )));
    }

    (1..=DAYS_IN_BASELINE)
        .map(|day| {
            let span = AnchorSpan::bracket(day)?;
            let frac = span.fraction(day);
            monthly_means[span.lo_month]
                .zip_with(&monthly_means[span.hi_month], |lo, hi| {
                    lo + (hi - lo) * frac
                })
        })
        .collect()
}

/// Fits the monthly trends and assembles the [`Climatology`].
#[derive(Clone, Copy, Debug)]
pub struct BaselineBuilder {
    window: BaselineWindow,
}

impl BaselineBuilder {
    pub fn new(window: BaselineWindow) -> Result<Self> {
        window.validate()?;
        Ok(Self { window })
    }

    pub fn window(&self) -> BaselineWindow {
        self.window
    }

    pub fn build(&self, samples: &MonthlySamples) -> Result<Climatology> {
        let monthly_means = (1..=12)
            .map(|month| self.monthly_mean(month, samples.month(month)?))
            .collect::<Result<Vec<_>>>()?;
        Climatology::from_monthly_means(monthly_means)
    }

    fn monthly_mean(&self, month: u32, samples: &[YearSample]) -> Result<Grid> {
        let Some(first) = samples.first() else {
            return Err(PipelineError::Invalid(format!(
                "no samples for month {month}"
            )));
        };
        for sample in samples {
            if !self.window.contains(sample.year) {
                return Err(PipelineError::Invalid(format!(
                    "sample year {} for month {month} outside baseline window",
                    sample.year
                )));
            }
            first.grid.ensure_same_shape(&sample.grid)?;
        }

        let (width, height) = first.grid.shape();
        let mut points = Vec::with_capacity(samples.len());
        let values = (0..first.grid.len())
            .map(|cell| {
                points.clear();
                points.extend(samples.iter().filter_map(|sample| {
                    sample.grid.values()[cell]
                        .map(|value| (f64::from(sample.year), value))
                }));
                TrendFit::fit(&points)
                    .map(|fit| fit.evaluate(self.window.target_epoch))
            })
            .collect();
        Grid::new(width, height, values)
    }
}
