//! Confidence-bounded summary rows.
//!
//! Turns the raw `mean` / `stdDev` / `count` output of a regional reduction
//! into one [`SummaryRow`] per work unit. A variable with no contributing
//! pixels is reported as all-null with a zero count, never as a zero mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::WorkUnit;

/// z-score of the two-sided 95% interval.
pub const Z_95: f64 = 1.96;

const DECIMALS: f64 = 10_000.0;

fn round4(value: f64) -> f64 {
    (value * DECIMALS).round() / DECIMALS
}

/// The three summarised products.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Variable {
    Primary,
    Anomaly,
    AccumulatedStress,
}

impl Variable {
    pub const ALL: [Variable; 3] = [
        Variable::Primary,
        Variable::Anomaly,
        Variable::AccumulatedStress,
    ];

    /// Band / column prefix used in reductions and on disk.
    pub fn key(&self) -> &'static str {
        match self {
            Variable::Primary => "sst",
            Variable::Anomaly => "anomaly",
            Variable::AccumulatedStress => "dhw",
        }
    }
}

/// Raw reduction statistics for one variable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawStats {
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub count: Option<f64>,
}

/// Flat `{band}_{stat}` values as returned by a regional reduction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReductionOutput(pub BTreeMap<String, Option<f64>>);

impl ReductionOutput {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied().flatten()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<f64>) {
        self.0.insert(key.into(), value);
    }

    pub fn stats(&self, variable: Variable) -> RawStats {
        let key = variable.key();
        RawStats {
            mean: self.get(&format!("{key}_mean")),
            std_dev: self.get(&format!("{key}_stdDev")),
            count: self.get(&format!("{key}_count")),
        }
    }
}

/// Summary of one variable: either measured or explicitly empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VariableSummary {
    Measured {
        mean: f64,
        std: f64,
        ci95_lower: f64,
        ci95_upper: f64,
        n_pixels: u64,
    },
    NoData,
}

impl VariableSummary {
    pub fn from_raw(raw: RawStats) -> Self {
        let count = raw.count.filter(|c| c.is_finite()).unwrap_or(0.0);
        let mean = raw.mean.filter(|m| m.is_finite());
        let n_pixels = count.max(0.0).round() as u64;

        match mean {
            Some(mean) if n_pixels > 0 => {
                let std = raw.std_dev.filter(|s| s.is_finite()).unwrap_or(0.0);
                let mean = round4(mean);
                let half_width = round4(Z_95 * std / (n_pixels as f64).sqrt());
                VariableSummary::Measured {
                    mean,
                    std: round4(std),
                    ci95_lower: round4(mean - half_width),
                    ci95_upper: round4(mean + half_width),
                    n_pixels,
                }
            }
            _ => VariableSummary::NoData,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        match self {
            VariableSummary::Measured { mean, .. } => Some(*mean),
            VariableSummary::NoData => None,
        }
    }

    pub fn n_pixels(&self) -> u64 {
        match self {
            VariableSummary::Measured { n_pixels, .. } => *n_pixels,
            VariableSummary::NoData => 0,
        }
    }
}

/// One aggregated record per work unit. Serialized as a flat record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "FlatSummaryRow", try_from = "FlatSummaryRow")]
pub struct SummaryRow {
    pub date: WorkUnit,
    pub primary: VariableSummary,
    pub anomaly: VariableSummary,
    pub accumulated_stress: VariableSummary,
}

impl SummaryRow {
    /// Reduces one regional reduction output into a row.
    pub fn reduce(date: WorkUnit, output: &ReductionOutput) -> Self {
        Self {
            date,
            primary: VariableSummary::from_raw(output.stats(Variable::Primary)),
            anomaly: VariableSummary::from_raw(output.stats(Variable::Anomaly)),
            accumulated_stress: VariableSummary::from_raw(
                output.stats(Variable::AccumulatedStress),
            ),
        }
    }

    pub fn variable(&self, variable: Variable) -> &VariableSummary {
        match variable {
            Variable::Primary => &self.primary,
            Variable::Anomaly => &self.anomaly,
            Variable::AccumulatedStress => &self.accumulated_stress,
        }
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FlatSummaryRow {
    date: WorkUnit,
    sst_mean: Option<f64>,
    sst_std: Option<f64>,
    sst_ci95_lower: Option<f64>,
    sst_ci95_upper: Option<f64>,
    sst_n_pixels: u64,
    anomaly_mean: Option<f64>,
    anomaly_std: Option<f64>,
    anomaly_ci95_lower: Option<f64>,
    anomaly_ci95_upper: Option<f64>,
    anomaly_n_pixels: u64,
    dhw_mean: Option<f64>,
    dhw_std: Option<f64>,
    dhw_ci95_lower: Option<f64>,
    dhw_ci95_upper: Option<f64>,
    dhw_n_pixels: u64,
}

type FlatColumns = (Option<f64>, Option<f64>, Option<f64>, Option<f64>, u64);

fn flatten(summary: VariableSummary) -> FlatColumns {
    match summary {
        VariableSummary::Measured {
            mean,
            std,
            ci95_lower,
            ci95_upper,
            n_pixels,
        } => (
            Some(mean),
            Some(std),
            Some(ci95_lower),
            Some(ci95_upper),
            n_pixels,
        ),
        VariableSummary::NoData => (None, None, None, None, 0),
    }
}

fn unflatten(
    variable: Variable,
    columns: FlatColumns,
) -> Result<VariableSummary, PipelineError> {
    match columns {
        (None, None, None, None, 0) => Ok(VariableSummary::NoData),
        (Some(mean), Some(std), Some(ci95_lower), Some(ci95_upper), n_pixels)
            if n_pixels > 0 =>
        {
            Ok(VariableSummary::Measured {
                mean,
                std,
                ci95_lower,
                ci95_upper,
                n_pixels,
            })
        }
        _ => Err(PipelineError::Invalid(format!(
            "summary columns for {} mix null and non-null values",
            variable.key()
        ))),
    }
}

impl From<SummaryRow> for FlatSummaryRow {
    fn from(row: SummaryRow) -> Self {
        let (sst_mean, sst_std, sst_ci95_lower, sst_ci95_upper, sst_n_pixels) =
            flatten(row.primary);
        let (
            anomaly_mean,
            anomaly_std,
            anomaly_ci95_lower,
            anomaly_ci95_upper,
            anomaly_n_pixels,
        ) = flatten(row.anomaly);
        let (dhw_mean, dhw_std, dhw_ci95_lower, dhw_ci95_upper, dhw_n_pixels) =
            flatten(row.accumulated_stress);
        Self {
            date: row.date,
            sst_mean,
            sst_std,
            sst_ci95_lower,
            sst_ci95_upper,
            sst_n_pixels,
            anomaly_mean,
            anomaly_std,
            anomaly_ci95_lower,
            anomaly_ci95_upper,
            anomaly_n_pixels,
            dhw_mean,
            dhw_std,
            dhw_ci95_lower,
            dhw_ci95_upper,
            dhw_n_pixels,
        }
    }
}

impl TryFrom<FlatSummaryRow> for SummaryRow {
    type Error = PipelineError;

    fn try_from(flat: FlatSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            date: flat.date,
            primary: unflatten(
                Variable::Primary,
                (
                    flat.sst_mean,
                    flat.sst_std,
                    flat.sst_ci95_lower,
                    flat.sst_ci95_upper,
                    flat.sst_n_pixels,
                ),
            )?,
            anomaly: unflatten(
                Variable::Anomaly,
                (
                    flat.anomaly_mean,
                    flat.anomaly_std,
                    flat.anomaly_ci95_lower,
                    flat.anomaly_ci95_upper,
                    flat.anomaly_n_pixels,
                ),
            )?,
            accumulated_stress: unflatten(
                Variable::AccumulatedStress,
                (
                    flat.dhw_mean,
                    flat.dhw_std,
                    flat.dhw_ci95_lower,
                    flat.dhw_ci95_upper,
                    flat.dhw_n_pixels,
                ),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn unit() -> WorkUnit {
        WorkUnit(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap())
    }

    fn raw(mean: Option<f64>, std: Option<f64>, count: Option<f64>) -> RawStats {
        RawStats {
            mean,
            std_dev: std,
            count,
        }
    }

    #[test]
    fn zero_count_is_null_regardless_of_inputs() {
        for input in [
            raw(Some(28.5), Some(0.4), Some(0.0)),
            raw(Some(0.0), None, None),
            raw(None, Some(1.0), Some(10.0)),
            raw(Some(f64::NAN), Some(1.0), Some(10.0)),
        ] {
            let summary = VariableSummary::from_raw(input);
            assert_eq!(summary, VariableSummary::NoData);
            assert_eq!(summary.n_pixels(), 0);
            assert_eq!(summary.mean(), None);
        }
    }

    #[test]
    fn interval_brackets_mean_symmetrically() {
        for (mean, std, count) in [
            (28.5, 0.4, 1000.0),
            (-0.12345, 0.98765, 3.0),
            (3.33333, 2.5, 17.0),
            (0.0, 0.0, 1.0),
        ] {
            let summary = VariableSummary::from_raw(raw(Some(mean), Some(std), Some(count)));
            let VariableSummary::Measured {
                mean,
                ci95_lower,
                ci95_upper,
                ..
            } = summary
            else {
                panic!("expected measured summary");
            };
            assert!(ci95_lower <= mean && mean <= ci95_upper);
            assert!(((ci95_upper - mean) - (mean - ci95_lower)).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_std_collapses_interval_and_reports_zero_std() {
        let summary = VariableSummary::from_raw(raw(Some(1.23456), None, Some(1.0)));
        assert_eq!(
            summary,
            VariableSummary::Measured {
                mean: 1.2346,
                std: 0.0,
                ci95_lower: 1.2346,
                ci95_upper: 1.2346,
                n_pixels: 1,
            }
        );
    }

    #[test]
    fn reference_day_matches_hand_computed_interval() {
        let mut output = ReductionOutput::default();
        for variable in Variable::ALL {
            output.insert(format!("{}_mean", variable.key()), Some(28.5));
            output.insert(format!("{}_stdDev", variable.key()), Some(0.4));
            output.insert(format!("{}_count", variable.key()), Some(1000.0));
        }
        let row = SummaryRow::reduce(unit(), &output);
        for variable in Variable::ALL {
            assert_eq!(
                *row.variable(variable),
                VariableSummary::Measured {
                    mean: 28.5,
                    std: 0.4,
                    ci95_lower: 28.4752,
                    ci95_upper: 28.5248,
                    n_pixels: 1000,
                }
            );
        }
    }

    #[test]
    fn flat_record_keeps_null_distinct_from_zero() {
        let mut output = ReductionOutput::default();
        output.insert("sst_mean", Some(0.0));
        output.insert("sst_stdDev", Some(0.0));
        output.insert("sst_count", Some(5.0));
        let row = SummaryRow::reduce(unit(), &output);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["date"], "2024-02-10");
        assert_eq!(json["sst_mean"], 0.0);
        assert_eq!(json["sst_n_pixels"], 5);
        assert!(json["anomaly_mean"].is_null());
        assert!(json["dhw_ci95_upper"].is_null());
        assert_eq!(json["dhw_n_pixels"], 0);

        let back: SummaryRow = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn half_null_record_is_rejected() {
        let json = serde_json::json!({
            "date": "2024-02-10",
            "sst_mean": 1.0, "sst_std": null, "sst_ci95_lower": 1.0,
            "sst_ci95_upper": 1.0, "sst_n_pixels": 3,
            "anomaly_mean": null, "anomaly_std": null, "anomaly_ci95_lower": null,
            "anomaly_ci95_upper": null, "anomaly_n_pixels": 0,
            "dhw_mean": null, "dhw_std": null, "dhw_ci95_lower": null,
            "dhw_ci95_upper": null, "dhw_n_pixels": 0
        });
        assert!(serde_json::from_value::<SummaryRow>(json).is_err());
    }
}
