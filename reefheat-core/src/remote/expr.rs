//! Image-algebra expressions evaluated by the remote compute service.
//!
//! Expressions are plain data: the pipeline builds them, the remote side
//! evaluates them lazily, and nothing here touches pixels.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::AssetPath;

/// Observation collection and band the daily products are derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub collection: String,
    pub band: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Subtract,
    Multiply,
    Divide,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalReducer {
    Mean,
    Sum,
}

/// Statistics requested from a regional reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionReducer {
    /// `{band}_mean`, `{band}_stdDev`, `{band}_count` per band.
    MeanStdDevCount,
    /// `{band}` maximum per band.
    Max,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    /// The single observation of `source` on `date`.
    Observation { source: SourceRef, date: NaiveDate },
    /// The per-day observation bound by the enclosing [`Expr::Temporal`].
    Current,
    /// A stored asset, optionally narrowed to one band.
    Asset {
        path: AssetPath,
        band: Option<String>,
    },
    Constant { value: f64 },
    Binary {
        #[serde(rename = "operator")]
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Cells below `threshold` are replaced with `fill`.
    Threshold {
        input: Box<Expr>,
        threshold: f64,
        fill: f64,
    },
    /// Reduces `body` over each daily observation in `first..=last`.
    Temporal {
        source: SourceRef,
        first: NaiveDate,
        last: NaiveDate,
        reducer: TemporalReducer,
        body: Box<Expr>,
    },
    /// Cell-wise maximum of several expressions.
    MaxOf { inputs: Vec<Expr> },
    /// Stacks named bands into one multi-band expression.
    Bands { bands: Vec<(String, Expr)> },
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Constant { value }
    }

    pub fn asset(path: AssetPath, band: Option<String>) -> Self {
        Expr::Asset { path, band }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn subtract(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Subtract, self, rhs)
    }

    pub fn multiply(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Multiply, self, rhs)
    }

    pub fn divide(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Divide, self, rhs)
    }

    pub fn max(self, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Max, self, rhs)
    }

    pub fn threshold(self, threshold: f64, fill: f64) -> Self {
        Expr::Threshold {
            input: Box::new(self),
            threshold,
            fill,
        }
    }
}
