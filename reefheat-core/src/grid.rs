//! Local raster fields.
//!
//! A [`Grid`] is a width x height block of optional values where `None` marks
//! a masked cell (land, no coverage). A [`Raster`] is a set of equally shaped,
//! named bands, the unit handed to the remote service for asset ingestion.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    values: Vec<Option<f64>>,
}

impl Grid {
    pub fn new(width: usize, height: usize, values: Vec<Option<f64>>) -> Result<Self> {
        if width * height != values.len() {
            return Err(PipelineError::Invalid(format!(
                "grid {width}x{height} cannot hold {} cells",
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Single-cell grid, handy for region-wide scalars.
    pub fn scalar(value: f64) -> Self {
        Self {
            width: 1,
            height: 1,
            values: vec![Some(value)],
        }
    }

    pub fn filled(width: usize, height: usize, value: Option<f64>) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values[y * self.width + x]
    }

    pub fn ensure_same_shape(&self, other: &Grid) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(PipelineError::Invalid(format!(
                "grid shape mismatch: {:?} vs {:?}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(())
    }

    /// Cell-wise combination; a masked cell on either side stays masked.
    pub fn zip_with(
        &self,
        other: &Grid,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Grid> {
        self.ensure_same_shape(other)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(f(*a, *b)),
                _ => None,
            })
            .collect();
        Ok(Grid {
            width: self.width,
            height: self.height,
            values,
        })
    }

    /// Cell-wise maximum across grids, ignoring masked inputs.
    pub fn cellwise_max<'a>(
        grids: impl IntoIterator<Item = &'a Grid>,
    ) -> Result<Grid> {
        let mut iter = grids.into_iter();
        let first = iter.next().ok_or_else(|| {
            PipelineError::Invalid("cannot take maximum of zero grids".into())
        })?;
        let mut acc = first.clone();
        for grid in iter {
            acc.ensure_same_shape(grid)?;
            for (slot, value) in acc.values.iter_mut().zip(&grid.values) {
                *slot = match (*slot, *value) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (None, other) => other,
                    (current, None) => current,
                };
            }
        }
        Ok(acc)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub grid: Grid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    bands: Vec<Band>,
}

impl Raster {
    pub fn new(bands: Vec<Band>) -> Result<Self> {
        let Some(first) = bands.first() else {
            return Err(PipelineError::Invalid("raster has no bands".into()));
        };
        for band in &bands[1..] {
            first.grid.ensure_same_shape(&band.grid)?;
        }
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, name: &str) -> Option<&Grid> {
        self.bands
            .iter()
            .find(|band| band.name == name)
            .map(|band| &band.grid)
    }
}
