//! Uniform latitude-longitude grids
//!
//! A [`Grid`] holds the longitude and latitude samples (radians) of a uniform
//! spherical grid. Cell areas over a grid are computed by [`area`].
//!
//! # Example
//!
//! ```
//! use geotally::grid::{AxisSpec, Grid};
//!
//! // 1-degree cell-centred global grid
//! let grid = Grid::from_degrees(
//!     &AxisSpec::global_longitude(360),
//!     &AxisSpec::global_latitude(180),
//! )?;
//! assert_eq!(grid.cells(), 360 * 180);
//! # Ok::<(), geotally::grid::AreaError>(())
//! ```

pub mod area;

pub use area::{compute_areas, compute_areas_with, AreaField, AreaOptions, DEFAULT_CHUNK_CELLS};

use crate::constants::D2R;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Grid axis, used to label validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Longitude,
    Latitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Longitude => write!(f, "longitude"),
            Axis::Latitude => write!(f, "latitude"),
        }
    }
}

/// Errors raised while validating grids or computing cell areas
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AreaError {
    #[error("{axis} axis needs at least 2 samples, got {len}")]
    AxisTooShort { axis: Axis, len: usize },

    #[error("{axis} axis must be strictly increasing (sample {index} does not exceed its predecessor)")]
    NonIncreasingAxis { axis: Axis, index: usize },

    #[error("output buffer holds {actual} cells but the grid has {expected}")]
    OutputSizeMismatch { expected: usize, actual: usize },

    #[error("{what} holds {actual} entries but the area field has {expected}")]
    FieldLengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("chunk size must be at least 1 cell")]
    InvalidChunkSize,

    #[error("failed to build area thread pool: {0}")]
    ThreadPool(String),
}

/// Degree-based description of one uniform axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    /// First sample (degrees)
    pub start_deg: f64,
    /// Spacing between samples (degrees)
    pub step_deg: f64,
    /// Number of samples
    pub count: usize,
}

impl AxisSpec {
    /// Cell-centred longitudes spanning the full circle
    pub fn global_longitude(count: usize) -> Self {
        let step_deg = 360.0 / count.max(1) as f64;
        Self {
            start_deg: -180.0 + step_deg / 2.0,
            step_deg,
            count,
        }
    }

    /// Cell-centred latitudes spanning pole to pole
    pub fn global_latitude(count: usize) -> Self {
        let step_deg = 180.0 / count.max(1) as f64;
        Self {
            start_deg: -90.0 + step_deg / 2.0,
            step_deg,
            count,
        }
    }

    /// Sample positions in radians
    pub fn samples(&self) -> Vec<f64> {
        (0..self.count)
            .map(|i| (self.start_deg + i as f64 * self.step_deg) * D2R)
            .collect()
    }
}

/// Validated uniform spherical grid (radians)
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    longitude: Vec<f64>,
    latitude: Vec<f64>,
}

impl Grid {
    /// Create a grid from longitude and latitude samples in radians
    ///
    /// Both axes need at least two samples and must be strictly increasing.
    pub fn new(longitude: Vec<f64>, latitude: Vec<f64>) -> Result<Self, AreaError> {
        validate_axis(Axis::Longitude, &longitude)?;
        validate_axis(Axis::Latitude, &latitude)?;

        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Create a grid from degree-based axis descriptions
    pub fn from_degrees(longitude: &AxisSpec, latitude: &AxisSpec) -> Result<Self, AreaError> {
        Self::new(longitude.samples(), latitude.samples())
    }

    pub fn longitude(&self) -> &[f64] {
        &self.longitude
    }

    pub fn latitude(&self) -> &[f64] {
        &self.latitude
    }

    pub fn nlon(&self) -> usize {
        self.longitude.len()
    }

    pub fn nlat(&self) -> usize {
        self.latitude.len()
    }

    /// Total number of cells (`nlat * nlon`)
    pub fn cells(&self) -> usize {
        self.nlat() * self.nlon()
    }

    /// Longitude spacing, taken from the first two samples
    pub fn dlon(&self) -> f64 {
        self.longitude[1] - self.longitude[0]
    }

    /// Latitude spacing, taken from the first two samples
    pub fn dlat(&self) -> f64 {
        self.latitude[1] - self.latitude[0]
    }
}

fn validate_axis(axis: Axis, samples: &[f64]) -> Result<(), AreaError> {
    if samples.len() < 2 {
        return Err(AreaError::AxisTooShort {
            axis,
            len: samples.len(),
        });
    }

    // Written as !(b > a) so NaN samples are rejected too
    if let Some(index) = samples
        .windows(2)
        .position(|pair| !(pair[1] > pair[0]))
    {
        return Err(AreaError::NonIncreasingAxis {
            axis,
            index: index + 1,
        });
    }

    Ok(())
}
