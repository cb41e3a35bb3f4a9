//! Cell areas of a uniform spherical grid
//!
//! Every cell `(ii, jj)` of a uniform latitude-longitude grid gets the area
//!
//! ```text
//! area[ii * nlon + jj] = R_earth^2 * dlat * dlon * cos(latitude[ii])
//! ```
//!
//! where `dlat` and `dlon` come from the first two samples of each axis. Area
//! therefore depends on the latitude row only.
//!
//! The flat index space is cut into chunks that rayon workers claim
//! dynamically. Chunks never overlap, so workers write without locking and the
//! output is identical for any schedule.
//!
//! # Example
//!
//! ```
//! use geotally::grid::compute_areas;
//!
//! let longitude = [0.0, 0.01, 0.02, 0.03];
//! let latitude = [0.0, 0.01, 0.02];
//! let mut areas = vec![0.0; 12];
//!
//! compute_areas(&mut areas, &longitude, &latitude)?;
//! assert_eq!(areas[4], areas[7]); // same latitude row
//! # Ok::<(), geotally::grid::AreaError>(())
//! ```

use super::{AreaError, Axis, Grid};
use crate::constants::R_EARTH;
use rayon::prelude::*;

/// Default number of cells per work chunk
pub const DEFAULT_CHUNK_CELLS: usize = 4096;

/// Scheduling options for the area computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaOptions {
    /// Worker threads for a dedicated pool (0 = rayon's global pool)
    pub threads: usize,
    /// Cells per chunk handed to a worker
    pub chunk_cells: usize,
}

impl Default for AreaOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            chunk_cells: DEFAULT_CHUNK_CELLS,
        }
    }
}

/// Fill `areas` with the cell areas of the grid given by `longitude` and `latitude`
///
/// Uses rayon's global pool and [`DEFAULT_CHUNK_CELLS`]. `areas` must hold
/// exactly `latitude.len() * longitude.len()` cells.
pub fn compute_areas(areas: &mut [f64], longitude: &[f64], latitude: &[f64]) -> Result<(), AreaError> {
    compute_areas_with(areas, longitude, latitude, &AreaOptions::default())
}

/// Fill `areas` like [`compute_areas`] with explicit scheduling options
///
/// # Errors
///
/// - [`AreaError::AxisTooShort`] if either axis has fewer than 2 samples
/// - [`AreaError::OutputSizeMismatch`] if `areas` is not `nlat * nlon` long
/// - [`AreaError::InvalidChunkSize`] if `options.chunk_cells` is 0
/// - [`AreaError::ThreadPool`] if a dedicated pool cannot be built
pub fn compute_areas_with(
    areas: &mut [f64],
    longitude: &[f64],
    latitude: &[f64],
    options: &AreaOptions,
) -> Result<(), AreaError> {
    let nlon = longitude.len();
    let nlat = latitude.len();

    if nlon < 2 {
        return Err(AreaError::AxisTooShort { axis: Axis::Longitude, len: nlon });
    }
    if nlat < 2 {
        return Err(AreaError::AxisTooShort { axis: Axis::Latitude, len: nlat });
    }

    let expected = nlat.saturating_mul(nlon);
    if areas.len() != expected {
        return Err(AreaError::OutputSizeMismatch {
            expected,
            actual: areas.len(),
        });
    }

    if options.chunk_cells == 0 {
        return Err(AreaError::InvalidChunkSize);
    }

    // Uniform grid: only the first spacing of each axis is sampled
    let dlat = latitude[1] - latitude[0];
    let dlon = longitude[1] - longitude[0];
    let coeff = R_EARTH.powi(2) * dlat * dlon;

    if options.threads == 0 {
        fill_cells(areas, latitude, nlon, coeff, options.chunk_cells);
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| AreaError::ThreadPool(e.to_string()))?;
        pool.install(|| fill_cells(areas, latitude, nlon, coeff, options.chunk_cells));
    }

    tracing::debug!(
        nlat,
        nlon,
        chunks = expected.div_ceil(options.chunk_cells),
        threads = options.threads,
        "computed cell areas"
    );

    Ok(())
}

fn fill_cells(areas: &mut [f64], latitude: &[f64], nlon: usize, coeff: f64, chunk_cells: usize) {
    areas
        .par_chunks_mut(chunk_cells)
        .enumerate()
        .for_each(|(chunk, cells)| {
            let first = chunk * chunk_cells;
            for (offset, cell) in cells.iter_mut().enumerate() {
                let ii = (first + offset) / nlon;
                *cell = coeff * latitude[ii].cos();
            }
        });
}

/// Owned cell-area field of a grid, row-major by latitude
#[derive(Debug, Clone, PartialEq)]
pub struct AreaField {
    values: Vec<f64>,
    nlon: usize,
    nlat: usize,
}

impl AreaField {
    /// Compute the area field of `grid`
    pub fn compute(grid: &Grid, options: &AreaOptions) -> Result<Self, AreaError> {
        let mut values = vec![0.0; grid.cells()];
        compute_areas_with(&mut values, grid.longitude(), grid.latitude(), options)?;

        Ok(Self {
            values,
            nlon: grid.nlon(),
            nlat: grid.nlat(),
        })
    }

    pub fn nlon(&self) -> usize {
        self.nlon
    }

    pub fn nlat(&self) -> usize {
        self.nlat
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    /// Area of cell `(ii, jj)`, or `None` outside the grid
    pub fn get(&self, ii: usize, jj: usize) -> Option<f64> {
        if ii >= self.nlat || jj >= self.nlon {
            return None;
        }
        Some(self.values[ii * self.nlon + jj])
    }

    /// All cells of latitude row `ii`
    pub fn row(&self, ii: usize) -> Option<&[f64]> {
        if ii >= self.nlat {
            return None;
        }
        let start = ii * self.nlon;
        Some(&self.values[start..start + self.nlon])
    }

    /// Sum of all cell areas
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Area-weighted sum of `field`, restricted to cells where `mask` is true
    ///
    /// With no mask every cell contributes.
    pub fn weighted_sum(&self, field: &[f64], mask: Option<&[bool]>) -> Result<f64, AreaError> {
        if field.len() != self.values.len() {
            return Err(AreaError::FieldLengthMismatch {
                what: "field",
                expected: self.values.len(),
                actual: field.len(),
            });
        }

        match mask {
            Some(mask) => {
                if mask.len() != self.values.len() {
                    return Err(AreaError::FieldLengthMismatch {
                        what: "mask",
                        expected: self.values.len(),
                        actual: mask.len(),
                    });
                }
                Ok(self
                    .values
                    .iter()
                    .zip(field)
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|((area, value), _)| area * value)
                    .sum())
            }
            None => Ok(self.values.iter().zip(field).map(|(area, value)| area * value).sum()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::AxisSpec;
    use std::f64::consts::PI;

    fn small_grid() -> (Vec<f64>, Vec<f64>, f64, f64) {
        let d = 0.05;
        let e = 0.08;
        let latitude = vec![0.0, d, 2.0 * d];
        let longitude = vec![0.0, e, 2.0 * e, 3.0 * e];
        (longitude, latitude, d, e)
    }

    #[test]
    fn test_compute_areas_formula() {
        let (longitude, latitude, d, e) = small_grid();
        let mut areas = vec![0.0; 12];

        compute_areas(&mut areas, &longitude, &latitude).unwrap();

        for ii in 0..3 {
            let expected = R_EARTH.powi(2) * d * e * latitude[ii].cos();
            for jj in 0..4 {
                let got = areas[ii * 4 + jj];
                assert!((got - expected).abs() <= expected * 1e-12, "cell ({}, {})", ii, jj);
            }
        }
    }

    #[test]
    fn test_rows_are_constant() {
        let grid = Grid::from_degrees(
            &AxisSpec::global_longitude(37),
            &AxisSpec::global_latitude(23),
        )
        .unwrap();
        // Tiny chunks so rows straddle chunk boundaries
        let options = AreaOptions { threads: 3, chunk_cells: 5 };
        let field = AreaField::compute(&grid, &options).unwrap();

        for ii in 0..grid.nlat() {
            let row = field.row(ii).unwrap();
            assert!(row.iter().all(|&a| a == row[0]), "row {} not constant", ii);
        }
    }

    #[test]
    fn test_output_independent_of_schedule() {
        let grid = Grid::from_degrees(
            &AxisSpec::global_longitude(90),
            &AxisSpec::global_latitude(45),
        )
        .unwrap();

        let reference = AreaField::compute(&grid, &AreaOptions { threads: 1, chunk_cells: 4050 }).unwrap();
        let chunked = AreaField::compute(&grid, &AreaOptions { threads: 4, chunk_cells: 7 }).unwrap();
        let global = AreaField::compute(&grid, &AreaOptions::default()).unwrap();

        assert_eq!(reference, chunked);
        assert_eq!(reference, global);
    }

    #[test]
    fn test_global_total_matches_sphere() {
        let grid = Grid::from_degrees(
            &AxisSpec::global_longitude(360),
            &AxisSpec::global_latitude(180),
        )
        .unwrap();
        let field = AreaField::compute(&grid, &AreaOptions::default()).unwrap();

        let sphere = 4.0 * PI * R_EARTH.powi(2);
        let relative = (field.total() - sphere).abs() / sphere;
        assert!(relative < 1e-4, "relative error {}", relative);
    }

    #[test]
    fn test_short_axes_rejected() {
        let mut areas = vec![0.0; 2];
        let err = compute_areas(&mut areas, &[0.0], &[0.0, 0.1]).unwrap_err();
        assert_eq!(err, AreaError::AxisTooShort { axis: Axis::Longitude, len: 1 });

        let err = compute_areas(&mut areas, &[0.0, 0.1], &[0.0]).unwrap_err();
        assert_eq!(err, AreaError::AxisTooShort { axis: Axis::Latitude, len: 1 });
    }

    #[test]
    fn test_output_size_mismatch_rejected() {
        let (longitude, latitude, _, _) = small_grid();

        let mut short = vec![0.0; 11];
        let err = compute_areas(&mut short, &longitude, &latitude).unwrap_err();
        assert_eq!(err, AreaError::OutputSizeMismatch { expected: 12, actual: 11 });

        let mut long = vec![-1.0; 13];
        let err = compute_areas(&mut long, &longitude, &latitude).unwrap_err();
        assert_eq!(err, AreaError::OutputSizeMismatch { expected: 12, actual: 13 });
        // Nothing written on failure
        assert!(long.iter().all(|&a| a == -1.0));
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let (longitude, latitude, _, _) = small_grid();
        let mut areas = vec![0.0; 12];
        let options = AreaOptions { threads: 0, chunk_cells: 0 };

        let err = compute_areas_with(&mut areas, &longitude, &latitude, &options).unwrap_err();
        assert_eq!(err, AreaError::InvalidChunkSize);
    }

    #[test]
    fn test_field_accessors() {
        let (longitude, latitude, _, _) = small_grid();
        let grid = Grid::new(longitude, latitude).unwrap();
        let field = AreaField::compute(&grid, &AreaOptions::default()).unwrap();

        assert_eq!(field.len(), 12);
        assert_eq!(field.nlat(), 3);
        assert_eq!(field.nlon(), 4);
        assert_eq!(field.get(1, 3), Some(field.as_slice()[7]));
        assert_eq!(field.get(3, 0), None);
        assert_eq!(field.get(0, 4), None);
        assert!(field.row(3).is_none());
        // Area shrinks away from the equator
        assert!(field.get(0, 0).unwrap() > field.get(2, 0).unwrap());
    }

    #[test]
    fn test_weighted_sum() {
        let (longitude, latitude, _, _) = small_grid();
        let grid = Grid::new(longitude, latitude).unwrap();
        let field = AreaField::compute(&grid, &AreaOptions::default()).unwrap();

        let ones = vec![1.0; 12];
        let total = field.weighted_sum(&ones, None).unwrap();
        assert!((total - field.total()).abs() <= field.total() * 1e-12);

        let mut mask = vec![false; 12];
        mask[0] = true;
        mask[5] = true;
        let twos = vec![2.0; 12];
        let masked = field.weighted_sum(&twos, Some(&mask)).unwrap();
        let expected = 2.0 * (field.as_slice()[0] + field.as_slice()[5]);
        assert!((masked - expected).abs() <= expected * 1e-12);
    }

    #[test]
    fn test_weighted_sum_length_mismatch() {
        let (longitude, latitude, _, _) = small_grid();
        let grid = Grid::new(longitude, latitude).unwrap();
        let field = AreaField::compute(&grid, &AreaOptions::default()).unwrap();

        let err = field.weighted_sum(&[1.0; 3], None).unwrap_err();
        assert!(matches!(err, AreaError::FieldLengthMismatch { what: "field", .. }));

        let err = field.weighted_sum(&[1.0; 12], Some(&[true; 2])).unwrap_err();
        assert!(matches!(err, AreaError::FieldLengthMismatch { what: "mask", .. }));
    }
}
