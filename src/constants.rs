//! Physical and unit-conversion constants
//!
//! Single source for the constants shared by the grid and reporting code.

use std::f64::consts::PI;

/// Mean radius of the Earth in metres
pub const R_EARTH: f64 = 6371e3;

/// Degrees to radians
pub const D2R: f64 = PI / 180.0;

/// Radians to degrees
pub const R2D: f64 = 180.0 / PI;

/// Width of the name column in the text timing report
pub const TIMING_NAME_WIDTH: usize = 35;
