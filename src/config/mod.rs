//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! Every section and field has a default, so an empty TOML file (or no file
//! at all) describes a solo run over a 1° global grid.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::grid::{AreaOptions, AxisSpec, DEFAULT_CHUNK_CELLS};
use crate::timing::ManifestPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub group: GroupConfig,
}

/// Uniform longitude/latitude grid, in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub lon_start_deg: f64,
    pub lon_step_deg: f64,
    pub nlon: usize,
    pub lat_start_deg: f64,
    pub lat_step_deg: f64,
    pub nlat: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::global(360, 180)
    }
}

impl GridConfig {
    /// Cell-centred grid covering the whole sphere
    pub fn global(nlon: usize, nlat: usize) -> Self {
        let lon = AxisSpec::global_longitude(nlon);
        let lat = AxisSpec::global_latitude(nlat);
        Self {
            lon_start_deg: lon.start_deg,
            lon_step_deg: lon.step_deg,
            nlon,
            lat_start_deg: lat.start_deg,
            lat_step_deg: lat.step_deg,
            nlat,
        }
    }

    pub fn longitude(&self) -> AxisSpec {
        AxisSpec {
            start_deg: self.lon_start_deg,
            step_deg: self.lon_step_deg,
            count: self.nlon,
        }
    }

    pub fn latitude(&self) -> AxisSpec {
        AxisSpec {
            start_deg: self.lat_start_deg,
            step_deg: self.lat_step_deg,
            count: self.nlat,
        }
    }

    /// Last latitude sample (degrees)
    pub fn lat_end_deg(&self) -> f64 {
        self.lat_start_deg + self.nlat.saturating_sub(1) as f64 * self.lat_step_deg
    }
}

/// Thread pool and chunking for the area computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Dedicated pool size (0 = rayon's global pool)
    pub threads: usize,
    /// Cells per work chunk
    pub chunk_cells: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            chunk_cells: DEFAULT_CHUNK_CELLS,
        }
    }
}

impl ParallelConfig {
    pub fn area_options(&self) -> AreaOptions {
        AreaOptions {
            threads: self.threads,
            chunk_cells: self.chunk_cells,
        }
    }

    /// Threads the computation will actually use
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Timing report settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How record names are paired across ranks
    pub policy: ManifestPolicy,
    /// Also print the report as JSON on rank 0
    pub json: bool,
    /// Timed repetitions of the area computation
    pub repeat: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            policy: ManifestPolicy::default(),
            json: false,
            repeat: 1,
        }
    }
}

/// How the ranks of a run are connected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    /// Single process
    #[default]
    Solo,
    /// `size` ranks as threads of this process
    Local,
    /// One process per rank, linked over TCP
    Tcp,
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupMode::Solo => write!(f, "solo"),
            GroupMode::Local => write!(f, "local"),
            GroupMode::Tcp => write!(f, "tcp"),
        }
    }
}

/// Process group settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub mode: GroupMode,
    /// This process's rank (tcp mode)
    pub rank: usize,
    /// Number of ranks
    pub size: usize,
    /// Address rank 0 listens on and members connect to
    pub coordinator: String,
    /// Limit for forming the group; collectives themselves never time out
    pub connect_timeout_secs: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            mode: GroupMode::Solo,
            rank: 0,
            size: 1,
            coordinator: "127.0.0.1:7878".to_string(),
            connect_timeout_secs: 30,
        }
    }
}

impl GroupConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
