//! geotally - grid cell areas and distributed run timings
//!
//! Two building blocks for parallel geophysical codes:
//!
//! - **Cell areas**: area of every cell of a uniform longitude/latitude grid on
//!   a spherical Earth, computed in parallel with rayon
//! - **Timing records**: named wall-clock accumulators, reduced across every
//!   rank of a process group into a mean / dispersion report
//!
//! # Architecture
//!
//! - `grid`: axes, validation, and the [`AreaField`] computation
//! - `timing`: [`TimingRegistry`] and the collective report
//! - `group`: the [`ProcessGroup`](group::ProcessGroup) trait with solo,
//!   in-process (threads) and TCP implementations
//! - `config` / `output`: CLI, TOML configuration, and report rendering

pub mod config;
pub mod constants;
pub mod grid;
pub mod group;
pub mod output;
pub mod timing;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use grid::{AreaError, AreaField, Grid};
pub use timing::{ManifestPolicy, TimingError, TimingRegistry};

/// Result type used throughout geotally
pub type Result<T> = anyhow::Result<T>;
