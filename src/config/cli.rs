//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Single process (default)
    Solo,
    /// All ranks as threads of this process
    Local,
    /// This process is one rank of a TCP group
    Tcp,
}

/// Record pairing policy for the timing report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Reduce in local key order, no agreement step
    Trusted,
    /// Reduce over the union of all ranks' records
    Union,
    /// Fail if ranks hold different records
    Strict,
}

/// geotally - grid cell areas and group-wide timing reports
#[derive(Parser, Debug, Default)]
#[command(name = "geotally")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Execution mode: solo, local, or tcp
    #[arg(long, value_enum)]
    pub mode: Option<ExecutionMode>,

    /// Rank of this process (tcp mode)
    #[arg(long)]
    pub rank: Option<usize>,

    /// Number of ranks in the group
    #[arg(short = 'w', long)]
    pub world_size: Option<usize>,

    /// Coordinator address, e.g. 10.0.1.10:7878 (tcp mode)
    #[arg(long)]
    pub coordinator: Option<String>,

    /// Seconds allowed for the group to form (tcp mode)
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    // === Parallelism ===
    /// Area computation threads (0 = all cores)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Grid cells per work chunk
    #[arg(long)]
    pub chunk_cells: Option<usize>,

    // === Grid ===
    /// Longitude samples; alone, gives a global grid spacing
    #[arg(long)]
    pub nlon: Option<usize>,

    /// Latitude samples; alone, gives a global grid spacing
    #[arg(long)]
    pub nlat: Option<usize>,

    /// Longitude spacing in degrees
    #[arg(long)]
    pub lon_step: Option<f64>,

    /// Latitude spacing in degrees
    #[arg(long)]
    pub lat_step: Option<f64>,

    // === Timing ===
    /// Record pairing policy for the timing report
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Timed repetitions of the area computation
    #[arg(short = 'r', long)]
    pub repeat: Option<usize>,

    /// Also print the timing report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Checks only what can be judged from the flags alone; the merged
    /// configuration is validated by [`validate_config`](super::validator::validate_config).
    pub fn validate(&self) -> anyhow::Result<()> {
        if let (Some(rank), Some(size)) = (self.rank, self.world_size) {
            if rank >= size {
                anyhow::bail!("rank ({}) must be less than world_size ({})", rank, size);
            }
        }

        if self.repeat == Some(0) {
            anyhow::bail!("repeat must be at least 1");
        }

        if self.mode == Some(ExecutionMode::Tcp) && self.rank.is_none() {
            anyhow::bail!("tcp mode requires --rank");
        }

        Ok(())
    }
}
