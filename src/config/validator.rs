//! Configuration validation

use super::*;
use anyhow::Result;

/// Largest grid accepted, in cells
pub const MAX_GRID_CELLS: usize = u32::MAX as usize;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_grid(&config.grid)?;
    validate_parallel(&config.parallel)?;
    validate_timing(&config.timing)?;
    validate_group(&config.group)?;

    Ok(())
}

/// Validate grid configuration
pub fn validate_grid(grid: &GridConfig) -> Result<()> {
    if grid.nlon < 2 || grid.nlat < 2 {
        anyhow::bail!(
            "grid needs at least 2 samples per axis, got nlon={} nlat={}",
            grid.nlon,
            grid.nlat
        );
    }

    for (name, step) in [("lon_step_deg", grid.lon_step_deg), ("lat_step_deg", grid.lat_step_deg)] {
        if !step.is_finite() || step <= 0.0 {
            anyhow::bail!("{} must be a positive number of degrees, got {}", name, step);
        }
    }

    if !grid.lon_start_deg.is_finite() || !grid.lat_start_deg.is_finite() {
        anyhow::bail!("grid start coordinates must be finite");
    }

    let lat_end = grid.lat_end_deg();
    if grid.lat_start_deg < -90.0 || lat_end > 90.0 {
        anyhow::bail!(
            "latitudes must lie within [-90, 90], grid spans [{}, {}]",
            grid.lat_start_deg,
            lat_end
        );
    }

    let cells = grid.nlon.checked_mul(grid.nlat).filter(|cells| *cells <= MAX_GRID_CELLS);
    if cells.is_none() {
        anyhow::bail!("grid of {} x {} cells is too large", grid.nlat, grid.nlon);
    }

    Ok(())
}

/// Validate parallel configuration
pub fn validate_parallel(parallel: &ParallelConfig) -> Result<()> {
    if parallel.chunk_cells == 0 {
        anyhow::bail!("parallel.chunk_cells must be at least 1");
    }

    // Warn if thread count is well above the machine
    let cores = num_cpus::get();
    if parallel.threads > cores * 4 {
        tracing::warn!(
            threads = parallel.threads,
            cores,
            "thread count far exceeds available cores"
        );
    }

    Ok(())
}

/// Validate timing configuration
pub fn validate_timing(timing: &TimingConfig) -> Result<()> {
    if timing.repeat == 0 {
        anyhow::bail!("timing.repeat must be at least 1");
    }

    Ok(())
}

/// Validate process group configuration
pub fn validate_group(group: &GroupConfig) -> Result<()> {
    if group.size == 0 {
        anyhow::bail!("group.size must be at least 1");
    }

    match group.mode {
        GroupMode::Solo => {
            if group.size != 1 || group.rank != 0 {
                anyhow::bail!(
                    "solo mode runs a single rank, got rank {} of {}",
                    group.rank,
                    group.size
                );
            }
        }
        GroupMode::Local => {
            if group.rank != 0 {
                anyhow::bail!("local mode runs every rank in this process; rank must not be set");
            }
        }
        GroupMode::Tcp => {
            if group.rank >= group.size {
                anyhow::bail!("group.rank ({}) must be less than group.size ({})", group.rank, group.size);
            }
            validate_address(&group.coordinator)?;
            if group.connect_timeout_secs == 0 {
                anyhow::bail!("group.connect_timeout_secs must be greater than 0");
            }
        }
    }

    Ok(())
}

/// Check a `host:port` coordinator address
fn validate_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("coordinator address '{}' must be host:port", address))?;

    if host.is_empty() {
        anyhow::bail!("coordinator address '{}' has no host", address);
    }
    port.parse::<u16>()
        .map_err(|_| anyhow::anyhow!("coordinator address '{}' has invalid port '{}'", address, port))?;

    Ok(())
}
