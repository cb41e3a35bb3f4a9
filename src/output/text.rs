//! Human-readable text output

use crate::config::Config;
use crate::constants::{R2D, R_EARTH, TIMING_NAME_WIDTH};
use crate::grid::{AreaField, Grid};
use crate::timing::TimingReport;
use crate::util::format::{format_area, format_scientific};
use crate::util::time::format_duration;
use std::f64::consts::PI;
use std::io::{self, Write};
use std::time::Duration;

/// Write the group-wide timing report
///
/// Only records with a positive mean are listed:
///
/// ```text
///
///
/// ## Internal Timings : mean ( standard deviation )
///
///   compute_areas                       : 1.234000e-02 ( 5.000000e-04 )
/// ```
pub fn write_timing_report<W: Write>(report: &TimingReport, out: &mut W) -> io::Result<()> {
    write!(out, "\n\n## Internal Timings : mean ( standard deviation )\n\n")?;

    for record in report.reported() {
        writeln!(
            out,
            "  {:<width$} : {} ( {} )",
            record.name,
            format_scientific(record.mean),
            format_scientific(record.dispersion),
            width = TIMING_NAME_WIDTH
        )?;
    }

    Ok(())
}

/// Write the area summary of one computed field
///
/// Displays:
/// - Grid shape and spacing
/// - Summed cell area against the full sphere
/// - Smallest and largest rows
pub fn write_area_summary<W: Write>(out: &mut W, grid: &Grid, field: &AreaField, elapsed: Duration) -> io::Result<()> {
    let total = field.total();
    let sphere = 4.0 * PI * R_EARTH * R_EARTH;

    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    writeln!(out, "                    CELL AREAS")?;
    writeln!(out, "═══════════════════════════════════════════════════════════")?;
    writeln!(out)?;
    writeln!(
        out,
        "Grid:        {} x {} cells ({:.4}° x {:.4}°)",
        grid.nlat(),
        grid.nlon(),
        grid.dlat() * R2D,
        grid.dlon() * R2D
    )?;
    writeln!(out, "Compute:     {}", format_duration(elapsed))?;
    writeln!(out)?;
    writeln!(out, "Total area:  {} ({})", format_area(total), format_scientific(total))?;
    writeln!(out, "Sphere area: {} ({:.2}% covered)", format_area(sphere), total / sphere * 100.0)?;

    // Rows are constant, so the first cell stands for the whole row
    let mut rows = (0..field.nlat()).filter_map(|ii| field.get(ii, 0).map(|area| (ii, area)));
    if let Some(first) = rows.next() {
        let (smallest, largest) = rows.fold((first, first), |(lo, hi), row| {
            (if row.1 < lo.1 { row } else { lo }, if row.1 > hi.1 { row } else { hi })
        });
        writeln!(
            out,
            "Cell area:   {} (lat {:.2}°) .. {} (lat {:.2}°)",
            format_area(smallest.1),
            grid.latitude()[smallest.0] * R2D,
            format_area(largest.1),
            grid.latitude()[largest.0] * R2D
        )?;
    }

    Ok(())
}

/// Print the effective configuration to console
pub fn print_configuration(config: &Config, effective_threads: usize) {
    println!("Configuration:");
    println!(
        "  Grid:     {} x {} (lat {}..{} step {}°, lon from {} step {}°)",
        config.grid.nlat,
        config.grid.nlon,
        config.grid.lat_start_deg,
        config.grid.lat_end_deg(),
        config.grid.lat_step_deg,
        config.grid.lon_start_deg,
        config.grid.lon_step_deg
    );
    println!(
        "  Threads:  {} (chunks of {} cells)",
        effective_threads, config.parallel.chunk_cells
    );
    println!("  Group:    {} x{}", config.group.mode, config.group.size);
    println!("  Policy:   {}", config.timing.policy);
    println!("  Repeat:   {}", config.timing.repeat);
}
