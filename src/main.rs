//! geotally CLI entry point

use anyhow::{Context, Result};
use geotally::config::{cli::Cli, toml::load_config, validator::validate_config, Config, GroupMode};
use geotally::grid::{AreaField, Grid};
use geotally::group::{LocalGroup, ProcessGroup, SoloGroup, TcpGroup};
use geotally::output::{json, text};
use geotally::timing::TimingRegistry;
use geotally::util::time::{per_pass, Timestamp};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    init_logging(cli.debug);
    cli.validate()?;

    let config = load_config(&cli)?;
    validate_config(&config).context("Configuration validation failed")?;

    tracing::debug!(?config, "configuration loaded");

    // Handle different execution modes
    match config.group.mode {
        GroupMode::Solo => run_solo(&config),
        GroupMode::Local => run_local(&config),
        GroupMode::Tcp => run_tcp(&config),
    }
}

/// Log to stderr; stdout carries the reports
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Run in solo mode (single process)
fn run_solo(config: &Config) -> Result<()> {
    print_banner(config);
    run_rank(config, &SoloGroup)
}

/// Run every rank as a thread of this process
fn run_local(config: &Config) -> Result<()> {
    print_banner(config);

    LocalGroup::run_ranks(config.group.size, |group| run_rank(config, &group))?;
    Ok(())
}

/// Run as one rank of a TCP group
fn run_tcp(config: &Config) -> Result<()> {
    let group = TcpGroup::connect(
        config.group.rank,
        config.group.size,
        &config.group.coordinator,
        config.group.connect_timeout(),
    )
    .context("Failed to form process group")?;

    if group.is_coordinator() {
        print_banner(config);
    }

    run_rank(config, &group)
}

fn print_banner(config: &Config) {
    println!("geotally v{}", env!("CARGO_PKG_VERSION"));
    println!();
    text::print_configuration(config, config.parallel.effective_threads());
    println!();
}

/// Work of one rank: compute the areas, then join the collective timing report
fn run_rank<G: ProcessGroup + ?Sized>(config: &Config, group: &G) -> Result<()> {
    let grid = Grid::from_degrees(&config.grid.longitude(), &config.grid.latitude())?;
    let options = config.parallel.area_options();
    let mut timings = TimingRegistry::new();

    let started = Timestamp::now();
    let mut field = timings.time("compute_areas", || AreaField::compute(&grid, &options))?;
    for _ in 1..config.timing.repeat {
        field = timings.time("compute_areas", || AreaField::compute(&grid, &options))?;
    }
    let pass_time = per_pass(started.elapsed(), config.timing.repeat);

    let total = timings.time("integrate", || field.total());
    tracing::debug!(rank = group.rank(), total, "integrated cell areas");

    if group.is_coordinator() {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        text::write_area_summary(&mut out, &grid, &field, pass_time)?;
        out.flush()?;
    }

    let report = timings.print(group, config.timing.policy)?;

    if config.timing.json && group.is_coordinator() {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out)?;
        json::write_json_report(&report, &mut out, true)?;
    }

    Ok(())
}
