//! TOML configuration file parsing

use super::*;
use crate::config::cli::{Cli, ExecutionMode, PolicyArg};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Load the configuration file named by `--config` (or defaults) and apply the CLI on top
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    merge_cli_with_config(cli, config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Override group settings
    if let Some(mode) = cli.mode {
        config.group.mode = match mode {
            ExecutionMode::Solo => GroupMode::Solo,
            ExecutionMode::Local => GroupMode::Local,
            ExecutionMode::Tcp => GroupMode::Tcp,
        };
    }
    if let Some(rank) = cli.rank {
        config.group.rank = rank;
    }
    if let Some(size) = cli.world_size {
        config.group.size = size;
    }
    if let Some(ref coordinator) = cli.coordinator {
        config.group.coordinator = coordinator.clone();
    }
    if let Some(secs) = cli.connect_timeout {
        config.group.connect_timeout_secs = secs;
    }

    // Override parallel settings
    if let Some(threads) = cli.threads {
        config.parallel.threads = threads;
    }
    if let Some(chunk_cells) = cli.chunk_cells {
        config.parallel.chunk_cells = chunk_cells;
    }

    // Override grid axes; a count or step alone spans the whole sphere
    let longitude = merge_axis(config.grid.longitude(), cli.nlon, cli.lon_step, 360.0);
    config.grid.lon_start_deg = longitude.start_deg;
    config.grid.lon_step_deg = longitude.step_deg;
    config.grid.nlon = longitude.count;

    let latitude = merge_axis(config.grid.latitude(), cli.nlat, cli.lat_step, 180.0);
    config.grid.lat_start_deg = latitude.start_deg;
    config.grid.lat_step_deg = latitude.step_deg;
    config.grid.nlat = latitude.count;

    // Override timing settings
    if let Some(policy) = cli.policy {
        config.timing.policy = match policy {
            PolicyArg::Trusted => ManifestPolicy::Trusted,
            PolicyArg::Union => ManifestPolicy::Union,
            PolicyArg::Strict => ManifestPolicy::Strict,
        };
    }
    if let Some(repeat) = cli.repeat {
        config.timing.repeat = repeat;
    }
    if cli.json {
        config.timing.json = true;
    }

    Ok(config)
}

/// Replace an axis from CLI count/step overrides
fn merge_axis(axis: AxisSpec, count: Option<usize>, step_deg: Option<f64>, span_deg: f64) -> AxisSpec {
    let (count, step_deg) = match (count, step_deg) {
        (None, None) => return axis,
        (Some(count), None) => (count, span_deg / count.max(1) as f64),
        (None, Some(step)) => ((span_deg / step).round() as usize, step),
        (Some(count), Some(step)) => (count, step),
    };

    AxisSpec {
        start_deg: -span_deg / 2.0 + step_deg / 2.0,
        step_deg,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_toml_basic() {
        let toml = r#"
[grid]
lon_start_deg = 0.0
lon_step_deg = 2.5
nlon = 144
lat_start_deg = -60.0
lat_step_deg = 0.5
nlat = 241

[parallel]
threads = 8
chunk_cells = 1024

[timing]
policy = "strict"
json = true
repeat = 5

[group]
mode = "tcp"
rank = 1
size = 4
coordinator = "node0:9100"
connect_timeout_secs = 5
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.grid.nlon, 144);
        assert_eq!(config.grid.lat_step_deg, 0.5);
        assert_eq!(config.grid.lat_end_deg(), 60.0);
        assert_eq!(config.parallel.threads, 8);
        assert_eq!(config.parallel.chunk_cells, 1024);
        assert_eq!(config.timing.policy, ManifestPolicy::Strict);
        assert!(config.timing.json);
        assert_eq!(config.timing.repeat, 5);
        assert_eq!(config.group.mode, GroupMode::Tcp);
        assert_eq!(config.group.rank, 1);
        assert_eq!(config.group.size, 4);
        assert_eq!(config.group.coordinator, "node0:9100");
        assert_eq!(config.group.connect_timeout_secs, 5);
    }

    #[test]
    fn test_parse_toml_empty_uses_defaults() {
        let config = parse_toml_string("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_toml_partial_section() {
        let toml = r#"
[grid]
nlat = 90

[timing]
policy = "trusted"
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.grid.nlat, 90);
        assert_eq!(config.grid.nlon, 360);
        assert_eq!(config.timing.policy, ManifestPolicy::Trusted);
        assert_eq!(config.timing.repeat, 1);
        assert_eq!(config.group, GroupConfig::default());
    }

    #[test]
    fn test_parse_toml_rejects_unknown_policy() {
        let toml = r#"
[timing]
policy = "majority"
"#;
        assert!(parse_toml_string(toml).is_err());
    }

    #[test]
    fn test_parse_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[group]\nmode = \"local\"\nsize = 3").unwrap();

        let config = parse_toml_file(file.path()).unwrap();
        assert_eq!(config.group.mode, GroupMode::Local);
        assert_eq!(config.group.size, 3);
    }

    #[test]
    fn test_parse_toml_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_toml_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_merge_cli_overrides_config() {
        let config = parse_toml_string("[timing]\npolicy = \"trusted\"\nrepeat = 2\n[group]\nsize = 2").unwrap();
        let cli = Cli {
            mode: Some(ExecutionMode::Local),
            world_size: Some(6),
            policy: Some(PolicyArg::Union),
            threads: Some(2),
            json: true,
            ..Cli::default()
        };

        let merged = merge_cli_with_config(&cli, config).unwrap();
        assert_eq!(merged.group.mode, GroupMode::Local);
        assert_eq!(merged.group.size, 6);
        assert_eq!(merged.timing.policy, ManifestPolicy::Union);
        assert_eq!(merged.timing.repeat, 2);
        assert!(merged.timing.json);
        assert_eq!(merged.parallel.threads, 2);
    }

    #[test]
    fn test_merge_grid_count_and_step() {
        let cli = Cli {
            nlon: Some(720),
            lat_step: Some(2.0),
            ..Cli::default()
        };

        let merged = merge_cli_with_config(&cli, Config::default()).unwrap();
        assert_eq!(merged.grid.nlon, 720);
        assert_eq!(merged.grid.lon_step_deg, 0.5);
        assert_eq!(merged.grid.lon_start_deg, -179.75);
        assert_eq!(merged.grid.nlat, 90);
        assert_eq!(merged.grid.lat_start_deg, -89.0);
        assert_eq!(merged.grid.lat_end_deg(), 89.0);
    }

    #[test]
    fn test_load_config_without_file() {
        let cli = Cli {
            repeat: Some(3),
            ..Cli::default()
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.timing.repeat, 3);
        assert_eq!(config.grid, GridConfig::default());
    }
}
