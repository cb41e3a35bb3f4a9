//! JSON output formatting
//!
//! Machine-readable form of the timing report. Unlike the text report, every
//! reduced record is included; records the text report leaves out carry
//! `"omitted": true`.

use crate::timing::{ManifestPolicy, TimingReport};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One reduced timing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub name: String,
    pub mean: f64,
    pub dispersion: f64,
    /// Left out of the text report (mean <= 0)
    pub omitted: bool,
}

/// Complete timing report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTimingReport {
    /// RFC 3339 timestamp
    pub generated_at: String,
    pub world_size: usize,
    pub policy: ManifestPolicy,
    pub records: Vec<JsonRecord>,
}

impl JsonTimingReport {
    pub fn from_report(report: &TimingReport) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            world_size: report.world_size,
            policy: report.policy,
            records: report
                .records
                .iter()
                .map(|record| JsonRecord {
                    name: record.name.clone(),
                    mean: record.mean,
                    dispersion: record.dispersion,
                    omitted: !record.is_reported(),
                })
                .collect(),
        }
    }
}

/// Serialize a timing report
pub fn report_to_json(report: &TimingReport, pretty: bool) -> Result<String> {
    let json = JsonTimingReport::from_report(report);

    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };

    text.context("Failed to serialize timing report")
}

/// Write a timing report as JSON to `out`
pub fn write_json_report<W: Write>(report: &TimingReport, out: &mut W, pretty: bool) -> Result<()> {
    let json = JsonTimingReport::from_report(report);

    if pretty {
        serde_json::to_writer_pretty(&mut *out, &json)?;
    } else {
        serde_json::to_writer(&mut *out, &json)?;
    }
    writeln!(out)?;

    Ok(())
}

/// Write a timing report as JSON to a file
pub fn write_json_file(output_path: &Path, report: &TimingReport) -> Result<()> {
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    write_json_report(report, &mut file, true)
}
