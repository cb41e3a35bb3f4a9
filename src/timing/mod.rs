//! Named wall-clock timing records
//!
//! A [`TimingRegistry`] accumulates durations (seconds) under string names for
//! the lifetime of a run. The host owns one registry per process and passes it
//! by `&mut` to every call site that records time.
//!
//! On request the registry produces a group-wide report: for every record,
//! the mean over all ranks and a dispersion value, computed through blocking
//! collective reductions on a [`ProcessGroup`]. Rank 0 writes the report.
//!
//! # Reduction order
//!
//! Records are reduced one at a time, so every rank must walk the same names
//! in the same order. [`ManifestPolicy`] decides how that order is obtained:
//!
//! - `Trusted`: each rank walks its own records in key order, with no
//!   agreement step. Ranks with different record sets silently pair mismatched
//!   records, or block forever if the counts differ.
//! - `Union`: ranks first exchange their name manifests and reduce over the
//!   sorted union; a rank lacking a record contributes 0.
//! - `Strict`: ranks exchange manifests and all fail with
//!   [`TimingError::ManifestMismatch`] unless every rank has the same set.
//!
//! # Example
//!
//! ```
//! use geotally::group::SoloGroup;
//! use geotally::timing::{ManifestPolicy, TimingRegistry};
//!
//! let mut timings = TimingRegistry::new();
//! timings.add_to_record(0.25, "filtering");
//! timings.add_to_record(0.50, "filtering");
//! timings.add_to_record(0.10, "io");
//!
//! let report = timings.summarize(&SoloGroup, ManifestPolicy::Union)?;
//! assert_eq!(report.get("filtering").unwrap().mean, 0.75);
//! # Ok::<(), geotally::timing::TimingError>(())
//! ```

pub mod report;

pub use report::{RecordSummary, TimingReport};

use crate::group::ProcessGroup;
use crate::util::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;

/// How record names are paired across ranks before reducing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestPolicy {
    /// Reduce in local key order without checking other ranks
    Trusted,
    /// Reduce over the sorted union of all ranks' names
    #[default]
    Union,
    /// Fail unless every rank holds the same names
    Strict,
}

impl fmt::Display for ManifestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestPolicy::Trusted => write!(f, "trusted"),
            ManifestPolicy::Union => write!(f, "union"),
            ManifestPolicy::Strict => write!(f, "strict"),
        }
    }
}

/// Errors raised while producing a timing report
#[derive(Debug, Error)]
pub enum TimingError {
    #[error("record manifests disagree: rank {rank} lacks {missing:?}")]
    ManifestMismatch { rank: usize, missing: Vec<String> },

    #[error(transparent)]
    Group(#[from] anyhow::Error),

    #[error("failed to write timing report: {0}")]
    Io(#[from] io::Error),
}

/// Accumulated durations by record name
#[derive(Debug, Clone, Default)]
pub struct TimingRegistry {
    /// Accumulated seconds, in key order
    records: BTreeMap<String, f64>,

    /// Names in first-registration order
    record_names: Vec<String>,
}

impl TimingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` seconds to record `name`, creating it on first use
    pub fn add_to_record(&mut self, delta: f64, name: &str) {
        match self.records.get_mut(name) {
            Some(total) => *total += delta,
            None => {
                self.records.insert(name.to_string(), delta);
                self.record_names.push(name.to_string());
            }
        }
    }

    /// Add a measured duration to record `name`
    pub fn add_duration(&mut self, delta: Duration, name: &str) {
        self.add_to_record(delta.as_secs_f64(), name);
    }

    /// Run `f`, adding its wall-clock time to record `name`
    pub fn time<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let started = Timestamp::now();
        let result = f();
        self.add_duration(started.elapsed(), name);
        result
    }

    /// Zero every accumulator; names and their order are kept
    pub fn reset(&mut self) {
        for total in self.records.values_mut() {
            *total = 0.0;
        }
    }

    /// Accumulated seconds of record `name`
    pub fn get(&self, name: &str) -> Option<f64> {
        self.records.get(name).copied()
    }

    /// Record names in first-registration order
    pub fn record_names(&self) -> &[String] {
        &self.record_names
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.records.iter().map(|(name, total)| (name.as_str(), *total))
    }

    /// Reduce every record across `group` into a report
    ///
    /// Collective: every rank of the group must call this with the same
    /// policy. Every rank receives the same report.
    ///
    /// For a record with local value `v` on `W` ranks:
    /// `mean = sum(v) / W` and `dispersion = sqrt(sum((v - mean)^2)) / W`.
    pub fn summarize<G>(&self, group: &G, policy: ManifestPolicy) -> Result<TimingReport, TimingError>
    where
        G: ProcessGroup + ?Sized,
    {
        let names: Vec<String> = match policy {
            ManifestPolicy::Trusted => self.records.keys().cloned().collect(),
            ManifestPolicy::Union | ManifestPolicy::Strict => {
                let manifests = group.all_gather_names(&self.record_names)?;
                agree_on_names(&manifests, policy, group.is_coordinator())?
            }
        };

        let world = group.size() as f64;
        let mut records = Vec::with_capacity(names.len());

        for name in names {
            let value = self.records.get(&name).copied().unwrap_or(0.0);

            let mean = group.all_reduce_sum(value)? / world;
            let squared_deviation = (value - mean).powi(2);
            let dispersion = group.all_reduce_sum(squared_deviation)?.sqrt() / world;

            records.push(RecordSummary {
                name,
                mean,
                dispersion,
            });
        }

        tracing::debug!(
            rank = group.rank(),
            records = records.len(),
            %policy,
            "summarized timing records"
        );

        Ok(TimingReport {
            world_size: group.size(),
            policy,
            records,
        })
    }

    /// Reduce across `group` and write the text report to `out` on rank 0
    ///
    /// Collective, like [`summarize`](Self::summarize). Other ranks write nothing.
    pub fn write_report<G, W>(&self, group: &G, policy: ManifestPolicy, out: &mut W) -> Result<TimingReport, TimingError>
    where
        G: ProcessGroup + ?Sized,
        W: Write,
    {
        let report = self.summarize(group, policy)?;

        if group.is_coordinator() {
            crate::output::text::write_timing_report(&report, out)?;
            out.flush()?;
        }

        Ok(report)
    }

    /// Reduce across `group` and print the text report to stdout on rank 0
    pub fn print<G>(&self, group: &G, policy: ManifestPolicy) -> Result<TimingReport, TimingError>
    where
        G: ProcessGroup + ?Sized,
    {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_report(group, policy, &mut out)
    }
}

/// Measures one span of wall-clock time for a named record
///
/// ```
/// use geotally::timing::{Stopwatch, TimingRegistry};
///
/// let mut timings = TimingRegistry::new();
/// let watch = Stopwatch::start("setup");
/// // ... work ...
/// watch.stop(&mut timings);
/// assert!(timings.get("setup").is_some());
/// ```
#[derive(Debug)]
pub struct Stopwatch {
    name: String,
    started: Timestamp,
}

impl Stopwatch {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            started: Timestamp::now(),
        }
    }

    /// Add the elapsed time to the registry and return it in seconds
    pub fn stop(self, registry: &mut TimingRegistry) -> f64 {
        let elapsed = self.started.elapsed_secs();
        registry.add_to_record(elapsed, &self.name);
        elapsed
    }
}

/// Canonical reduction order from every rank's manifest
fn agree_on_names(
    manifests: &[Vec<String>],
    policy: ManifestPolicy,
    log_gaps: bool,
) -> Result<Vec<String>, TimingError> {
    let canonical: BTreeSet<&str> = manifests
        .iter()
        .flat_map(|names| names.iter().map(String::as_str))
        .collect();

    for (rank, names) in manifests.iter().enumerate() {
        let held: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        if held.len() == canonical.len() {
            continue;
        }

        let missing: Vec<String> = canonical
            .difference(&held)
            .map(|name| name.to_string())
            .collect();

        if policy == ManifestPolicy::Strict {
            return Err(TimingError::ManifestMismatch { rank, missing });
        }
        if log_gaps {
            tracing::warn!(rank, ?missing, "timing records missing on rank, counted as 0");
        }
    }

    Ok(canonical.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{LocalGroup, SoloGroup};
    use std::f64::consts::SQRT_2;

    #[test]
    fn test_add_to_record_accumulates() {
        let mut timings = TimingRegistry::new();
        assert!(timings.is_empty());

        timings.add_to_record(1.5, "compute");
        timings.add_to_record(2.25, "compute");

        assert_eq!(timings.get("compute"), Some(3.75));
        assert_eq!(timings.len(), 1);
        assert_eq!(timings.record_names(), &["compute".to_string()]);
    }

    #[test]
    fn test_distinct_names_keep_first_seen_order() {
        let mut timings = TimingRegistry::new();
        timings.add_to_record(1.0, "zeta");
        timings.add_to_record(2.0, "alpha");
        timings.add_to_record(3.0, "zeta");
        timings.add_to_record(4.0, "mid");
        timings.add_to_record(5.0, "alpha");

        assert_eq!(timings.get("zeta"), Some(4.0));
        assert_eq!(timings.get("alpha"), Some(7.0));
        assert_eq!(timings.get("mid"), Some(4.0));
        assert_eq!(timings.record_names(), &["zeta", "alpha", "mid"]);

        // Iteration follows key order
        let keys: Vec<&str> = timings.iter().map(|(name, _)| name).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut timings = TimingRegistry::new();
        timings.add_to_record(1.0, "b");
        timings.add_to_record(2.0, "a");

        timings.reset();

        assert_eq!(timings.get("a"), Some(0.0));
        assert_eq!(timings.get("b"), Some(0.0));
        assert_eq!(timings.record_names(), &["b", "a"]);

        timings.add_to_record(0.5, "a");
        assert_eq!(timings.get("a"), Some(0.5));
        assert_eq!(timings.len(), 2);
        assert_eq!(timings.record_names(), &["b", "a"]);
    }

    #[test]
    fn test_add_duration_and_time() {
        let mut timings = TimingRegistry::new();
        timings.add_duration(Duration::from_millis(250), "io");
        assert_eq!(timings.get("io"), Some(0.25));

        let value = timings.time("work", || {
            std::thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(value, 42);
        assert!(timings.get("work").unwrap() >= 0.005);
    }

    #[test]
    fn test_stopwatch() {
        let mut timings = TimingRegistry::new();
        let watch = Stopwatch::start("span");
        std::thread::sleep(Duration::from_millis(2));
        let elapsed = watch.stop(&mut timings);

        assert!(elapsed >= 0.002);
        assert_eq!(timings.get("span"), Some(elapsed));
    }

    #[test]
    fn test_summarize_single_process() {
        let mut timings = TimingRegistry::new();
        timings.add_to_record(2.0, "x");

        let report = timings.summarize(&SoloGroup, ManifestPolicy::Trusted).unwrap();
        assert_eq!(report.world_size, 1);
        let x = report.get("x").unwrap();
        assert_eq!(x.mean, 2.0);
        assert_eq!(x.dispersion, 0.0);
    }

    #[test]
    fn test_two_rank_mean_and_dispersion() {
        for policy in [ManifestPolicy::Trusted, ManifestPolicy::Union, ManifestPolicy::Strict] {
            let reports = LocalGroup::run_ranks(2, |group| {
                let mut timings = TimingRegistry::new();
                timings.add_to_record(if group.rank() == 0 { 2.0 } else { 4.0 }, "X");
                Ok(timings.summarize(&group, policy)?)
            })
            .unwrap();

            for report in &reports {
                let x = report.get("X").unwrap();
                assert_eq!(x.mean, 3.0);
                assert!((x.dispersion - SQRT_2 / 2.0).abs() < 1e-12, "{}: {}", policy, x.dispersion);
            }
            assert_eq!(reports[0], reports[1]);
        }
    }

    #[test]
    fn test_dispersion_divides_by_group_size() {
        // Values 1, 2, 3, 6: mean 3, squared deviations 4 + 1 + 0 + 9 = 14
        let reports = LocalGroup::run_ranks(4, |group| {
            let mut timings = TimingRegistry::new();
            timings.add_to_record([1.0, 2.0, 3.0, 6.0][group.rank()], "solve");
            Ok(timings.summarize(&group, ManifestPolicy::Union)?)
        })
        .unwrap();

        let solve = reports[0].get("solve").unwrap();
        assert_eq!(solve.mean, 3.0);
        assert!((solve.dispersion - 14.0_f64.sqrt() / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_trusted_reduces_in_key_order() {
        let mut timings = TimingRegistry::new();
        timings.add_to_record(1.0, "second");
        timings.add_to_record(1.0, "first");

        let report = timings.summarize(&SoloGroup, ManifestPolicy::Trusted).unwrap();
        let names: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_union_fills_missing_records_with_zero() {
        let reports = LocalGroup::run_ranks(2, |group| {
            let mut timings = TimingRegistry::new();
            timings.add_to_record(1.0, "shared");
            if group.rank() == 0 {
                timings.add_to_record(3.0, "only_rank0");
            } else {
                timings.add_to_record(5.0, "only_rank1");
            }
            Ok(timings.summarize(&group, ManifestPolicy::Union)?)
        })
        .unwrap();

        let report = &reports[1];
        let names: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["only_rank0", "only_rank1", "shared"]);
        assert_eq!(report.get("only_rank0").unwrap().mean, 1.5);
        assert_eq!(report.get("only_rank1").unwrap().mean, 2.5);
        assert_eq!(report.get("shared").unwrap().mean, 1.0);
        assert_eq!(reports[0], reports[1]);
    }

    #[test]
    fn test_strict_fails_on_every_rank() {
        let outcomes = LocalGroup::run_ranks(3, |group| {
            let mut timings = TimingRegistry::new();
            timings.add_to_record(1.0, "common");
            if group.rank() != 2 {
                timings.add_to_record(1.0, "partial");
            }
            match timings.summarize(&group, ManifestPolicy::Strict) {
                Err(TimingError::ManifestMismatch { rank, missing }) => Ok((rank, missing)),
                other => anyhow::bail!("expected a manifest mismatch, got {:?}", other),
            }
        })
        .unwrap();

        for (rank, missing) in outcomes {
            assert_eq!(rank, 2);
            assert_eq!(missing, vec!["partial".to_string()]);
        }
    }

    #[test]
    fn test_report_filters_non_positive_means() {
        let mut timings = TimingRegistry::new();
        timings.add_to_record(0.0, "zero");
        timings.add_to_record(-1.0, "negative");
        timings.add_to_record(1e-9, "tiny");

        let mut out = Vec::new();
        let report = timings.write_report(&SoloGroup, ManifestPolicy::Union, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(report.records.len(), 3);
        assert!(!text.contains("zero"));
        assert!(!text.contains("negative"));
        assert!(text.contains("tiny"));
    }

    #[test]
    fn test_only_rank_zero_writes() {
        let outputs = LocalGroup::run_ranks(2, |group| {
            let mut timings = TimingRegistry::new();
            timings.add_to_record(1.0, "step");
            let mut out = Vec::new();
            timings.write_report(&group, ManifestPolicy::Union, &mut out)?;
            Ok(String::from_utf8(out)?)
        })
        .unwrap();

        assert!(outputs[0].contains("## Internal Timings"));
        assert!(outputs[0].contains("step"));
        assert!(outputs[1].is_empty());
    }

    #[test]
    fn test_report_after_reset_cycle() {
        let reports = LocalGroup::run_ranks(2, |group| {
            let mut timings = TimingRegistry::new();
            timings.add_to_record(10.0, "phase");
            timings.summarize(&group, ManifestPolicy::Trusted)?;

            timings.reset();
            timings.add_to_record(group.rank() as f64 + 1.0, "phase");
            Ok(timings.summarize(&group, ManifestPolicy::Trusted)?)
        })
        .unwrap();

        assert_eq!(reports[0].get("phase").unwrap().mean, 1.5);
    }

    #[test]
    fn test_two_rank_report_over_tcp() {
        use crate::group::TcpGroup;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let timeout = Duration::from_secs(10);

        let member = std::thread::spawn(move || -> anyhow::Result<TimingReport> {
            let group = TcpGroup::join(1, 2, &addr, timeout)?;
            let mut timings = TimingRegistry::new();
            timings.add_to_record(4.0, "X");
            Ok(timings.summarize(&group, ManifestPolicy::Strict)?)
        });

        let group = TcpGroup::coordinate(listener, 2, timeout).unwrap();
        let mut timings = TimingRegistry::new();
        timings.add_to_record(2.0, "X");
        let mut out = Vec::new();
        let report = timings.write_report(&group, ManifestPolicy::Strict, &mut out).unwrap();

        let x = report.get("X").unwrap();
        assert_eq!(x.mean, 3.0);
        assert!((x.dispersion - SQRT_2 / 2.0).abs() < 1e-12);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("3.000000e+00 ( 7.071068e-01 )"));

        assert_eq!(member.join().unwrap().unwrap(), report);
    }
}
