//! Group-wide timing summaries

use super::ManifestPolicy;
use serde::Serialize;

/// Mean and dispersion of one record across the group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub name: String,

    /// Sum over ranks divided by the group size
    pub mean: f64,

    /// Root of the summed squared deviations, divided by the group size
    pub dispersion: f64,
}

impl RecordSummary {
    /// Records with a non-positive mean are left out of the text report
    pub fn is_reported(&self) -> bool {
        self.mean > 0.0
    }
}

/// Result of one collective timing summary
///
/// Identical on every rank of the group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingReport {
    pub world_size: usize,
    pub policy: ManifestPolicy,

    /// Every reduced record, in reduction order
    pub records: Vec<RecordSummary>,
}

impl TimingReport {
    pub fn get(&self, name: &str) -> Option<&RecordSummary> {
        self.records.iter().find(|record| record.name == name)
    }

    /// Records that appear in the text report
    pub fn reported(&self) -> impl Iterator<Item = &RecordSummary> {
        self.records.iter().filter(|record| record.is_reported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, mean: f64) -> RecordSummary {
        RecordSummary {
            name: name.to_string(),
            mean,
            dispersion: 0.0,
        }
    }

    #[test]
    fn test_reported_skips_non_positive() {
        let report = TimingReport {
            world_size: 2,
            policy: ManifestPolicy::Union,
            records: vec![summary("a", 1.0), summary("b", 0.0), summary("c", -2.0), summary("d", 1e-12)],
        };

        let names: Vec<&str> = report.reported().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "d"]);
        assert_eq!(report.get("b").unwrap().mean, 0.0);
        assert!(report.get("missing").is_none());
    }
}
