use crate::readers::{RejectKind, RejectReason};
use crate::utils::constants::MAX_REJECTION_SAMPLES;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single source line that did not become an observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub station_id: String,
    pub line_number: usize,
    pub kind: RejectKind,
    pub reason: String,
}

/// Parse-time rejections for one run: counts per reason and per station
/// file, plus the first few offending lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RejectionReport {
    pub total: usize,
    pub by_reason: BTreeMap<RejectKind, usize>,
    pub by_station: BTreeMap<String, usize>,
    pub samples: Vec<Rejection>,
}

impl RejectionReport {
    pub fn record(&mut self, station_id: &str, line_number: usize, reason: &RejectReason) {
        self.total += 1;
        *self.by_reason.entry(reason.kind()).or_default() += 1;
        *self.by_station.entry(station_id.to_string()).or_default() += 1;

        if self.samples.len() < MAX_REJECTION_SAMPLES {
            self.samples.push(Rejection {
                station_id: station_id.to_string(),
                line_number,
                kind: reason.kind(),
                reason: reason.to_string(),
            });
        }
    }

    /// Fold another report in. Samples keep the order they are merged in.
    pub fn merge(&mut self, other: RejectionReport) {
        self.total += other.total;
        for (kind, count) in other.by_reason {
            *self.by_reason.entry(kind).or_default() += count;
        }
        for (station, count) in other.by_station {
            *self.by_station.entry(station).or_default() += count;
        }

        let room = MAX_REJECTION_SAMPLES.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.into_iter().take(room));
    }

    pub fn count(&self, kind: RejectKind) -> usize {
        self.by_reason.get(&kind).copied().unwrap_or(0)
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub files_processed: usize,
    pub lines_read: usize,
    pub staged: usize,
    pub committed: usize,
    pub skipped_existing: usize,
    pub skipped_in_run_duplicates: usize,
    pub skipped_on_commit: usize,
    pub rejected: RejectionReport,
}

impl IngestionReport {
    /// Records that were valid but not inserted because they already existed.
    pub fn duplicates(&self) -> usize {
        self.skipped_existing + self.skipped_in_run_duplicates + self.skipped_on_commit
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Ingestion Report ===\n");
        summary.push_str(&format!("Files Processed: {}\n", self.files_processed));
        summary.push_str(&format!("Lines Read: {}\n", self.lines_read));
        summary.push_str(&format!("Records Committed: {}\n", self.committed));
        summary.push_str(&format!(
            "Duplicates Skipped: {} (existing {}, in-run {}, at commit {})\n",
            self.duplicates(),
            self.skipped_existing,
            self.skipped_in_run_duplicates,
            self.skipped_on_commit
        ));
        summary.push_str(&format!("Lines Rejected: {}\n", self.rejected.total));

        for (kind, count) in &self.rejected.by_reason {
            summary.push_str(&format!("  {}: {}\n", kind, count));
        }

        if !self.rejected.samples.is_empty() {
            summary.push_str("\nFirst Rejections:\n");
            for (i, rejection) in self.rejected.samples.iter().take(10).enumerate() {
                summary.push_str(&format!(
                    "  {}. Station {} line {}: {}\n",
                    i + 1,
                    rejection.station_id,
                    rejection.line_number,
                    rejection.reason
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_by_reason_and_station() {
        let mut report = RejectionReport::default();
        report.record("S1", 3, &RejectReason::MalformedDate("2020".to_string()));
        report.record("S1", 9, &RejectReason::MalformedDate("x".to_string()));
        report.record(
            "S2",
            1,
            &RejectReason::InvalidValue {
                field: "precipitation",
                value: "-50".to_string(),
            },
        );

        assert_eq!(report.total, 3);
        assert_eq!(report.count(RejectKind::MalformedDate), 2);
        assert_eq!(report.count(RejectKind::InvalidValue), 1);
        assert_eq!(report.count(RejectKind::MalformedNumber), 0);
        assert_eq!(report.by_station["S1"], 2);
        assert_eq!(report.samples[2].line_number, 1);
    }

    #[test]
    fn test_samples_are_capped() {
        let mut a = RejectionReport::default();
        let mut b = RejectionReport::default();
        for line in 0..15 {
            a.record("S1", line, &RejectReason::MalformedDate("x".to_string()));
            b.record("S2", line, &RejectReason::MalformedDate("y".to_string()));
        }

        a.merge(b);

        assert_eq!(a.total, 30);
        assert_eq!(a.samples.len(), MAX_REJECTION_SAMPLES);
        assert_eq!(a.by_station["S2"], 15);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let report = IngestionReport {
            files_processed: 2,
            lines_read: 10,
            staged: 7,
            committed: 6,
            skipped_existing: 1,
            skipped_in_run_duplicates: 1,
            skipped_on_commit: 1,
            rejected: RejectionReport::default(),
        };

        let summary = report.summary();
        assert_eq!(report.duplicates(), 3);
        assert!(summary.contains("Records Committed: 6"));
        assert!(summary.contains("Duplicates Skipped: 3"));
    }
}
