//! Report input and summary statistics.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::report::ReportError;
use crate::storage::{Row, RunTables, Sample, SpeedSample, StorageError, UsageSample, scan_table};

/// Rows of a run's record tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportData {
    pub speed: Vec<Row<SpeedSample>>,
    pub usage: Vec<Row<UsageSample>>,
}

impl ReportData {
    /// Load every table the run has.
    ///
    /// A table whose file was never created (no successful tick) counts as
    /// empty. Unparsable rows are skipped with a warning, and a table with
    /// the wrong header is left out, so one damaged table never hides the
    /// other.
    ///
    /// # Errors
    /// Returns `ReportError::Storage` if an existing table cannot be read.
    pub fn load(tables: &RunTables) -> Result<Self, ReportError> {
        Ok(Self {
            speed: load_rows(tables.speed.as_deref())?,
            usage: load_rows(tables.usage.as_deref())?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_empty() && self.usage.is_empty()
    }

    /// Averages and counters over the loaded rows.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            speed: SpeedSummary::from_rows(&self.speed),
            usage: UsageSummary::from_rows(&self.usage),
        }
    }
}

fn load_rows<S: Sample>(path: Option<&Path>) -> Result<Vec<Row<S>>, ReportError> {
    let Some(path) = path.filter(|p| p.exists()) else {
        return Ok(Vec::new());
    };

    match scan_table::<S>(path) {
        Ok((rows, skipped)) => {
            if skipped > 0 {
                tracing::warn!(
                    path = %path.display(),
                    skipped,
                    "Skipped unparsable rows in {}",
                    S::KIND.label()
                );
            }
            Ok(rows)
        }
        Err(e @ StorageError::HeaderMismatch { .. }) => {
            tracing::error!(error = %e, "Table left out of the report");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Summary written next to the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedSummary {
    pub samples: usize,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub avg_download_mbps: f64,
    pub avg_upload_mbps: f64,
    pub max_download_mbps: f64,
    pub max_upload_mbps: f64,
}

impl SpeedSummary {
    fn from_rows(rows: &[Row<SpeedSample>]) -> Option<Self> {
        let (first, last) = (rows.first()?, rows.last()?);
        let download: Vec<f64> = rows.iter().map(|r| r.sample.download_mbps()).collect();
        let upload: Vec<f64> = rows.iter().map(|r| r.sample.upload_mbps()).collect();

        Some(Self {
            samples: rows.len(),
            first: first.timestamp,
            last: last.timestamp,
            avg_download_mbps: mean(&download),
            avg_upload_mbps: mean(&upload),
            max_download_mbps: download.iter().copied().fold(0.0, f64::max),
            max_upload_mbps: upload.iter().copied().fold(0.0, f64::max),
        })
    }
}

/// Counters are cumulative since boot, so the interesting figure is the
/// growth between the first and last row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub samples: usize,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub first_sent_bytes: u64,
    pub last_sent_bytes: u64,
    pub first_recv_bytes: u64,
    pub last_recv_bytes: u64,
    /// Zero if the counters went backwards (reboot or interface reset).
    pub sent_during_run_bytes: u64,
    pub recv_during_run_bytes: u64,
}

impl UsageSummary {
    fn from_rows(rows: &[Row<UsageSample>]) -> Option<Self> {
        let (first, last) = (rows.first()?, rows.last()?);
        Some(Self {
            samples: rows.len(),
            first: first.timestamp,
            last: last.timestamp,
            first_sent_bytes: first.sample.sent_bytes,
            last_sent_bytes: last.sample.sent_bytes,
            first_recv_bytes: first.sample.recv_bytes,
            last_recv_bytes: last.sample.recv_bytes,
            sent_during_run_bytes: last.sample.sent_bytes.saturating_sub(first.sample.sent_bytes),
            recv_during_run_bytes: last.sample.recv_bytes.saturating_sub(first.sample.recv_bytes),
        })
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordTable;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_missing_tables_load_empty() {
        let dir = tempdir().unwrap();
        let tables = RunTables {
            speed: Some(dir.path().join("never_written.csv")),
            usage: None,
        };

        let data = ReportData::load(&tables).unwrap();
        assert!(data.is_empty());
        assert_eq!(
            data.summary(),
            ReportSummary {
                speed: None,
                usage: None
            }
        );
    }

    #[test]
    fn test_damaged_table_does_not_hide_the_other() {
        let dir = tempdir().unwrap();
        let speed = dir.path().join("speed.csv");
        let usage = dir.path().join("usage.csv");
        std::fs::write(
            &speed,
            "timestamp,download_speed,upload_speed\n2024-05-17 09:31:00,1000000,500000\n2024-05-17 09:3",
        )
        .unwrap();
        RecordTable::<UsageSample>::new(&usage)
            .append(&Row::new(ts(1), UsageSample::new(1, 2)))
            .unwrap();
        let tables = RunTables {
            speed: Some(speed.clone()),
            usage: Some(usage),
        };

        // Torn tail is skipped
        let data = ReportData::load(&tables).unwrap();
        assert_eq!(data.speed.len(), 1);
        assert_eq!(data.usage.len(), 1);

        // Wrong header leaves only the usage panel
        std::fs::write(&speed, "time,down,up\n2024-05-17 09:31:00,1,2\n").unwrap();
        let data = ReportData::load(&tables).unwrap();
        assert!(data.speed.is_empty());
        assert_eq!(data.usage.len(), 1);
    }

    #[test]
    fn test_summary_values() {
        let dir = tempdir().unwrap();
        let speed_path = dir.path().join("speed.csv");
        let usage_path = dir.path().join("usage.csv");

        let mut speed = RecordTable::new(&speed_path);
        speed
            .append(&Row::new(ts(1), SpeedSample::new(40e6, 10e6)))
            .unwrap();
        speed
            .append(&Row::new(ts(2), SpeedSample::new(60e6, 20e6)))
            .unwrap();

        let mut usage = RecordTable::new(&usage_path);
        usage
            .append(&Row::new(ts(1), UsageSample::new(1_000, 5_000)))
            .unwrap();
        usage
            .append(&Row::new(ts(2), UsageSample::new(4_000, 9_000)))
            .unwrap();

        let tables = RunTables {
            speed: Some(speed_path),
            usage: Some(usage_path),
        };
        let summary = ReportData::load(&tables).unwrap().summary();

        let speed = summary.speed.unwrap();
        assert_eq!(speed.samples, 2);
        assert_eq!(speed.avg_download_mbps, 50.0);
        assert_eq!(speed.avg_upload_mbps, 15.0);
        assert_eq!(speed.max_download_mbps, 60.0);
        assert_eq!(speed.last, ts(2));

        let usage = summary.usage.unwrap();
        assert_eq!(usage.sent_during_run_bytes, 3_000);
        assert_eq!(usage.recv_during_run_bytes, 4_000);
    }

    #[test]
    fn test_counter_reset_does_not_underflow() {
        let rows = vec![
            Row::new(ts(1), UsageSample::new(9_000, 9_000)),
            Row::new(ts(2), UsageSample::new(100, 200)),
        ];
        let usage = UsageSummary::from_rows(&rows).unwrap();
        assert_eq!(usage.sent_during_run_bytes, 0);
        assert_eq!(usage.recv_during_run_bytes, 0);
    }
}
