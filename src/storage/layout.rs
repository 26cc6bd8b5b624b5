//! On-disk layout of a run.
//!
//! Every file a run creates is prefixed with the run stamp (the start time),
//! so separate invocations never share a record table by accident.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::storage::StorageError;
use crate::storage::types::SampleKind;

/// Layout of the run stamp used in file names.
pub const RUN_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Paths of all files belonging to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    results_dir: PathBuf,
    logs_dir: PathBuf,
    stamp: String,
}

impl RunLayout {
    /// Create a layout for a run started at `started_at`.
    pub fn new(
        results_dir: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        started_at: NaiveDateTime,
    ) -> Self {
        Self {
            results_dir: results_dir.into(),
            logs_dir: logs_dir.into(),
            stamp: started_at.format(RUN_STAMP_FORMAT).to_string(),
        }
    }

    /// Create a layout for an existing run stamp, e.g. to re-render a report.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidData` if `stamp` is not a run stamp.
    pub fn from_stamp(
        results_dir: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        stamp: &str,
    ) -> Result<Self, StorageError> {
        let started_at = NaiveDateTime::parse_from_str(stamp, RUN_STAMP_FORMAT)
            .map_err(|e| StorageError::InvalidData(format!("bad run stamp '{stamp}': {e}")))?;
        Ok(Self::new(results_dir, logs_dir, started_at))
    }

    /// Run stamp (`YYYY-MM-DD_HH-MM-SS`).
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Record table for a sample kind.
    pub fn table_path(&self, kind: SampleKind) -> PathBuf {
        self.results_dir
            .join(format!("{}_{}", self.stamp, kind.table_suffix()))
    }

    /// Per-job log file.
    pub fn job_log_path(&self, kind: SampleKind) -> PathBuf {
        self.logs_dir
            .join(format!("{}_{}", self.stamp, kind.log_suffix()))
    }

    /// Whole-run log file.
    pub fn run_log_path(&self) -> PathBuf {
        self.logs_dir.join(format!("{}_run.log", self.stamp))
    }

    /// Rendered chart.
    pub fn report_path(&self) -> PathBuf {
        self.results_dir.join(format!("{}_report.svg", self.stamp))
    }

    /// Averages and counters of the run, as JSON.
    pub fn summary_path(&self) -> PathBuf {
        self.results_dir.join(format!("{}_summary.json", self.stamp))
    }

    /// Table handles for the given kinds.
    pub fn tables(&self, kinds: impl IntoIterator<Item = SampleKind>) -> RunTables {
        let mut tables = RunTables::default();
        for kind in kinds {
            tables.set(kind, self.table_path(kind));
        }
        tables
    }
}

/// Record tables of one run, by kind. A kind that is not part of the run
/// has no table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTables {
    pub speed: Option<PathBuf>,
    pub usage: Option<PathBuf>,
}

impl RunTables {
    pub fn get(&self, kind: SampleKind) -> Option<&Path> {
        match kind {
            SampleKind::Speed => self.speed.as_deref(),
            SampleKind::Usage => self.usage.as_deref(),
        }
    }

    pub fn set(&mut self, kind: SampleKind, path: PathBuf) {
        match kind {
            SampleKind::Speed => self.speed = Some(path),
            SampleKind::Usage => self.usage = Some(path),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.usage.is_none()
    }
}
