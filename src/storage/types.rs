//! Core data types for record tables.
//!
//! - [`SampleKind`]: which of the two measurements a table (and its job) holds
//! - [`SpeedSample`] / [`UsageSample`]: the two measurement pairs
//! - [`Sample`]: how a measurement pair maps onto a CSV row
//! - [`Row`]: a sample plus its capture timestamp

use std::fmt::Debug;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::StorageError;

/// Timestamp layout used in every record table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Measurement kind.
///
/// Each kind has exactly one job and one record table per run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SampleKind {
    /// Download/upload throughput.
    Speed,
    /// Cumulative bytes sent/received.
    Usage,
}

impl SampleKind {
    /// CSV header row (without line terminator).
    pub fn header(&self) -> &'static str {
        match self {
            Self::Speed => "timestamp,download_speed,upload_speed",
            Self::Usage => "timestamp,sent_bytes,recv_bytes",
        }
    }

    /// Suffix of the record table file name, after the run stamp.
    pub fn table_suffix(&self) -> &'static str {
        match self {
            Self::Speed => "speed_measurement.csv",
            Self::Usage => "network_usage.csv",
        }
    }

    /// Suffix of the per-job log file name, after the run stamp.
    pub fn log_suffix(&self) -> &'static str {
        match self {
            Self::Speed => "speed.log",
            Self::Usage => "data_usage.log",
        }
    }

    /// Human label used in log lines and status output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Speed => "speed analyzer",
            Self::Usage => "data usage analyzer",
        }
    }
}

/// A measurement pair that can be stored as one record table row.
///
/// Samples are all-or-nothing: a probe yields both values or an error.
pub trait Sample: Debug + Clone + Send + Sync + 'static {
    /// Table kind this sample belongs to.
    const KIND: SampleKind;

    /// Render the two value columns.
    fn to_fields(&self) -> [String; 2];

    /// Parse the two value columns.
    fn from_fields(first: &str, second: &str) -> Result<Self, StorageError>;

    /// Short human-readable rendering for log lines.
    fn describe(&self) -> String;
}

/// Download/upload throughput in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub download_bps: f64,
    pub upload_bps: f64,
}

impl SpeedSample {
    pub fn new(download_bps: f64, upload_bps: f64) -> Self {
        Self {
            download_bps,
            upload_bps,
        }
    }

    /// Download speed in megabits per second.
    pub fn download_mbps(&self) -> f64 {
        self.download_bps / 1_000_000.0
    }

    /// Upload speed in megabits per second.
    pub fn upload_mbps(&self) -> f64 {
        self.upload_bps / 1_000_000.0
    }
}

impl Sample for SpeedSample {
    const KIND: SampleKind = SampleKind::Speed;

    fn to_fields(&self) -> [String; 2] {
        [self.download_bps.to_string(), self.upload_bps.to_string()]
    }

    fn from_fields(first: &str, second: &str) -> Result<Self, StorageError> {
        Ok(Self::new(parse_field(first)?, parse_field(second)?))
    }

    fn describe(&self) -> String {
        format!(
            "Download {:.2} Mbps, Upload {:.2} Mbps",
            self.download_mbps(),
            self.upload_mbps()
        )
    }
}

/// Cumulative interface counters since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSample {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
}

impl UsageSample {
    pub fn new(sent_bytes: u64, recv_bytes: u64) -> Self {
        Self {
            sent_bytes,
            recv_bytes,
        }
    }

    /// Bytes sent, in mebibytes.
    pub fn sent_mb(&self) -> f64 {
        self.sent_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Bytes received, in mebibytes.
    pub fn recv_mb(&self) -> f64 {
        self.recv_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl Sample for UsageSample {
    const KIND: SampleKind = SampleKind::Usage;

    fn to_fields(&self) -> [String; 2] {
        [self.sent_bytes.to_string(), self.recv_bytes.to_string()]
    }

    fn from_fields(first: &str, second: &str) -> Result<Self, StorageError> {
        Ok(Self::new(parse_field(first)?, parse_field(second)?))
    }

    fn describe(&self) -> String {
        format!(
            "Sent {:.2} MB, Received {:.2} MB",
            self.sent_mb(),
            self.recv_mb()
        )
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str) -> Result<T, StorageError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| StorageError::InvalidData(format!("bad value '{raw}': {e}")))
}

/// One record table row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<S> {
    /// Local wall-clock capture time (second resolution on disk).
    pub timestamp: NaiveDateTime,
    pub sample: S,
}

impl<S: Sample> Row<S> {
    pub fn new(timestamp: NaiveDateTime, sample: S) -> Self {
        Self { timestamp, sample }
    }

    /// Render as a CSV line, including the trailing newline.
    pub fn to_line(&self) -> String {
        let [first, second] = self.sample.to_fields();
        format!(
            "{},{},{}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            first,
            second
        )
    }

    /// Parse a CSV line (without line terminator).
    pub fn parse_line(line: &str) -> Result<Self, StorageError> {
        let mut parts = line.trim_end_matches('\r').split(',');
        let (Some(ts), Some(first), Some(second), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(StorageError::InvalidData(format!(
                "expected 3 columns in row '{line}'"
            )));
        };

        let timestamp = NaiveDateTime::parse_from_str(ts.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| StorageError::InvalidData(format!("bad timestamp '{ts}': {e}")))?;

        Ok(Self {
            timestamp,
            sample: S::from_fields(first, second)?,
        })
    }
}
