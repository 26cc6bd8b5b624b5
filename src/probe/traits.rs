//! Core probe traits and types.

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::Sample;

/// Errors that can occur while taking a measurement.
///
/// A probe error is a skipped sample, never a stopped run.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// HTTP transfer failed.
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    /// Timeout elapsed.
    #[error("timeout elapsed")]
    Timeout,

    /// The OS or remote end produced no usable measurement.
    #[error("measurement unavailable: {0}")]
    Unavailable(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

/// A source of measurement pairs.
///
/// Implementations log their own failures; the caller only learns that the
/// sample is missing. A source returns both values or an error, never one
/// value on its own.
#[async_trait]
pub trait SampleSource: Send + Sync + 'static {
    /// Sample type produced by this source.
    type Sample: Sample;

    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Take one measurement.
    async fn sample(&self) -> Result<Self::Sample, ProbeError>;
}
