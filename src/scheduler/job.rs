//! Jobs: a sample source bound to a record table and a cadence.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{Instrument, Span};

use crate::probe::SampleSource;
use crate::storage::{RecordTable, Row, Sample, SampleKind, StorageError};

/// Errors that can occur during a tick.
///
/// Measurement failures are not errors; they produce [`TickOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum JobError {
    /// Failed to append the sample to its record table.
    #[error("failed to persist sample: {0}")]
    Storage(#[from] StorageError),
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A row was appended.
    Recorded,
    /// The source produced no sample; nothing was written.
    Skipped,
}

/// A schedulable unit of work.
///
/// `tick` takes `&mut self`, so one job can never run twice at once.
#[async_trait]
pub trait Job: Send + 'static {
    /// Sample kind, which is also the job's identity within a run.
    fn kind(&self) -> SampleKind;

    /// Interval between ticks.
    fn cadence(&self) -> Duration;

    /// Record table this job appends to.
    fn table_path(&self) -> &Path;

    /// Span every log event of this job is emitted in.
    fn span(&self) -> &Span;

    /// Perform one tick, stamping any row with `at`.
    ///
    /// # Returns
    ///
    /// - `Ok(Recorded)`: the source succeeded and the row was appended
    /// - `Ok(Skipped)`: the source failed; no row was written
    /// - `Err(JobError::Storage)`: the row could not be written
    async fn tick(&mut self, at: NaiveDateTime) -> Result<TickOutcome, JobError>;
}

/// Job that samples a [`SampleSource`] into a [`RecordTable`].
pub struct SamplingJob<S: SampleSource> {
    source: S,
    table: RecordTable<S::Sample>,
    cadence: Duration,
    span: Span,
}

impl<S: SampleSource> SamplingJob<S> {
    /// Create a job. Logging goes to a disabled span until one is attached.
    pub fn new(source: S, table: RecordTable<S::Sample>, cadence: Duration) -> Self {
        Self {
            source,
            table,
            cadence,
            span: Span::none(),
        }
    }

    /// Attach the span that carries this job's log stream.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn table(&self) -> &RecordTable<S::Sample> {
        &self.table
    }
}

impl<S: SampleSource> std::fmt::Debug for SamplingJob<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingJob")
            .field("kind", &S::Sample::KIND)
            .field("source", &self.source.name())
            .field("table", &self.table.path())
            .field("cadence", &self.cadence)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: SampleSource> Job for SamplingJob<S> {
    fn kind(&self) -> SampleKind {
        S::Sample::KIND
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn table_path(&self) -> &Path {
        self.table.path()
    }

    fn span(&self) -> &Span {
        &self.span
    }

    async fn tick(&mut self, at: NaiveDateTime) -> Result<TickOutcome, JobError> {
        let sample = match self.source.sample().instrument(self.span.clone()).await {
            Ok(sample) => sample,
            Err(_) => {
                self.span.in_scope(|| {
                    tracing::debug!(source = self.source.name(), "Sample skipped");
                });
                return Ok(TickOutcome::Skipped);
            }
        };

        let row = Row::new(at, sample);
        self.span.in_scope(|| -> Result<TickOutcome, JobError> {
            self.table.append(&row)?;
            tracing::info!(
                "Data written to {}: {}",
                self.table.path().display(),
                row.sample.describe()
            );
            Ok(TickOutcome::Recorded)
        })
    }
}
