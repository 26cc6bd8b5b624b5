//! Report rendering.
//!
//! A [`ReportRenderer`] turns the record tables of a run into a chart. It
//! runs once, at stop time, with the tables as they are at that instant.
//!
//! - [`ReportData`]: the rows of both tables, loaded for rendering
//! - [`ReportSummary`]: averages and counters, written as JSON
//! - [`SvgReportRenderer`]: two-panel SVG chart (usage on top, speed below)

mod data;
mod svg;

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::{RunTables, StorageError};

pub use data::{ReportData, ReportSummary, SpeedSummary, UsageSummary};
pub use svg::SvgReportRenderer;

/// Errors that can occur while rendering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Neither table holds a single row.
    #[error("no samples to render")]
    NoData,

    /// A record table could not be read.
    #[error("failed to read record table: {0}")]
    Storage(#[from] StorageError),

    /// An output file could not be written.
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Summary could not be encoded.
    #[error("failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Files produced by a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub chart: PathBuf,
    pub summary: PathBuf,
}

/// Renders the record tables of a run.
pub trait ReportRenderer: Send {
    /// Render whatever rows the tables hold right now.
    ///
    /// # Errors
    /// Returns `ReportError::NoData` when there is nothing to draw.
    fn render(&self, tables: &RunTables) -> Result<RenderedReport, ReportError>;
}
