//! Storage Layer
//!
//! Append-only CSV record tables, one per sample kind per run:
//! - **Sink**: [`RecordTable::append`] writes the header once, then rows
//! - **Source**: [`read_table`] parses a table back, [`scan_table`] does the
//!   same but skips rows it cannot parse
//!
//! # Components
//!
//! - [`SpeedSample`] / [`UsageSample`]: the two measurement pairs
//! - [`Row`]: a sample with its capture timestamp
//! - [`RecordTable`]: append-only table handle owned by a single job
//! - [`RunLayout`]: file naming for everything a run writes

mod error;
mod layout;
mod table;
mod types;

pub use error::StorageError;
pub use layout::{RUN_STAMP_FORMAT, RunLayout, RunTables};
pub use table::{RecordTable, read_table, scan_table};
pub use types::{Row, Sample, SampleKind, SpeedSample, TIMESTAMP_FORMAT, UsageSample};
