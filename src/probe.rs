//! Probe Layer
//!
//! Measurement sources bound to jobs. Each probe produces one kind of
//! [`Sample`](crate::storage::Sample) and reports failure as [`ProbeError`].
//!
//! - [`HttpSpeedProbe`]: download/upload throughput over HTTP
//! - [`SystemUsageProbe`]: cumulative interface byte counters from the OS

pub mod speed;
mod traits;
pub mod usage;

pub use speed::{HttpSpeedConfig, HttpSpeedProbe};
pub use traits::{ProbeError, SampleSource};
pub use usage::SystemUsageProbe;
