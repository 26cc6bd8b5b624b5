//! netpulse - Network Speed & Usage Sampler
//!
//! This crate periodically samples a host's network throughput and interface
//! byte counters, appends every sample to a per-run CSV record table and
//! renders the collected series as a chart when the run stops. It can be
//! used as a library, or run with the `netpulse` executable.
//!
//! # Architecture
//!
//! - **Probes**: sample sources for speed (HTTP transfer) and usage (OS counters)
//! - **Storage**: append-only CSV record tables, one per kind per run
//! - **Scheduler**: cooperative poll loop dispatching jobs on their cadence
//! - **Lifecycle**: bounded/unbounded runs, signals, one-shot stop sequence
//! - **Report**: SVG chart and JSON summary of a run
//!
//! # Example
//!
//! ```rust,ignore
//! use netpulse::config::AnalysisConfig;
//! use netpulse::lifecycle::{LifecycleController, RunPlan};
//! use netpulse::probe::SystemUsageProbe;
//! use netpulse::scheduler::{RunClock, Scheduler};
//! use netpulse::storage::RunLayout;
//!
//! let clock = RunClock::start(chrono::Local::now().naive_local());
//! let layout = RunLayout::new("results", "logs", clock.started_at());
//! let plan = RunPlan::new(&AnalysisConfig::default(), layout)?;
//!
//! let mut scheduler = Scheduler::new(clock);
//! if let Some(job) = plan.bind(SystemUsageProbe::new()) {
//!     scheduler.register(job)?;
//! }
//! let summary = LifecycleController::new(scheduler, plan.policy(), plan.tables())
//!     .with_renderer(plan.renderer())
//!     .run()
//!     .await?;
//! println!("{summary}");
//! ```

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod probe;
pub mod report;
pub mod scheduler;
pub mod storage;

pub use lifecycle::{DurationPolicy, LifecycleController, RunPlan, RunSummary, StopHandle, StopReason};
pub use scheduler::{Job, RunClock, SamplingJob, Scheduler};
pub use storage::{RecordTable, RunLayout, RunTables, SampleKind};
