//! Periodic job scheduling.
//!
//! A [`Scheduler`] holds one [`Job`] per sample kind and dispatches the
//! ones that are due each time it is polled. The first tick of a job is one
//! cadence after the run's [`RunClock`] origin; after that, a job is due one
//! cadence after the poll that ran it. A tick that overran its cadence makes
//! the job due again on the next poll.

mod clock;
mod job;
mod registry;

pub use clock::RunClock;
pub use job::{Job, JobError, SamplingJob, TickOutcome};
pub use registry::{DEFAULT_POLL_QUANTUM, JobInfo, Scheduler, SchedulerError, SchedulerState};
