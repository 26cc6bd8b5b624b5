//! Run lifecycle.
//!
//! Bridges the duration policy and external signals into a single stop
//! transition:
//!
//! - [`RunPlan`]: validated jobs, tables and duration of a run
//! - [`LifecycleController`]: polls the scheduler until the run stops, then
//!   runs the stop sequence exactly once
//! - [`StopHandle`]: first-reason-wins stop request, shared with the signal
//!   listener
//! - [`spawn_signal_listener`]: maps Ctrl+C, SIGTERM and SIGALRM to stop
//!   reasons; a second signal exits the process

mod controller;
mod plan;
mod signals;
mod stop;

pub use controller::{LifecycleController, LifecycleError, RunSummary};
pub use plan::RunPlan;
pub use signals::{FORCED_EXIT_CODE, spawn_signal_listener};
pub use stop::{DurationPolicy, StopHandle, StopReason};
