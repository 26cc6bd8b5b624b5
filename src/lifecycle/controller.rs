//! Run loop and stop sequence.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::time::Instant;

use crate::lifecycle::{DurationPolicy, StopHandle, StopReason};
use crate::report::{RenderedReport, ReportRenderer};
use crate::scheduler::{DEFAULT_POLL_QUANTUM, JobInfo, Scheduler, SchedulerError};
use crate::storage::RunTables;

/// Errors that can occur while running the lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The scheduler could not be started.
    #[error("failed to start scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The run was already stopped.
    #[error("run already stopped")]
    AlreadyStopped,
}

/// Outcome of a run, produced exactly once by the stop sequence.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: StopReason,
    pub started_at: NaiveDateTime,
    pub elapsed: Duration,
    pub jobs: Vec<JobInfo>,
    pub report: Option<RenderedReport>,
}

impl RunSummary {
    /// Rows recorded across all jobs.
    pub fn total_recorded(&self) -> u64 {
        self.jobs.iter().map(|j| j.recorded).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Whole seconds keep the status line readable
        let elapsed = Duration::from_secs(self.elapsed.as_secs());
        write!(
            f,
            "Analysis stopped ({}) after {}",
            self.reason,
            humantime::format_duration(elapsed)
        )?;
        for job in &self.jobs {
            write!(
                f,
                "; {}: {} recorded, {} skipped",
                job.kind.label(),
                job.recorded,
                job.skipped
            )?;
            if job.failed > 0 {
                write!(f, ", {} failed", job.failed)?;
            }
        }
        match &self.report {
            Some(report) => write!(f, "; report: {}", report.chart.display()),
            None => write!(f, "; no report"),
        }
    }
}

/// Drives a [`Scheduler`] for one run and stops it exactly once.
///
/// Stop requests arrive through the [`StopHandle`] (signals, other tasks) or
/// from the deadline of a bounded run. Either way the loop finishes the tick
/// in flight, dispatches nothing further, then runs the stop sequence on its
/// own task:
///
/// 1. mark the scheduler stopped
/// 2. clear pending jobs
/// 3. render the report, if a renderer is set (errors are logged)
/// 4. log the status line and return it as a [`RunSummary`]
pub struct LifecycleController {
    scheduler: Scheduler,
    policy: DurationPolicy,
    tables: RunTables,
    renderer: Option<Box<dyn ReportRenderer>>,
    stop: StopHandle,
    quantum: Duration,
    finished: bool,
}

impl LifecycleController {
    pub fn new(scheduler: Scheduler, policy: DurationPolicy, tables: RunTables) -> Self {
        Self {
            scheduler,
            policy,
            tables,
            renderer: None,
            stop: StopHandle::new(),
            quantum: DEFAULT_POLL_QUANTUM,
            finished: false,
        }
    }

    /// Render a report with `renderer` when the run stops.
    pub fn with_renderer(mut self, renderer: impl ReportRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Override the poll quantum.
    pub fn with_quantum(mut self, quantum: Duration) -> Self {
        self.quantum = quantum;
        self
    }

    /// Handle that stops this run from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn tables(&self) -> &RunTables {
        &self.tables
    }

    /// Start the scheduler and poll it until the run stops.
    ///
    /// # Errors
    /// Returns `LifecycleError::Scheduler` if the scheduler cannot start (no
    /// jobs), `LifecycleError::AlreadyStopped` if this run already stopped.
    pub async fn run(&mut self) -> Result<RunSummary, LifecycleError> {
        if self.finished {
            return Err(LifecycleError::AlreadyStopped);
        }
        self.scheduler.start()?;

        let origin = self.scheduler.clock().origin();
        // A tick may lag its slot by one quantum, so may the last one
        let cutoff = self
            .policy
            .deadline(origin)
            .and_then(|d| d.checked_add(self.quantum));
        tracing::info!(
            policy = ?self.policy,
            quantum = ?self.quantum,
            jobs = self.scheduler.job_count(),
            "Analysis started"
        );

        loop {
            if self.stop.is_stopped() {
                break;
            }

            let now = Instant::now();
            self.scheduler.run_due(cutoff, self.stop.token()).await;

            if let Some(cutoff) = cutoff
                && Instant::now() >= cutoff
            {
                self.stop.stop(StopReason::DurationElapsed);
                break;
            }

            let mut wake = now + self.quantum;
            if let Some(cutoff) = cutoff {
                wake = wake.min(cutoff);
            }
            tokio::select! {
                () = self.stop.stopped() => {}
                () = tokio::time::sleep_until(wake) => {}
            }
        }

        let reason = self.stop.reason().unwrap_or(StopReason::Requested);
        self.shutdown(reason).ok_or(LifecycleError::AlreadyStopped)
    }

    /// Run the stop sequence. Only the first call does anything; later calls
    /// return `None` and leave the tables untouched.
    pub fn shutdown(&mut self, reason: StopReason) -> Option<RunSummary> {
        if self.finished {
            tracing::debug!(%reason, "Stop ignored, run already stopped");
            return None;
        }
        self.finished = true;

        self.stop.stop(reason);
        let reason = self.stop.reason().unwrap_or(reason);

        self.scheduler.stop();
        let jobs = self.scheduler.list_jobs();
        let cleared = self.scheduler.clear();
        tracing::debug!(cleared, "Pending jobs cleared");

        let report = self.renderer.as_ref().and_then(|renderer| {
            match renderer.render(&self.tables) {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!(error = %e, "Error plotting graphs");
                    None
                }
            }
        });

        let summary = RunSummary {
            reason,
            started_at: self.scheduler.clock().started_at(),
            elapsed: self.scheduler.clock().elapsed(),
            jobs,
            report,
        };
        tracing::info!("{summary}");
        Some(summary)
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("scheduler", &self.scheduler)
            .field("policy", &self.policy)
            .field("tables", &self.tables)
            .field("has_renderer", &self.renderer.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
