//! Job registry and cooperative dispatch.

use std::path::PathBuf;
use std::time::Duration;

use strum_macros::Display;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{Job, RunClock, TickOutcome};
use crate::storage::SampleKind;

/// Default sleep between poll iterations (1 second).
pub const DEFAULT_POLL_QUANTUM: Duration = Duration::from_secs(1);

/// Errors that can occur while configuring or starting the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Start was requested with nothing to run.
    #[error("no jobs registered")]
    NoJobs,

    /// A job of this kind is already registered.
    #[error("a {0} job is already registered")]
    DuplicateJob(SampleKind),

    /// Cadence must be positive.
    #[error("cadence of the {0} job must be positive")]
    ZeroCadence(SampleKind),

    /// Cadence too long to place on the clock.
    #[error("cadence of the {0} job is out of range")]
    CadenceOverflow(SampleKind),

    /// Operation not allowed in the current state.
    #[error("scheduler is {actual}, expected {expected}")]
    InvalidState {
        actual: SchedulerState,
        expected: SchedulerState,
    },
}

/// Scheduler lifecycle.
///
/// `Idle -> Running -> Stopped`, with `Idle -> Stopped` for a run that is
/// stopped before it starts. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Snapshot of a registered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Job identity.
    pub kind: SampleKind,
    /// Interval between ticks.
    pub cadence: Duration,
    /// Record table path.
    pub table: PathBuf,
    /// Ticks dispatched.
    pub ticks: u64,
    /// Ticks that appended a row.
    pub recorded: u64,
    /// Ticks whose source failed.
    pub skipped: u64,
    /// Ticks whose row could not be written.
    pub failed: u64,
}

struct ScheduledJob {
    job: Box<dyn Job>,
    // None once the next slot would overflow the clock
    next_due: Option<Instant>,
    ticks: u64,
    recorded: u64,
    skipped: u64,
    failed: u64,
}

impl ScheduledJob {
    fn info(&self) -> JobInfo {
        JobInfo {
            kind: self.job.kind(),
            cadence: self.job.cadence(),
            table: self.job.table_path().to_path_buf(),
            ticks: self.ticks,
            recorded: self.recorded,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

/// Cooperative polling scheduler.
///
/// Holds at most one job per [`SampleKind`] and dispatches due jobs in
/// registration order. The caller drives it by calling [`run_due`] once per
/// poll quantum; a job fires within one quantum of its slot and is then
/// rescheduled one cadence after the start of that iteration.
///
/// [`run_due`]: Scheduler::run_due
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    state: SchedulerState,
    clock: RunClock,
}

impl Scheduler {
    /// Create an idle scheduler whose first slots are measured from `clock`'s
    /// origin.
    pub fn new(clock: RunClock) -> Self {
        Self {
            jobs: Vec::new(),
            state: SchedulerState::Idle,
            clock,
        }
    }

    /// Register a job. Only allowed while idle.
    ///
    /// # Errors
    /// Returns `SchedulerError::DuplicateJob` if a job of the same kind is
    /// registered, `ZeroCadence` for a zero cadence, `CadenceOverflow` when
    /// the first slot does not fit on the clock, `InvalidState` once the
    /// scheduler has started.
    pub fn register<J: Job>(&mut self, job: J) -> Result<(), SchedulerError> {
        self.expect_state(SchedulerState::Idle)?;

        let kind = job.kind();
        if job.cadence().is_zero() {
            return Err(SchedulerError::ZeroCadence(kind));
        }
        if self.jobs.iter().any(|j| j.job.kind() == kind) {
            return Err(SchedulerError::DuplicateJob(kind));
        }
        let first = self
            .clock
            .origin()
            .checked_add(job.cadence())
            .ok_or(SchedulerError::CadenceOverflow(kind))?;

        tracing::debug!(job = %kind, cadence = ?job.cadence(), "Job registered");
        self.jobs.push(ScheduledJob {
            next_due: Some(first),
            job: Box::new(job),
            ticks: 0,
            recorded: 0,
            skipped: 0,
            failed: 0,
        });
        Ok(())
    }

    /// Transition `Idle -> Running`.
    ///
    /// The first tick of every job is one cadence after the clock origin.
    ///
    /// # Errors
    /// Returns `SchedulerError::NoJobs` when nothing is registered.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        self.expect_state(SchedulerState::Idle)?;
        if self.jobs.is_empty() {
            return Err(SchedulerError::NoJobs);
        }

        let origin = self.clock.origin();
        for entry in &mut self.jobs {
            entry.next_due = origin.checked_add(entry.job.cadence());
            entry.job.span().in_scope(|| {
                tracing::info!(
                    cadence = ?entry.job.cadence(),
                    "{}: Starting the analysis...",
                    entry.job.kind().label()
                );
            });
        }

        self.state = SchedulerState::Running;
        tracing::info!(jobs = self.jobs.len(), "Scheduler started");
        Ok(())
    }

    /// Run every job that is due at the start of this iteration, in
    /// registration order, and reschedule each one cadence after that start.
    ///
    /// The clock is read again before every job. Once it is past `cutoff`,
    /// or `cancel` has fired, no further job is dispatched.
    ///
    /// Returns the number of ticks dispatched. Does nothing unless running.
    pub async fn run_due(
        &mut self,
        cutoff: Option<Instant>,
        cancel: &CancellationToken,
    ) -> usize {
        if self.state != SchedulerState::Running {
            return 0;
        }

        let clock = self.clock;
        let iteration = Instant::now();
        let mut dispatched = 0;

        for entry in &mut self.jobs {
            if !entry.next_due.is_some_and(|due| due <= iteration) {
                continue;
            }

            let kind = entry.job.kind();
            if cancel.is_cancelled() {
                tracing::debug!(job = %kind, "Stop requested, tick not dispatched");
                break;
            }
            let now = Instant::now();
            if let Some(cutoff) = cutoff
                && now > cutoff
            {
                entry.job.span().in_scope(|| {
                    tracing::debug!(
                        job = %kind,
                        late = ?(now - cutoff),
                        "Past the run deadline, tick not dispatched"
                    );
                });
                break;
            }

            entry.ticks += 1;
            match entry.job.tick(clock.now()).await {
                Ok(TickOutcome::Recorded) => entry.recorded += 1,
                Ok(TickOutcome::Skipped) => entry.skipped += 1,
                Err(e) => {
                    entry.failed += 1;
                    entry.job.span().in_scope(|| {
                        tracing::error!(job = %kind, error = %e, "Tick failed");
                    });
                }
            }

            let cadence = entry.job.cadence();
            entry.next_due = iteration.checked_add(cadence);
            if entry.next_due.is_some_and(|due| due <= Instant::now()) {
                entry.job.span().in_scope(|| {
                    tracing::warn!(
                        job = %kind,
                        took = ?(Instant::now() - iteration),
                        ?cadence,
                        "Tick overran its cadence"
                    );
                });
            }
            dispatched += 1;
        }

        dispatched
    }

    /// Transition to `Stopped`. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == SchedulerState::Stopped {
            return false;
        }
        tracing::debug!(from = %self.state, "Scheduler stopped");
        self.state = SchedulerState::Stopped;
        true
    }

    /// Remove all pending jobs. Idempotent; returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.jobs.len();
        self.jobs.clear();
        removed
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn clock(&self) -> &RunClock {
        &self.clock
    }

    /// Get the number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// List all registered jobs in registration order.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs.iter().map(ScheduledJob::info).collect()
    }

    /// Earliest pending slot, if any job is registered.
    pub fn next_due(&self) -> Option<Instant> {
        self.jobs.iter().filter_map(|j| j.next_due).min()
    }

    fn expect_state(&self, expected: SchedulerState) -> Result<(), SchedulerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SchedulerError::InvalidState {
                actual: self.state,
                expected,
            })
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("job_count", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::JobError;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tracing::Span;

    /// Records every tick as `(kind, timestamp)` into a shared log.
    struct RecordingJob {
        kind: SampleKind,
        cadence: Duration,
        work: Duration,
        log: Arc<Mutex<Vec<(SampleKind, NaiveDateTime)>>>,
        table: PathBuf,
        span: Span,
    }

    impl RecordingJob {
        fn new(
            kind: SampleKind,
            cadence: Duration,
            log: &Arc<Mutex<Vec<(SampleKind, NaiveDateTime)>>>,
        ) -> Self {
            Self {
                kind,
                cadence,
                work: Duration::ZERO,
                log: Arc::clone(log),
                table: PathBuf::from(format!("{kind}.csv")),
                span: Span::none(),
            }
        }
    }

    #[async_trait]
    impl Job for RecordingJob {
        fn kind(&self) -> SampleKind {
            self.kind
        }

        fn cadence(&self) -> Duration {
            self.cadence
        }

        fn table_path(&self) -> &Path {
            &self.table
        }

        fn span(&self) -> &Span {
            &self.span
        }

        async fn tick(&mut self, at: NaiveDateTime) -> Result<TickOutcome, JobError> {
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.log.lock().unwrap().push((self.kind, at));
            Ok(TickOutcome::Recorded)
        }
    }

    fn clock() -> RunClock {
        let started = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        RunClock::start(started)
    }

    /// Drive the scheduler the way the lifecycle loop does.
    async fn poll_for(scheduler: &mut Scheduler, total: Duration) {
        let end = scheduler.clock().origin() + total;
        let cancel = CancellationToken::new();
        while Instant::now() <= end {
            scheduler.run_due(None, &cancel).await;
            tokio::time::sleep(DEFAULT_POLL_QUANTUM).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_jobs() {
        let mut scheduler = Scheduler::new(clock());
        assert!(matches!(scheduler.start(), Err(SchedulerError::NoJobs)));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_kind_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let minute = Duration::from_secs(60);

        scheduler
            .register(RecordingJob::new(SampleKind::Usage, minute, &log))
            .unwrap();
        let result = scheduler.register(RecordingJob::new(SampleKind::Usage, minute, &log));
        assert!(matches!(
            result,
            Err(SchedulerError::DuplicateJob(SampleKind::Usage))
        ));

        let zero = scheduler.register(RecordingJob::new(SampleKind::Speed, Duration::ZERO, &log));
        assert!(matches!(zero, Err(SchedulerError::ZeroCadence(_))));
        assert_eq!(scheduler.job_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_after_start_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let minute = Duration::from_secs(60);
        scheduler
            .register(RecordingJob::new(SampleKind::Usage, minute, &log))
            .unwrap();
        scheduler.start().unwrap();

        let result = scheduler.register(RecordingJob::new(SampleKind::Speed, minute, &log));
        assert!(matches!(result, Err(SchedulerError::InvalidState { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_fire_on_cadence_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let minute = Duration::from_secs(60);

        scheduler
            .register(RecordingJob::new(SampleKind::Speed, minute, &log))
            .unwrap();
        scheduler
            .register(RecordingJob::new(SampleKind::Usage, minute, &log))
            .unwrap();
        scheduler.start().unwrap();

        poll_for(&mut scheduler, Duration::from_secs(150)).await;

        let log = log.lock().unwrap();
        let kinds: Vec<SampleKind> = log.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                SampleKind::Speed,
                SampleKind::Usage,
                SampleKind::Speed,
                SampleKind::Usage
            ]
        );
        let started = scheduler.clock().started_at();
        assert_eq!(log[0].1, started + chrono::TimeDelta::seconds(60));
        assert_eq!(log[2].1, started + chrono::TimeDelta::seconds(120));
    }

    /// Tick log as seconds since the run started.
    fn offsets(
        scheduler: &Scheduler,
        log: &Mutex<Vec<(SampleKind, NaiveDateTime)>>,
    ) -> Vec<(SampleKind, i64)> {
        let started = scheduler.clock().started_at();
        log.lock()
            .unwrap()
            .iter()
            .map(|(kind, at)| (*kind, (*at - started).num_seconds()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_reschedules_from_iteration_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let mut job = RecordingJob::new(SampleKind::Speed, Duration::from_secs(60), &log);
        job.work = Duration::from_secs(20);
        scheduler.register(job).unwrap();
        scheduler.start().unwrap();

        poll_for(&mut scheduler, Duration::from_secs(200)).await;

        // 20s of work per tick, the next tick is a cadence after dispatch
        assert_eq!(
            offsets(&scheduler, &log),
            vec![
                (SampleKind::Speed, 60),
                (SampleKind::Speed, 120),
                (SampleKind::Speed, 180)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_fires_on_next_poll() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let mut job = RecordingJob::new(SampleKind::Speed, Duration::from_secs(60), &log);
        job.work = Duration::from_secs(130);
        scheduler.register(job).unwrap();
        scheduler.start().unwrap();

        poll_for(&mut scheduler, Duration::from_secs(400)).await;

        // Each tick ends past its next slot, so the following poll fires it
        let ticks: Vec<i64> = offsets(&scheduler, &log).into_iter().map(|(_, s)| s).collect();
        assert_eq!(ticks, vec![60, 191, 322]);
        assert_eq!(scheduler.list_jobs()[0].ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_clear_are_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        scheduler
            .register(RecordingJob::new(
                SampleKind::Usage,
                Duration::from_secs(60),
                &log,
            ))
            .unwrap();
        scheduler.start().unwrap();

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        assert_eq!(scheduler.clear(), 1);
        assert_eq!(scheduler.clear(), 0);

        // Nothing dispatches once stopped
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(scheduler.run_due(None, &CancellationToken::new()).await, 0);
        assert!(log.lock().unwrap().is_empty());
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::InvalidState { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cutoff_caps_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        scheduler
            .register(RecordingJob::new(
                SampleKind::Usage,
                Duration::from_secs(60),
                &log,
            ))
            .unwrap();
        scheduler.start().unwrap();
        let cancel = CancellationToken::new();

        tokio::time::sleep(Duration::from_secs(61)).await;
        let cutoff = scheduler.clock().origin() + Duration::from_secs(59);
        assert_eq!(scheduler.run_due(Some(cutoff), &cancel).await, 0);
        assert_eq!(scheduler.run_due(None, &cancel).await, 1);
        assert_eq!(scheduler.list_jobs()[0].recorded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_holds_back_later_jobs_past_cutoff() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let minute = Duration::from_secs(60);
        let mut speed = RecordingJob::new(SampleKind::Speed, minute, &log);
        speed.work = Duration::from_secs(30);
        scheduler.register(speed).unwrap();
        scheduler
            .register(RecordingJob::new(SampleKind::Usage, minute, &log))
            .unwrap();
        scheduler.start().unwrap();

        let cutoff = scheduler.clock().origin() + Duration::from_secs(181);
        let cancel = CancellationToken::new();
        while Instant::now() <= cutoff {
            scheduler.run_due(Some(cutoff), &cancel).await;
            tokio::time::sleep(DEFAULT_POLL_QUANTUM).await;
        }

        // The speed tick at 180 runs until 210; usage must not follow it
        assert_eq!(
            offsets(&scheduler, &log),
            vec![
                (SampleKind::Speed, 60),
                (SampleKind::Usage, 90),
                (SampleKind::Speed, 120),
                (SampleKind::Usage, 150),
                (SampleKind::Speed, 180),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_jobs_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let minute = Duration::from_secs(60);
        let mut speed = RecordingJob::new(SampleKind::Speed, minute, &log);
        speed.work = Duration::from_secs(30);
        scheduler.register(speed).unwrap();
        scheduler
            .register(RecordingJob::new(SampleKind::Usage, minute, &log))
            .unwrap();
        scheduler.start().unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(75)).await;
            trigger.cancel();
        });

        tokio::time::sleep(minute).await;
        assert_eq!(scheduler.run_due(None, &cancel).await, 1);
        assert_eq!(offsets(&scheduler, &log), vec![(SampleKind::Speed, 60)]);
        assert_eq!(scheduler.list_jobs()[1].ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_overflow_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(clock());
        let result = scheduler.register(RecordingJob::new(SampleKind::Usage, Duration::MAX, &log));
        assert!(matches!(
            result,
            Err(SchedulerError::CadenceOverflow(SampleKind::Usage))
        ));
        assert_eq!(scheduler.job_count(), 0);
    }
}
