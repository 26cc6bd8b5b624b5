//! Run-relative clock.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tokio::time::Instant;

/// Maps monotonic instants onto wall-clock timestamps for one run.
///
/// Row timestamps are `started_at + elapsed`, so they increase with the
/// monotonic clock even if the system clock is adjusted mid-run.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started_at: NaiveDateTime,
    origin: Instant,
}

impl RunClock {
    /// Start a clock whose origin is now.
    pub fn start(started_at: NaiveDateTime) -> Self {
        Self {
            started_at,
            origin: Instant::now(),
        }
    }

    /// Wall-clock start of the run.
    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    /// Monotonic start of the run.
    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Wall-clock timestamp for the current instant.
    pub fn now(&self) -> NaiveDateTime {
        self.at(Instant::now())
    }

    /// Wall-clock timestamp for `instant`.
    pub fn at(&self, instant: Instant) -> NaiveDateTime {
        let elapsed = instant.saturating_duration_since(self.origin);
        TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| self.started_at.checked_add_signed(delta))
            .unwrap_or(self.started_at)
    }
}
