//! Stop reasons and the shared stop handle.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use strum_macros::Display;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long a run lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationPolicy {
    /// Stop once this much time has passed since start.
    Bounded(Duration),
    /// Run until stopped by a signal or request.
    Unbounded,
}

impl DurationPolicy {
    /// Deadline of a run started at `origin`, if bounded.
    ///
    /// A duration past the end of the clock has no deadline, like
    /// `Unbounded`.
    pub fn deadline(&self, origin: Instant) -> Option<Instant> {
        match self {
            Self::Bounded(duration) => {
                let deadline = origin.checked_add(*duration);
                if deadline.is_none() {
                    tracing::warn!(?duration, "Run duration out of range, running unbounded");
                }
                deadline
            }
            Self::Unbounded => None,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StopReason {
    /// The bounded duration elapsed.
    DurationElapsed,
    /// Ctrl+C / SIGINT.
    Interrupted,
    /// SIGTERM.
    Terminated,
    /// SIGALRM.
    Alarm,
    /// Explicit stop through a [`StopHandle`].
    Requested,
}

/// Cloneable handle that requests a run to stop.
///
/// The first reason posted wins; later calls are ignored. Posting is cheap
/// and does no I/O, so it is safe from a signal-listening task.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` if this call set the reason.
    pub fn stop(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Reason of the first stop request, if any.
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until a stop is requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Token cancelled on the first stop request.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
