//! OS signal listener.

use tokio::task::JoinHandle;

use crate::lifecycle::{StopHandle, StopReason};

/// Process exit code after a second exit signal (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

/// Spawn a task that posts a stop reason on the first Ctrl+C, SIGTERM or
/// SIGALRM.
///
/// The task only posts to `handle`; the controller loop performs the stop
/// sequence. It exits once a stop is requested without a signal. After a
/// signal it keeps listening, and a second signal ends the process at once
/// with [`FORCED_EXIT_CODE`], even while a tick is still in flight.
pub fn spawn_signal_listener(handle: StopHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(reason) = listen(&handle, wait_for_signal).await {
            tracing::error!(%reason, "Received a second exit signal, exiting immediately");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}

/// Post the first signal from `next_signal` to `handle`, then wait for the
/// next one.
///
/// Returns `None` if the run stopped before any signal arrived.
async fn listen<F, Fut>(handle: &StopHandle, mut next_signal: F) -> Option<StopReason>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StopReason>,
{
    let reason = tokio::select! {
        reason = next_signal() => reason,
        () = handle.stopped() => return None,
    };

    tracing::warn!(%reason, "Received exit signal. Cleaning up...");
    handle.stop(reason);
    Some(next_signal().await)
}

/// Wait for the first supported signal.
///
/// A signal whose handler cannot be installed is logged and never fires.
async fn wait_for_signal() -> StopReason {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => StopReason::Interrupted,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(tokio::signal::unix::SignalKind::terminate(), StopReason::Terminated);
    #[cfg(unix)]
    let alarm = unix_signal(tokio::signal::unix::SignalKind::alarm(), StopReason::Alarm);

    #[cfg(not(unix))]
    let terminate = std::future::pending::<StopReason>();
    #[cfg(not(unix))]
    let alarm = std::future::pending::<StopReason>();

    tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
        reason = alarm => reason,
    }
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, reason: StopReason) -> StopReason {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            reason
        }
        Err(e) => {
            tracing::warn!(%reason, error = %e, "Failed to install signal handler");
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_exits_after_stop() {
        let handle = StopHandle::new();
        let task = spawn_signal_listener(handle.clone());

        handle.stop(StopReason::Requested);
        task.await.unwrap();
        assert_eq!(handle.reason(), Some(StopReason::Requested));
    }

    /// Signal source fed from a channel.
    fn scripted(
        rx: tokio::sync::mpsc::UnboundedReceiver<StopReason>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = StopReason> + Send>> {
        let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));
        move || {
            let rx = std::sync::Arc::clone(&rx);
            Box::pin(async move {
                match rx.lock().await.recv().await {
                    Some(reason) => reason,
                    None => std::future::pending().await,
                }
            })
        }
    }

    #[tokio::test]
    async fn test_second_signal_is_reported() {
        let handle = StopHandle::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { listen(&waiter, scripted(rx)).await });

        tx.send(StopReason::Interrupted).unwrap();
        handle.stopped().await;
        assert_eq!(handle.reason(), Some(StopReason::Interrupted));
        assert!(!task.is_finished());

        tx.send(StopReason::Terminated).unwrap();
        assert_eq!(task.await.unwrap(), Some(StopReason::Terminated));
        // The first reason still stands
        assert_eq!(handle.reason(), Some(StopReason::Interrupted));
    }

    #[tokio::test]
    async fn test_stop_without_signal_ends_listening() {
        let handle = StopHandle::new();
        let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();

        handle.stop(StopReason::DurationElapsed);
        assert_eq!(listen(&handle, scripted(rx)).await, None);
    }
}
