//! Logging setup.
//!
//! One `tracing` subscriber per process, built explicitly from the run's
//! log files:
//!
//! - **Console**: stderr, filtered by `RUST_LOG` (falling back to the
//!   configured level)
//! - **Run log**: `<stamp>_run.log`, every event of the run
//! - **Job logs**: `<stamp>_speed.log` / `<stamp>_data_usage.log`, only the
//!   events emitted inside that job's span (see [`job_span`])
//!
//! Jobs receive their span at construction; nothing looks a logger up by
//! name at runtime.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{Metadata, Span};
use tracing_subscriber::filter::{LevelFilter, dynamic_filter_fn};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::LoggingConfig;
use crate::storage::{RunLayout, SampleKind};

/// Boxed layer over the base registry.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A log file could not be created.
    #[error("failed to create log file '{path}': {source}")]
    FileCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Span carrying a job's log stream.
pub fn job_span(kind: SampleKind) -> Span {
    match kind {
        SampleKind::Speed => tracing::info_span!("speed_job"),
        SampleKind::Usage => tracing::info_span!("usage_job"),
    }
}

fn job_span_name(kind: SampleKind) -> &'static str {
    match kind {
        SampleKind::Speed => "speed_job",
        SampleKind::Usage => "usage_job",
    }
}

/// Stderr layer filtered by `RUST_LOG`, or by `level` when unset.
pub fn console_layer(level: &str) -> BoxedLayer {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter)
        .boxed()
}

/// Run log plus one log per job kind, all at `INFO` and above.
///
/// # Errors
/// Returns `LoggingError::FileCreate` if the logs directory or a file
/// cannot be created.
pub fn file_layers(layout: &RunLayout, kinds: &[SampleKind]) -> Result<Vec<BoxedLayer>, LoggingError> {
    let mut layers = Vec::with_capacity(kinds.len() + 1);

    let run_log = open_log(&layout.run_log_path())?;
    layers.push(
        fmt::layer()
            .with_writer(Mutex::new(run_log))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO)
            .boxed(),
    );

    for &kind in kinds {
        let file = open_log(&layout.job_log_path(kind))?;
        let span_name = job_span_name(kind);
        let in_job = dynamic_filter_fn(move |meta: &Metadata<'_>, cx: &Context<'_, Registry>| {
            if meta.is_span() {
                return true;
            }
            if *meta.level() > tracing::Level::INFO {
                return false;
            }
            cx.lookup_current()
                .is_some_and(|span| span.scope().any(|s| s.name() == span_name))
        });

        layers.push(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(in_job)
                .boxed(),
        );
    }

    Ok(layers)
}

/// Install the global subscriber.
///
/// With `files`, also writes the run log and the per-job logs of the given
/// kinds.
///
/// # Errors
/// Returns `LoggingError` if a log file cannot be created or a subscriber
/// is already installed.
pub fn init(
    config: &LoggingConfig,
    files: Option<(&RunLayout, &[SampleKind])>,
) -> Result<(), LoggingError> {
    let mut layers = vec![console_layer(&config.level)];
    if config.files
        && let Some((layout, kinds)) = files
    {
        layers.extend(file_layers(layout, kinds)?);
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

fn open_log(path: &Path) -> Result<File, LoggingError> {
    let create = |e| LoggingError::FileCreate {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(create)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(create)
}
