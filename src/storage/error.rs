//! Storage-specific error types.
//!
//! All record table operations return [`StorageError`] on failure, which can
//! be matched to determine the underlying cause (I/O, malformed data, etc.).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Table content could not be parsed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Table header does not match the expected columns.
    #[error("unexpected header in '{path}': found '{found}'")]
    HeaderMismatch { path: PathBuf, found: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
