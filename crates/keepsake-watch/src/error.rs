//! Watch pipeline error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for watch operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Errors that can occur while starting or running a change pipeline.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watched root does not exist.
    #[error("watch root does not exist: {0}")]
    RootNotFound(PathBuf),

    /// The watched root is not a directory.
    #[error("watch root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Both the native watcher and the polling fallback failed.
    #[error("watch backend failed: {0}")]
    Backend(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
