//! Retention engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for retention operations.
pub type RetentionResult<T> = Result<T, RetentionError>;

/// Errors that can occur during retention operations.
#[derive(Debug, Error)]
pub enum RetentionError {
    /// The space has no control layout to scan.
    #[error("space is not initialized: {0}")]
    SpaceNotInitialized(PathBuf),

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] keepsake_store::StoreError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A background scan task failed to complete.
    #[error("scan task failed: {0}")]
    ScanFailed(String),
}
