//! Version store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for version store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during version store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The space root does not exist or is not a directory.
    #[error("space root not found: {0}")]
    SpaceNotFound(PathBuf),

    /// The target file does not exist or is not a regular file.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// The path is not inside any initialized space.
    #[error("path is not inside an initialized space: {0}")]
    OutsideSpace(PathBuf),

    /// The version's stored bytes are missing.
    #[error("version {id} storage is missing: {path}")]
    VersionMissing { id: String, path: PathBuf },

    /// The version's stored bytes no longer match the recorded hash.
    #[error("version {id} failed its integrity check")]
    HashMismatch { id: String },

    /// A restore failed and was rolled back; the target is unchanged.
    #[error("restore rolled back: {0}")]
    RestoreRolledBack(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata serialization error.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
