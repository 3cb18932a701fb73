//! Error types for the core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A space already protects this root.
    #[error("a space already exists at {0}")]
    SpaceExists(PathBuf),

    /// No space with this id.
    #[error("space not found: {0}")]
    SpaceNotFound(String),

    /// Version store error.
    #[error("store error: {0}")]
    Store(#[from] keepsake_store::StoreError),

    /// Change pipeline error.
    #[error("watch error: {0}")]
    Watch(#[from] keepsake_watch::WatchError),

    /// Retention engine error.
    #[error("retention error: {0}")]
    Retention(#[from] keepsake_retention::RetentionError),

    /// Registry persistence error.
    #[error("registry error: {0}")]
    Registry(#[from] keepsake_registry::RegistryError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
