//! Registry error types.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while loading or saving the space registry.
///
/// Callers treat these as non-fatal: a registry failure is logged and the
/// engine keeps running with the spaces it has in memory.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The registry file could not be parsed.
    #[error("registry file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
