//! The search indexer collaborator.
//!
//! Indexing is fire-and-forget: the coordinator calls `index_file` after
//! each successful version creation and logs failures. An indexing failure
//! must never fail the creation it followed.

use async_trait::async_trait;
use keepsake_store::FileVersion;
use std::path::Path;
use tracing::debug;

/// Receives newly created versions for full-text indexing.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index one freshly created version of `path`.
    async fn index_file(&self, path: &Path, version: &FileVersion) -> anyhow::Result<()>;
}

/// Default indexer: does nothing beyond a debug log line.
#[derive(Debug, Default)]
pub struct NullIndex;

#[async_trait]
impl SearchIndex for NullIndex {
    async fn index_file(&self, path: &Path, version: &FileVersion) -> anyhow::Result<()> {
        debug!(path = %path.display(), id = %version.id, "indexing skipped (no indexer)");
        Ok(())
    }
}
