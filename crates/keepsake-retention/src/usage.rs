//! Per-space disk usage computation.

use crate::error::{RetentionError, RetentionResult};
use chrono::{DateTime, Utc};
use keepsake_store::VersionStore;
use keepsake_util::path as kpath;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// A snapshot of how much a space and its version storage occupy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Original files plus version storage.
    pub total_size: u64,

    /// Committed versions (file and folder granularity).
    pub version_count: usize,

    /// Bytes of the user's own files, control directory excluded.
    pub original_files_size: u64,

    /// Bytes under the control directory.
    pub control_dir_size: u64,

    /// Timestamp of the oldest committed version.
    pub oldest_version: Option<DateTime<Utc>>,

    /// Timestamp of the newest committed version.
    pub newest_version: Option<DateTime<Utc>>,
}

/// Compute usage for one space. O(files) - meant for a timer, not per-event.
///
/// Only committed records are counted, so this can run concurrently with
/// in-flight creations.
pub async fn compute_usage(store: &VersionStore, space_root: &Path) -> RetentionResult<DiskUsage> {
    if !store.is_initialized(space_root) {
        return Err(RetentionError::SpaceNotInitialized(space_root.to_path_buf()));
    }

    let root = space_root.to_path_buf();
    let (original_files_size, control_dir_size) =
        tokio::task::spawn_blocking(move || scan_sizes(&root))
            .await
            .map_err(|err| RetentionError::ScanFailed(err.to_string()))?;

    let mut version_count = 0;
    let mut oldest_version: Option<DateTime<Utc>> = None;
    let mut newest_version: Option<DateTime<Utc>> = None;
    let mut observe = |timestamp: DateTime<Utc>| {
        version_count += 1;
        if oldest_version.map_or(true, |t| timestamp < t) {
            oldest_version = Some(timestamp);
        }
        if newest_version.map_or(true, |t| timestamp > t) {
            newest_version = Some(timestamp);
        }
    };

    for version in store.all_file_versions(space_root).await? {
        observe(version.timestamp);
    }
    for version in store.folder_versions(space_root).await? {
        observe(version.timestamp);
    }
    drop(observe);

    Ok(DiskUsage {
        total_size: original_files_size + control_dir_size,
        version_count,
        original_files_size,
        control_dir_size,
        oldest_version,
        newest_version,
    })
}

/// Walk the space once, splitting byte counts between user files and the
/// control directory. Unreadable entries are skipped.
fn scan_sizes(root: &Path) -> (u64, u64) {
    let control_root = kpath::control_dir(root);
    let mut original = 0;
    let mut control = 0;

    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry during usage scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let len = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if entry.path().starts_with(&control_root) {
            control += len;
        } else {
            original += len;
        }
    }

    (original, control)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    #[tokio::test]
    async fn test_usage_of_uninitialized_space_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::new();
        assert!(matches!(
            compute_usage(&store, dir.path()).await,
            Err(RetentionError::SpaceNotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_usage_splits_original_and_control() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::new();
        store.initialize_space(dir.path()).await.unwrap();

        let file = dir.path().join("a.txt");
        fs::write(&file, "12345678").await.unwrap(); // 8 bytes
        store.create_file_version(&file, None).await.unwrap();

        let usage = compute_usage(&store, dir.path()).await.unwrap();
        assert_eq!(usage.original_files_size, 8);
        // Version bytes plus the metadata record
        assert!(usage.control_dir_size > 8);
        assert_eq!(usage.version_count, 1);
        assert!(usage.oldest_version.is_some());
        assert_eq!(usage.oldest_version, usage.newest_version);
        assert_eq!(
            usage.total_size,
            usage.original_files_size + usage.control_dir_size
        );
    }

    #[tokio::test]
    async fn test_usage_of_empty_space() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::new();
        store.initialize_space(dir.path()).await.unwrap();

        let usage = compute_usage(&store, dir.path()).await.unwrap();
        assert_eq!(usage.version_count, 0);
        assert_eq!(usage.original_files_size, 0);
        assert!(usage.oldest_version.is_none());
    }
}
