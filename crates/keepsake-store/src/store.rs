//! The content-addressed version store.
//!
//! Versions are plain file copies under the space's control directory,
//! committed bytes-first: a record only becomes visible to listings once
//! its metadata file has been fully written and renamed into place, so
//! scans never observe an in-flight creation.

use crate::error::{StoreError, StoreResult};
use crate::layout::SpaceLayout;
use crate::version::{FileVersion, FolderVersion, VersionId};
use chrono::Utc;
use keepsake_util::path as kpath;
use keepsake_util::{content_digest, CONTROL_DIR_NAME};
use std::collections::HashMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Durable, content-addressed storage and retrieval of file and folder
/// versions, with atomic restore.
///
/// One store instance serves any number of initialized spaces; it locates
/// the owning space for each path by walking up to the control directory.
/// Creation and restore on the same path are serialized by a per-path
/// async lock, so a restore can never observe a half-written version and
/// a creation can never read a half-restored file.
pub struct VersionStore {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl VersionStore {
    /// Create a new version store.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create the control-directory layout for a space.
    ///
    /// No-op success if already initialized; fails if `root` does not exist
    /// or is not a directory.
    pub async fn initialize_space(&self, root: &Path) -> StoreResult<()> {
        let meta = fs::metadata(root)
            .await
            .map_err(|_| StoreError::SpaceNotFound(root.to_path_buf()))?;
        if !meta.is_dir() {
            return Err(StoreError::SpaceNotFound(root.to_path_buf()));
        }

        let layout = SpaceLayout::new(root);
        for dir in layout.all_dirs() {
            fs::create_dir_all(&dir).await?;
        }
        debug!(root = %root.display(), "space layout initialized");
        Ok(())
    }

    /// Whether `root` has an initialized control layout.
    pub fn is_initialized(&self, root: &Path) -> bool {
        SpaceLayout::new(root).is_initialized()
    }

    // ------------------------------------------------------------------
    // File versions
    // ------------------------------------------------------------------

    /// Capture the current content of `path` as a new immutable version.
    ///
    /// Bytes are written first; the record is committed only after the
    /// bytes succeed, and a partial byte write is removed on failure, so a
    /// record and its storage never exist independently.
    pub async fn create_file_version(
        &self,
        path: &Path,
        comment: Option<String>,
    ) -> StoreResult<FileVersion> {
        let lock = self.lock_for(path).await;
        let _guard = lock.lock().await;
        self.create_file_version_unlocked(path, comment).await
    }

    async fn create_file_version_unlocked(
        &self,
        path: &Path,
        comment: Option<String>,
    ) -> StoreResult<FileVersion> {
        let meta = fs::metadata(path)
            .await
            .map_err(|_| StoreError::FileNotFound(path.to_path_buf()))?;
        if !meta.is_file() {
            return Err(StoreError::FileNotFound(path.to_path_buf()));
        }

        let space_root = kpath::find_space_root(path)
            .ok_or_else(|| StoreError::OutsideSpace(path.to_path_buf()))?;
        let layout = SpaceLayout::new(space_root);

        let bytes = fs::read(path).await?;
        let content_hash = content_digest(&bytes);
        let id = VersionId::new();

        fs::create_dir_all(layout.file_bucket_data_dir(path)).await?;
        let data_path = layout.file_data_path(path, &id);
        if let Err(err) = fs::write(&data_path, &bytes).await {
            let _ = fs::remove_file(&data_path).await;
            return Err(err.into());
        }

        let version = FileVersion {
            id,
            file_path: path.to_path_buf(),
            timestamp: Utc::now(),
            size_bytes: bytes.len() as u64,
            comment,
            content_hash,
            storage_path: data_path.clone(),
        };

        if let Err(err) = self.commit_file_record(&layout, &version).await {
            let _ = fs::remove_file(&data_path).await;
            return Err(err);
        }

        debug!(
            path = %path.display(),
            id = %version.id,
            size = version.size_bytes,
            "file version created"
        );
        Ok(version)
    }

    /// Write a file version record, making it visible to scans only once
    /// fully written.
    async fn commit_file_record(
        &self,
        layout: &SpaceLayout,
        version: &FileVersion,
    ) -> StoreResult<()> {
        fs::create_dir_all(layout.file_bucket_meta_dir(&version.file_path)).await?;
        let record_path = layout.file_meta_path(&version.file_path, &version.id);
        write_record(&record_path, &serde_json::to_string_pretty(version)?).await?;
        Ok(())
    }

    /// All versions of `path`, newest first.
    ///
    /// Empty (not an error) when none exist or the path is outside any
    /// space; unreadable records are skipped with a warning.
    pub async fn file_versions(&self, path: &Path) -> StoreResult<Vec<FileVersion>> {
        let Some(space_root) = kpath::find_space_root(path) else {
            return Ok(Vec::new());
        };
        let layout = SpaceLayout::new(space_root);

        let mut versions: Vec<FileVersion> =
            read_records(&layout.file_bucket_meta_dir(path)).await?;
        versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(versions)
    }

    /// Every committed file version in a space, across all paths.
    ///
    /// This is the scan the retention engine runs on its timer.
    pub async fn all_file_versions(&self, space_root: &Path) -> StoreResult<Vec<FileVersion>> {
        let layout = SpaceLayout::new(space_root);
        let meta_root = layout.file_metadata_dir();

        let mut versions = Vec::new();
        let mut buckets = match fs::read_dir(&meta_root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(err) => return Err(err.into()),
        };
        while let Some(bucket) = buckets.next_entry().await? {
            if bucket.file_type().await?.is_dir() {
                versions.extend(read_records::<FileVersion>(&bucket.path()).await?);
            }
        }
        Ok(versions)
    }

    /// Restore `path` to the state captured by `version`.
    ///
    /// All-or-nothing: the version's storage is validated (existence and
    /// content hash) before anything is touched, the current content is
    /// staged as a backup, and a failed overwrite is rolled back from the
    /// staging area - the filesystem ends exactly as it started.
    pub async fn restore_file_version(
        &self,
        path: &Path,
        version: &FileVersion,
    ) -> StoreResult<()> {
        let lock = self.lock_for(path).await;
        let _guard = lock.lock().await;

        let stored = match fs::read(&version.storage_path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return Err(StoreError::VersionMissing {
                    id: version.id.to_string(),
                    path: version.storage_path.clone(),
                })
            }
        };
        if content_digest(&stored) != version.content_hash {
            return Err(StoreError::HashMismatch {
                id: version.id.to_string(),
            });
        }

        let space_root = kpath::find_space_root(path)
            .ok_or_else(|| StoreError::OutsideSpace(path.to_path_buf()))?;
        let layout = SpaceLayout::new(space_root);
        let target_exists = fs::try_exists(path).await.unwrap_or(false);

        // Keep the outgoing content reachable as a regular version.
        if target_exists {
            if let Err(err) = self
                .create_file_version_unlocked(path, Some("Before restore".to_string()))
                .await
            {
                warn!(path = %path.display(), error = %err, "could not capture pre-restore version");
            }
        }

        let staging = layout.staging_dir().join(format!("restore-{}", version.id));
        let backup = staging.join("backup.data");
        if let Err(err) = fs::create_dir_all(&staging).await {
            return Err(err.into());
        }
        if target_exists {
            if let Err(err) = fs::copy(path, &backup).await {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(err.into());
            }
        }

        if let Err(err) = fs::write(path, &stored).await {
            // Roll back to the staged backup
            if target_exists {
                if let Err(rollback) = fs::copy(&backup, path).await {
                    error!(
                        path = %path.display(),
                        error = %rollback,
                        "rollback after failed restore also failed"
                    );
                }
            } else {
                let _ = fs::remove_file(path).await;
            }
            let _ = fs::remove_dir_all(&staging).await;
            return Err(StoreError::RestoreRolledBack(err.to_string()));
        }

        let _ = fs::remove_dir_all(&staging).await;
        info!(path = %path.display(), id = %version.id, "file restored");
        Ok(())
    }

    /// Remove a file version's bytes and record together.
    ///
    /// Returns the bytes freed. Already-missing pieces are tolerated so a
    /// half-deleted version can be cleaned up by a later pass.
    pub async fn delete_file_version(
        &self,
        space_root: &Path,
        version: &FileVersion,
    ) -> StoreResult<u64> {
        let layout = SpaceLayout::new(space_root);
        let freed = fs::metadata(&version.storage_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        remove_file_if_present(&version.storage_path).await?;
        remove_file_if_present(&layout.file_meta_path(&version.file_path, &version.id)).await?;

        debug!(id = %version.id, freed, "file version deleted");
        Ok(freed)
    }

    // ------------------------------------------------------------------
    // Folder versions
    // ------------------------------------------------------------------

    /// Capture every tracked file under `folder` (excluding the control
    /// directory) as a new folder version.
    pub async fn create_folder_version(
        &self,
        folder: &Path,
        comment: Option<String>,
    ) -> StoreResult<FolderVersion> {
        let lock = self.lock_for(folder).await;
        let _guard = lock.lock().await;

        if !folder.is_dir() {
            return Err(StoreError::SpaceNotFound(folder.to_path_buf()));
        }
        let layout = SpaceLayout::new(folder);
        if !layout.is_initialized() {
            return Err(StoreError::OutsideSpace(folder.to_path_buf()));
        }

        let id = VersionId::new();
        let storage = layout.folder_data_path(&id);
        if let Err(err) = copy_tree(
            folder.to_path_buf(),
            storage.clone(),
            Some(OsString::from(CONTROL_DIR_NAME)),
        )
        .await
        {
            let _ = fs::remove_dir_all(&storage).await;
            return Err(err.into());
        }

        let version = FolderVersion {
            id,
            folder_path: folder.to_path_buf(),
            timestamp: Utc::now(),
            comment,
            storage_path: storage.clone(),
        };

        if let Err(err) = self.commit_folder_record(&layout, &version).await {
            let _ = fs::remove_dir_all(&storage).await;
            return Err(err);
        }

        info!(folder = %folder.display(), id = %version.id, "folder version created");
        Ok(version)
    }

    async fn commit_folder_record(
        &self,
        layout: &SpaceLayout,
        version: &FolderVersion,
    ) -> StoreResult<()> {
        fs::create_dir_all(layout.folder_metadata_dir()).await?;
        let record_path = layout.folder_meta_path(&version.id);
        write_record(&record_path, &serde_json::to_string_pretty(version)?).await?;
        Ok(())
    }

    /// All folder versions of a space, newest first. Tolerant of unreadable
    /// records.
    pub async fn folder_versions(&self, folder: &Path) -> StoreResult<Vec<FolderVersion>> {
        let layout = SpaceLayout::new(folder);
        if !layout.is_initialized() {
            return Ok(Vec::new());
        }

        let mut versions: Vec<FolderVersion> =
            read_records(&layout.folder_metadata_dir()).await?;
        versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(versions)
    }

    /// Restore a whole folder to the state captured by `version`.
    ///
    /// The current tree (minus the control directory) is staged as a
    /// backup before anything is removed; a failure while swapping the
    /// stored tree in rolls the folder back to the staged state.
    pub async fn restore_folder_version(
        &self,
        folder: &Path,
        version: &FolderVersion,
    ) -> StoreResult<()> {
        let lock = self.lock_for(folder).await;
        let _guard = lock.lock().await;

        if !folder.is_dir() {
            return Err(StoreError::SpaceNotFound(folder.to_path_buf()));
        }
        let layout = SpaceLayout::new(folder);
        if !layout.is_initialized() {
            return Err(StoreError::OutsideSpace(folder.to_path_buf()));
        }
        if !version.storage_path.is_dir() {
            return Err(StoreError::VersionMissing {
                id: version.id.to_string(),
                path: version.storage_path.clone(),
            });
        }

        let staging = layout.staging_dir().join(format!("restore-{}", version.id));
        let backup = staging.join("backup");
        if let Err(err) = copy_tree(
            folder.to_path_buf(),
            backup.clone(),
            Some(OsString::from(CONTROL_DIR_NAME)),
        )
        .await
        {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(err.into());
        }

        if let Err(err) = replace_contents(folder, &version.storage_path).await {
            if let Err(rollback) = replace_contents(folder, &backup).await {
                error!(
                    folder = %folder.display(),
                    error = %rollback,
                    "rollback after failed folder restore also failed"
                );
            }
            let _ = fs::remove_dir_all(&staging).await;
            return Err(StoreError::RestoreRolledBack(err.to_string()));
        }

        let _ = fs::remove_dir_all(&staging).await;
        info!(folder = %folder.display(), id = %version.id, "folder restored");
        Ok(())
    }

    /// Remove a folder version's tree and record together.
    ///
    /// Returns the bytes freed.
    pub async fn delete_folder_version(
        &self,
        space_root: &Path,
        version: &FolderVersion,
    ) -> StoreResult<u64> {
        let layout = SpaceLayout::new(space_root);
        let freed = tree_size(version.storage_path.clone()).await.unwrap_or(0);

        match fs::remove_dir_all(&version.storage_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        remove_file_if_present(&layout.folder_meta_path(&version.id)).await?;

        debug!(id = %version.id, freed, "folder version deleted");
        Ok(freed)
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = kpath::normalize(path);
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Commit a record file atomically: temp file, then rename into place.
async fn write_record(path: &Path, json: &str) -> StoreResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read every parseable record in a directory. A missing directory is an
/// empty listing; a corrupt record is skipped with a warning.
async fn read_records<T: serde::de::DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
    let mut records = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(err) => return Err(err.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(record = %path.display(), error = %err, "skipping corrupt version record");
                }
            },
            Err(err) => {
                warn!(record = %path.display(), error = %err, "skipping unreadable version record");
            }
        }
    }
    Ok(records)
}

async fn remove_file_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Recursively copy a directory tree. `skip_name` excludes one top-level
/// entry (the control directory). Symlinks and special files are skipped.
fn copy_tree(
    src: PathBuf,
    dst: PathBuf,
    skip_name: Option<OsString>,
) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>> {
    Box::pin(async move {
        fs::create_dir_all(&dst).await?;
        let mut entries = fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if skip_name.as_deref() == Some(name.as_os_str()) {
                continue;
            }
            let from = entry.path();
            let to = dst.join(&name);
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                copy_tree(from, to, None).await?;
            } else if file_type.is_file() {
                fs::copy(&from, &to).await?;
            }
        }
        Ok(())
    })
}

/// Total size in bytes of every regular file under a directory.
fn tree_size(dir: PathBuf) -> Pin<Box<dyn Future<Output = std::io::Result<u64>> + Send>> {
    Box::pin(async move {
        let mut total = 0;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                total += tree_size(entry.path()).await?;
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
        Ok(total)
    })
}

/// Clear a folder (keeping the control directory) and copy `source`'s
/// contents into it.
async fn replace_contents(folder: &Path, source: &Path) -> std::io::Result<()> {
    let mut entries = fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == CONTROL_DIR_NAME {
            continue;
        }
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
    }
    copy_tree(source.to_path_buf(), folder.to_path_buf(), None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_space() -> (TempDir, VersionStore) {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::new();
        store.initialize_space(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_initialize_space_is_idempotent() {
        let (dir, store) = setup_space().await;
        store.initialize_space(dir.path()).await.unwrap();
        assert!(store.is_initialized(dir.path()));
    }

    #[tokio::test]
    async fn test_initialize_missing_root_has_no_side_effects() {
        let store = VersionStore::new();
        let missing = Path::new("/does/not/exist");
        assert!(matches!(
            store.initialize_space(missing).await,
            Err(StoreError::SpaceNotFound(_))
        ));
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_create_file_version_outside_space() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x").await.unwrap();

        let store = VersionStore::new();
        assert!(matches!(
            store.create_file_version(&file, None).await,
            Err(StoreError::OutsideSpace(_))
        ));
    }

    #[tokio::test]
    async fn test_create_file_version_missing_file() {
        let (dir, store) = setup_space().await;
        let missing = dir.path().join("ghost.txt");
        assert!(matches!(
            store.create_file_version(&missing, None).await,
            Err(StoreError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_list_newest_first() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");

        fs::write(&file, "v1").await.unwrap();
        let v1 = store.create_file_version(&file, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        fs::write(&file, "v2").await.unwrap();
        let v2 = store.create_file_version(&file, None).await.unwrap();

        let versions = store.file_versions(&file).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].id, v2.id);
        assert_eq!(versions[1].id, v1.id);
        for pair in versions.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        assert_eq!(versions[0].content_hash, content_digest(b"v2"));
    }

    #[tokio::test]
    async fn test_stored_bytes_match() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");
        fs::write(&file, "payload").await.unwrap();

        let version = store.create_file_version(&file, None).await.unwrap();
        let stored = fs::read(&version.storage_path).await.unwrap();
        assert_eq!(stored, b"payload");
        assert_eq!(version.size_bytes, 7);
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");

        fs::write(&file, "v1").await.unwrap();
        let old = store.create_file_version(&file, None).await.unwrap();
        fs::write(&file, "v2").await.unwrap();

        store.restore_file_version(&file, &old).await.unwrap();
        assert_eq!(fs::read_to_string(&file).await.unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_restore_missing_storage_leaves_target_untouched() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");

        fs::write(&file, "v1").await.unwrap();
        let version = store.create_file_version(&file, None).await.unwrap();
        fs::write(&file, "current").await.unwrap();
        fs::remove_file(&version.storage_path).await.unwrap();

        let count_before = store.file_versions(&file).await.unwrap().len();
        let result = store.restore_file_version(&file, &version).await;
        assert!(matches!(result, Err(StoreError::VersionMissing { .. })));
        assert_eq!(fs::read_to_string(&file).await.unwrap(), "current");
        // No pre-restore version was captured either
        assert_eq!(store.file_versions(&file).await.unwrap().len(), count_before);
    }

    #[tokio::test]
    async fn test_restore_corrupted_storage_fails_cleanly() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");

        fs::write(&file, "v1").await.unwrap();
        let version = store.create_file_version(&file, None).await.unwrap();
        fs::write(&version.storage_path, "tampered").await.unwrap();
        fs::write(&file, "current").await.unwrap();

        let result = store.restore_file_version(&file, &version).await;
        assert!(matches!(result, Err(StoreError::HashMismatch { .. })));
        assert_eq!(fs::read_to_string(&file).await.unwrap(), "current");
    }

    #[tokio::test]
    async fn test_restore_captures_pre_restore_version() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");

        fs::write(&file, "v1").await.unwrap();
        let old = store.create_file_version(&file, None).await.unwrap();
        fs::write(&file, "v2").await.unwrap();
        store.restore_file_version(&file, &old).await.unwrap();

        let versions = store.file_versions(&file).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].comment.as_deref(), Some("Before restore"));
        assert_eq!(versions[0].content_hash, content_digest(b"v2"));
    }

    #[tokio::test]
    async fn test_folder_version_excludes_control_dir() {
        let (dir, store) = setup_space().await;
        fs::write(dir.path().join("a.txt"), "a").await.unwrap();
        fs::create_dir_all(dir.path().join("docs")).await.unwrap();
        fs::write(dir.path().join("docs/b.txt"), "b").await.unwrap();

        let version = store
            .create_folder_version(dir.path(), Some("checkpoint".to_string()))
            .await
            .unwrap();

        assert!(version.storage_path.join("a.txt").exists());
        assert!(version.storage_path.join("docs/b.txt").exists());
        assert!(!version.storage_path.join(CONTROL_DIR_NAME).exists());
    }

    #[tokio::test]
    async fn test_folder_restore_round_trip() {
        let (dir, store) = setup_space().await;
        fs::write(dir.path().join("a.txt"), "original").await.unwrap();

        let version = store.create_folder_version(dir.path(), None).await.unwrap();

        fs::write(dir.path().join("a.txt"), "changed").await.unwrap();
        fs::write(dir.path().join("extra.txt"), "new").await.unwrap();

        store
            .restore_folder_version(dir.path(), &version)
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).await.unwrap(),
            "original"
        );
        assert!(!dir.path().join("extra.txt").exists());
        // Control directory survives the swap
        assert!(store.is_initialized(dir.path()));
    }

    #[tokio::test]
    async fn test_folder_restore_missing_storage_is_rejected() {
        let (dir, store) = setup_space().await;
        fs::write(dir.path().join("a.txt"), "keep").await.unwrap();

        let version = store.create_folder_version(dir.path(), None).await.unwrap();
        fs::remove_dir_all(&version.storage_path).await.unwrap();

        let result = store.restore_folder_version(dir.path(), &version).await;
        assert!(matches!(result, Err(StoreError::VersionMissing { .. })));
        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).await.unwrap(),
            "keep"
        );
    }

    #[tokio::test]
    async fn test_create_folder_version_missing_root() {
        let store = VersionStore::new();
        let missing = Path::new("/does/not/exist");
        assert!(matches!(
            store.create_folder_version(missing, None).await,
            Err(StoreError::SpaceNotFound(_))
        ));
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_concurrent_folder_versions_get_unique_ids() {
        let (dir, store) = setup_space().await;
        fs::write(dir.path().join("a.txt"), "data").await.unwrap();

        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            let root = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                store.create_folder_version(&root, None).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 10);

        let versions = store.folder_versions(dir.path()).await.unwrap();
        assert!(versions.len() >= ok);
        let mut ids: Vec<_> = versions.iter().map(|v| v.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), versions.len());
    }

    #[tokio::test]
    async fn test_delete_file_version_removes_record_and_bytes() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");
        fs::write(&file, "12345").await.unwrap();

        let version = store.create_file_version(&file, None).await.unwrap();
        let freed = store
            .delete_file_version(dir.path(), &version)
            .await
            .unwrap();

        assert_eq!(freed, 5);
        assert!(!version.storage_path.exists());
        assert!(store.file_versions(&file).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_tolerates_corrupt_records() {
        let (dir, store) = setup_space().await;
        let file = dir.path().join("a.txt");
        fs::write(&file, "v1").await.unwrap();
        store.create_file_version(&file, None).await.unwrap();

        let layout = SpaceLayout::new(dir.path());
        let bucket = layout.file_bucket_meta_dir(&file);
        fs::write(bucket.join("ver_garbage.json"), "{not json")
            .await
            .unwrap();

        let versions = store.file_versions(&file).await.unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_versions_outside_space_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::new();
        let versions = store
            .file_versions(&dir.path().join("a.txt"))
            .await
            .unwrap();
        assert!(versions.is_empty());
    }
}
