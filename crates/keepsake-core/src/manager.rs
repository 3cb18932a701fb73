//! The space coordinator.
//!
//! One [`SpaceManager`] per process owns the list of spaces, wires one
//! change pipeline per space to the version store, keeps the registry
//! persisted, and runs the retention timers. All collaborators are passed
//! in by reference - there is no global state.

use crate::error::{CoreError, CoreResult};
use crate::index::SearchIndex;
use crate::EngineConfig;
use keepsake_registry::{RegistryStore, Space, SpaceId};
use keepsake_retention::{CleanupResult, DiskUsage, RetentionEngine, StoragePolicy};
use keepsake_store::{FileVersion, FolderVersion, VersionStore};
use keepsake_util::path as kpath;
use keepsake_watch::{ChangeEvent, ChangeKind, ChangePipeline, WatchBudget};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// A running monitor for one space: its pipeline plus the worker draining
/// the pipeline's channel.
struct Monitor {
    pipeline: ChangePipeline,
    worker: JoinHandle<()>,
}

/// Owns the spaces and coordinates watching, versioning and retention.
///
/// The space list is read far more than it is written: reads share the
/// lock, mutation (adding or removing a space) is exclusive and waits for
/// in-flight reads. Monitors live behind their own mutex and are only
/// touched by lifecycle operations, always after the space list.
pub struct SpaceManager {
    store: Arc<VersionStore>,
    registry: Arc<dyn RegistryStore>,
    indexer: Arc<dyn SearchIndex>,
    retention: Arc<RetentionEngine>,
    config: EngineConfig,
    budget: WatchBudget,
    spaces: RwLock<Vec<Space>>,
    monitors: Mutex<HashMap<SpaceId, Monitor>>,
}

impl SpaceManager {
    /// Create a manager over its injected collaborators.
    pub fn new(
        store: Arc<VersionStore>,
        registry: Arc<dyn RegistryStore>,
        indexer: Arc<dyn SearchIndex>,
        config: EngineConfig,
    ) -> Self {
        let retention = Arc::new(RetentionEngine::new(Arc::clone(&store)));
        let budget = WatchBudget::new(config.watch.max_native_watches);
        Self {
            store,
            registry,
            indexer,
            retention,
            config,
            budget,
            spaces: RwLock::new(Vec::new()),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Space lifecycle
    // ------------------------------------------------------------------

    /// Load persisted spaces and resume monitoring for those that had it
    /// enabled. Returns the number of spaces loaded.
    ///
    /// Registry failures are logged, never fatal: the engine starts with
    /// zero spaces instead.
    pub async fn load(&self) -> CoreResult<usize> {
        let loaded = match self.registry.load_spaces().await {
            Ok(spaces) => spaces,
            Err(err) => {
                warn!(error = %err, "could not load registry, starting with zero spaces");
                Vec::new()
            }
        };

        let mut spaces = self.spaces.write().await;
        *spaces = loaded;
        let count = spaces.len();

        for space in spaces.clone() {
            if !space.monitoring_enabled {
                continue;
            }
            if self.store.initialize_space(&space.root_path).await.is_err() {
                warn!(
                    space = %space.name,
                    root = %space.root_path.display(),
                    "space root missing, monitoring not resumed"
                );
                continue;
            }
            self.start_monitor(&space).await;
        }

        info!(count, "spaces loaded");
        Ok(count)
    }

    /// Create a new space protecting `path` and start monitoring it.
    ///
    /// The directory is created if absent; a second space on the same root
    /// is rejected.
    pub async fn create_space(&self, name: &str, path: &Path) -> CoreResult<Space> {
        let root = kpath::normalize(path);
        let mut spaces = self.spaces.write().await;
        if spaces.iter().any(|s| s.root_path == root) {
            return Err(CoreError::SpaceExists(root));
        }

        fs::create_dir_all(&root).await?;
        self.store.initialize_space(&root).await?;

        let space = Space::new(name, root);
        spaces.push(space.clone());
        self.persist(&spaces).await;

        if space.monitoring_enabled {
            self.start_monitor(&space).await;
        }

        info!(space = %space.name, root = %space.root_path.display(), "space created");
        Ok(space)
    }

    /// Delete a space: stop its monitor and remove the registry entry.
    ///
    /// User files and the control directory are left on disk.
    pub async fn delete_space(&self, id: &SpaceId) -> CoreResult<()> {
        let mut spaces = self.spaces.write().await;
        let position = spaces
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| CoreError::SpaceNotFound(id.to_string()))?;

        let space = spaces.remove(position);
        self.stop_monitor(&space).await;
        self.persist(&spaces).await;

        info!(space = %space.name, "space deleted, files left on disk");
        Ok(())
    }

    /// All registered spaces.
    pub async fn spaces(&self) -> Vec<Space> {
        self.spaces.read().await.clone()
    }

    /// Look up a space by id.
    pub async fn space(&self, id: &SpaceId) -> Option<Space> {
        self.spaces
            .read()
            .await
            .iter()
            .find(|s| &s.id == id)
            .cloned()
    }

    /// Look up the space containing a path.
    pub async fn space_for_path(&self, path: &Path) -> Option<Space> {
        self.spaces
            .read()
            .await
            .iter()
            .find(|s| s.contains(path))
            .cloned()
    }

    /// Enable or disable monitoring for a space, persisting the flag.
    pub async fn set_monitoring(&self, id: &SpaceId, enabled: bool) -> CoreResult<()> {
        let mut spaces = self.spaces.write().await;
        let space = {
            let record = spaces
                .iter_mut()
                .find(|s| &s.id == id)
                .ok_or_else(|| CoreError::SpaceNotFound(id.to_string()))?;
            record.monitoring_enabled = enabled;
            record.clone()
        };

        if enabled {
            self.start_monitor(&space).await;
        } else {
            self.stop_monitor(&space).await;
        }
        self.persist(&spaces).await;
        Ok(())
    }

    /// Whether a space's monitor is currently running.
    pub async fn is_monitoring(&self, id: &SpaceId) -> bool {
        self.monitors.lock().await.contains_key(id)
    }

    /// Stop every monitor and retention timer.
    pub async fn shutdown(&self) {
        let spaces = self.spaces.read().await.clone();
        for space in spaces {
            self.stop_monitor(&space).await;
        }
        self.retention.stop_all();
        info!("space manager shut down");
    }

    // ------------------------------------------------------------------
    // Version store pass-throughs
    // ------------------------------------------------------------------

    /// Capture a version of one file and hand it to the indexer.
    pub async fn create_file_version(
        &self,
        path: &Path,
        comment: Option<String>,
    ) -> CoreResult<FileVersion> {
        let version = self.store.create_file_version(path, comment).await?;
        self.index(path, &version).await;
        Ok(version)
    }

    /// Capture a whole-space checkpoint.
    pub async fn create_folder_version(
        &self,
        folder: &Path,
        comment: Option<String>,
    ) -> CoreResult<FolderVersion> {
        Ok(self.store.create_folder_version(folder, comment).await?)
    }

    /// All versions of a file, newest first.
    pub async fn file_versions(&self, path: &Path) -> CoreResult<Vec<FileVersion>> {
        Ok(self.store.file_versions(path).await?)
    }

    /// All folder versions of a space, newest first.
    pub async fn folder_versions(&self, folder: &Path) -> CoreResult<Vec<FolderVersion>> {
        Ok(self.store.folder_versions(folder).await?)
    }

    /// Atomically restore one file to a prior version.
    pub async fn restore_file_version(
        &self,
        path: &Path,
        version: &FileVersion,
    ) -> CoreResult<()> {
        Ok(self.store.restore_file_version(path, version).await?)
    }

    /// Atomically restore a whole space to a prior checkpoint.
    pub async fn restore_folder_version(
        &self,
        folder: &Path,
        version: &FolderVersion,
    ) -> CoreResult<()> {
        Ok(self.store.restore_folder_version(folder, version).await?)
    }

    // ------------------------------------------------------------------
    // Retention pass-throughs
    // ------------------------------------------------------------------

    /// Disk usage snapshot for a space.
    pub async fn disk_usage(&self, id: &SpaceId) -> CoreResult<DiskUsage> {
        let space = self.require_space(id).await?;
        Ok(self.retention.usage(&space.root_path).await?)
    }

    /// The storage policy for a space.
    pub async fn storage_policy(&self, id: &SpaceId) -> CoreResult<StoragePolicy> {
        Ok(self.require_space(id).await?.storage_policy)
    }

    /// Replace a space's storage policy, persisting it and restarting the
    /// retention timer with the new rule.
    pub async fn set_storage_policy(&self, id: &SpaceId, policy: StoragePolicy) -> CoreResult<()> {
        let mut spaces = self.spaces.write().await;
        let space = {
            let record = spaces
                .iter_mut()
                .find(|s| &s.id == id)
                .ok_or_else(|| CoreError::SpaceNotFound(id.to_string()))?;
            record.storage_policy = policy;
            record.clone()
        };
        self.persist(&spaces).await;

        if self.is_monitoring(&space.id).await {
            self.retention.stop_timer(&space.root_path);
            self.retention.start_timer(
                space.root_path.clone(),
                space.storage_policy.clone(),
                self.config.retention_interval,
            );
        }
        Ok(())
    }

    /// Delete all versions in a space older than `age`.
    pub async fn cleanup_older_than(
        &self,
        id: &SpaceId,
        age: Duration,
    ) -> CoreResult<CleanupResult> {
        let space = self.require_space(id).await?;
        Ok(self
            .retention
            .cleanup_older_than(age, &space.root_path)
            .await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn require_space(&self, id: &SpaceId) -> CoreResult<Space> {
        self.space(id)
            .await
            .ok_or_else(|| CoreError::SpaceNotFound(id.to_string()))
    }

    /// Persist the registry; failure is logged, never fatal.
    async fn persist(&self, spaces: &[Space]) {
        if let Err(err) = self.registry.save_spaces(spaces).await {
            warn!(error = %err, "could not persist space registry");
        }
    }

    /// Start the pipeline, worker and retention timer for a space. A
    /// failure to start is logged; the space stays registered and
    /// monitoring can be retried via [`Self::set_monitoring`].
    async fn start_monitor(&self, space: &Space) {
        let mut monitors = self.monitors.lock().await;
        if monitors.contains_key(&space.id) {
            return;
        }

        let mut pipeline = ChangePipeline::with_budget(
            space.root_path.clone(),
            self.config.watch.clone(),
            self.budget.clone(),
        );
        let receiver = match pipeline.start() {
            Ok(Some(receiver)) => receiver,
            Ok(None) => return,
            Err(err) => {
                warn!(
                    space = %space.name,
                    root = %space.root_path.display(),
                    error = %err,
                    "could not start monitoring"
                );
                return;
            }
        };

        let worker = tokio::spawn(run_worker(
            receiver,
            Arc::clone(&self.store),
            Arc::clone(&self.indexer),
        ));
        monitors.insert(space.id.clone(), Monitor { pipeline, worker });

        self.retention.start_timer(
            space.root_path.clone(),
            space.storage_policy.clone(),
            self.config.retention_interval,
        );
        debug!(space = %space.name, "monitoring started");
    }

    async fn stop_monitor(&self, space: &Space) {
        let mut monitors = self.monitors.lock().await;
        if let Some(mut monitor) = monitors.remove(&space.id) {
            monitor.pipeline.stop();
            monitor.worker.abort();
            self.retention.stop_timer(&space.root_path);
            debug!(space = %space.name, "monitoring stopped");
        }
    }

    async fn index(&self, path: &Path, version: &FileVersion) {
        if let Err(err) = self.indexer.index_file(path, version).await {
            warn!(
                path = %path.display(),
                id = %version.id,
                error = %err,
                "indexing failed after version creation"
            );
        }
    }
}

/// Drain one space's event channel.
///
/// Version creation is dispatched to its own task so hashing and copying
/// never block delivery of the next event; the store's per-path lock keeps
/// concurrent work on one path serialized.
async fn run_worker(
    mut receiver: mpsc::Receiver<ChangeEvent>,
    store: Arc<VersionStore>,
    indexer: Arc<dyn SearchIndex>,
) {
    while let Some(event) = receiver.recv().await {
        match event.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                let store = Arc::clone(&store);
                let indexer = Arc::clone(&indexer);
                tokio::spawn(async move {
                    let comment = format!("Saved on {}", event.kind);
                    match store.create_file_version(&event.path, Some(comment)).await {
                        Ok(version) => {
                            if let Err(err) = indexer.index_file(&event.path, &version).await {
                                warn!(
                                    path = %event.path.display(),
                                    error = %err,
                                    "indexing failed after version creation"
                                );
                            }
                        }
                        Err(err) => {
                            debug!(
                                path = %event.path.display(),
                                error = %err,
                                "change did not produce a version"
                            );
                        }
                    }
                });
            }
            ChangeKind::Deleted => {
                debug!(path = %event.path.display(), "file deleted");
            }
            ChangeKind::Renamed => {
                debug!(path = %event.path.display(), "file renamed");
            }
            ChangeKind::Unknown => {
                trace!(path = %event.path.display(), "unclassified event ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NullIndex;
    use keepsake_registry::MemoryRegistry;
    use tempfile::TempDir;

    fn manager_with(registry: Arc<dyn RegistryStore>) -> SpaceManager {
        SpaceManager::new(
            Arc::new(VersionStore::new()),
            registry,
            Arc::new(NullIndex),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_space_rejects_duplicate_root() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(Arc::new(MemoryRegistry::new()));

        manager.create_space("docs", dir.path()).await.unwrap();
        let result = manager.create_space("again", dir.path()).await;
        assert!(matches!(result, Err(CoreError::SpaceExists(_))));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_space_persists_to_registry() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(MemoryRegistry::new());
        let manager = manager_with(registry.clone());

        let space = manager.create_space("docs", dir.path()).await.unwrap();

        let persisted = registry.load_spaces().await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, space.id);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_space_keeps_files_on_disk() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(Arc::new(MemoryRegistry::new()));

        let space = manager.create_space("docs", dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "keep me")
            .await
            .unwrap();

        manager.delete_space(&space.id).await.unwrap();

        assert!(manager.spaces().await.is_empty());
        assert!(!manager.is_monitoring(&space.id).await);
        assert!(dir.path().join("a.txt").exists());
        assert!(dir.path().join(".control").exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_space_fails() {
        let manager = manager_with(Arc::new(MemoryRegistry::new()));
        let result = manager
            .delete_space(&SpaceId::from_string("spc_ghost"))
            .await;
        assert!(matches!(result, Err(CoreError::SpaceNotFound(_))));
    }

    #[tokio::test]
    async fn test_set_monitoring_toggles_monitor() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(Arc::new(MemoryRegistry::new()));

        let space = manager.create_space("docs", dir.path()).await.unwrap();
        assert!(manager.is_monitoring(&space.id).await);

        manager.set_monitoring(&space.id, false).await.unwrap();
        assert!(!manager.is_monitoring(&space.id).await);

        manager.set_monitoring(&space.id, true).await.unwrap();
        assert!(manager.is_monitoring(&space.id).await);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_storage_policy_persists() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(MemoryRegistry::new());
        let manager = manager_with(registry.clone());

        let space = manager.create_space("docs", dir.path()).await.unwrap();
        let policy = StoragePolicy::max_age(Duration::from_secs(7 * 24 * 3600));
        manager
            .set_storage_policy(&space.id, policy.clone())
            .await
            .unwrap();

        assert_eq!(manager.storage_policy(&space.id).await.unwrap(), policy);
        let persisted = registry.load_spaces().await.unwrap();
        assert_eq!(persisted[0].storage_policy, policy);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_load_resumes_persisted_spaces() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(MemoryRegistry::new());

        {
            let manager = manager_with(registry.clone());
            manager.create_space("docs", dir.path()).await.unwrap();
            manager.shutdown().await;
        }

        let manager = manager_with(registry);
        let count = manager.load().await.unwrap();
        assert_eq!(count, 1);

        let spaces = manager.spaces().await;
        assert!(manager.is_monitoring(&spaces[0].id).await);

        manager.shutdown().await;
    }
}
