//! Cleanup passes and the per-space retention timer.

use crate::error::{RetentionError, RetentionResult};
use crate::policy::{evaluate_policy, PolicyKind, PolicyStatus, StoragePolicy};
use crate::usage::{compute_usage, DiskUsage};
use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use keepsake_store::{FileVersion, FolderVersion, VersionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One version the cleanup pass could not delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupFailure {
    /// The version that was left in place.
    pub version_id: String,
    /// Its storage location.
    pub path: PathBuf,
    /// Why deletion failed.
    pub reason: String,
}

/// Outcome of a cleanup pass.
///
/// Partial failure, not all-or-nothing: undeletable versions are recorded
/// in `errors` and left in place while the pass continues, so
/// `removed_versions` and `freed_bytes` reflect everything that succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupResult {
    /// Versions removed.
    pub removed_versions: usize,
    /// Bytes reclaimed.
    pub freed_bytes: u64,
    /// Versions that could not be removed.
    pub errors: Vec<CleanupFailure>,
}

impl CleanupResult {
    /// Whether every eligible version was removed.
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        if self.is_successful() {
            format!(
                "removed {} versions, freed {}",
                self.removed_versions,
                ByteSize(self.freed_bytes)
            )
        } else {
            format!(
                "partial cleanup: {} versions removed, {} errors",
                self.removed_versions,
                self.errors.len()
            )
        }
    }
}

/// What a policy enforcement pass did.
#[derive(Debug, Clone)]
pub enum EnforcementOutcome {
    /// Within limits, nothing to do.
    Compliant,
    /// The policy did not apply.
    Skipped { reason: String },
    /// Approaching the limit; logged, nothing deleted.
    Warned { usage_ratio: f64 },
    /// Versions were reclaimed.
    Cleaned(CleanupResult),
}

/// The retention engine: usage scans, policy enforcement, and per-space
/// cleanup timers. Scans only committed records, so it can run while
/// creations are in flight.
pub struct RetentionEngine {
    store: Arc<VersionStore>,
    timers: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
}

impl RetentionEngine {
    /// Create a retention engine over a version store.
    pub fn new(store: Arc<VersionStore>) -> Self {
        Self {
            store,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Compute the usage snapshot for a space.
    pub async fn usage(&self, space_root: &Path) -> RetentionResult<DiskUsage> {
        compute_usage(&self.store, space_root).await
    }

    /// Delete every version older than `age`.
    ///
    /// Deletion failures accumulate into the result's `errors` without
    /// aborting the pass; a version's record and bytes go together.
    pub async fn cleanup_older_than(
        &self,
        age: Duration,
        space_root: &Path,
    ) -> RetentionResult<CleanupResult> {
        if !self.store.is_initialized(space_root) {
            return Err(RetentionError::SpaceNotInitialized(
                space_root.to_path_buf(),
            ));
        }
        let cutoff = cutoff_from(age)?;
        info!(
            space = %space_root.display(),
            %cutoff,
            "starting cleanup of versions past the age limit"
        );

        let mut result = CleanupResult::default();
        for version in self.store.all_file_versions(space_root).await? {
            if version.timestamp < cutoff {
                self.delete_file(space_root, &version, &mut result).await;
            }
        }
        for version in self.store.folder_versions(space_root).await? {
            if version.timestamp < cutoff {
                self.delete_folder(space_root, &version, &mut result).await;
            }
        }

        info!(space = %space_root.display(), "{}", result.summary());
        Ok(result)
    }

    /// Evaluate `policy` against current usage and reclaim if exceeded.
    ///
    /// Size policies delete oldest-first until the space is back under its
    /// limit; age policies delegate to [`Self::cleanup_older_than`].
    pub async fn enforce_policy(
        &self,
        policy: &StoragePolicy,
        space_root: &Path,
    ) -> RetentionResult<EnforcementOutcome> {
        let usage = self.usage(space_root).await?;
        match evaluate_policy(policy, &usage, Utc::now()) {
            PolicyStatus::Compliant => Ok(EnforcementOutcome::Compliant),
            PolicyStatus::Skipped { reason } => {
                debug!(space = %space_root.display(), reason, "policy skipped");
                Ok(EnforcementOutcome::Skipped { reason })
            }
            PolicyStatus::Warning { usage_ratio } => {
                warn!(
                    space = %space_root.display(),
                    usage_ratio,
                    "version storage approaching its limit"
                );
                Ok(EnforcementOutcome::Warned { usage_ratio })
            }
            PolicyStatus::Exceeded { over_bytes } => {
                let result = match policy.kind {
                    PolicyKind::MaxVersionAge { max_age } => {
                        self.cleanup_older_than(max_age, space_root).await?
                    }
                    PolicyKind::MaxTotalSize { bytes } => {
                        debug!(
                            space = %space_root.display(),
                            over = %ByteSize(over_bytes),
                            "size limit exceeded, reclaiming oldest versions"
                        );
                        self.shrink_to_limit(bytes, usage.control_dir_size, space_root)
                            .await?
                    }
                };
                Ok(EnforcementOutcome::Cleaned(result))
            }
        }
    }

    /// Delete oldest versions until version storage fits under `limit`.
    async fn shrink_to_limit(
        &self,
        limit: u64,
        current: u64,
        space_root: &Path,
    ) -> RetentionResult<CleanupResult> {
        enum Victim {
            File(FileVersion),
            Folder(FolderVersion),
        }

        let mut victims: Vec<(DateTime<Utc>, Victim)> = Vec::new();
        for version in self.store.all_file_versions(space_root).await? {
            victims.push((version.timestamp, Victim::File(version)));
        }
        for version in self.store.folder_versions(space_root).await? {
            victims.push((version.timestamp, Victim::Folder(version)));
        }
        victims.sort_by_key(|(timestamp, _)| *timestamp);

        let mut result = CleanupResult::default();
        let mut used = current;
        for (_, victim) in victims {
            if used <= limit {
                break;
            }
            let freed_before = result.freed_bytes;
            match victim {
                Victim::File(version) => {
                    self.delete_file(space_root, &version, &mut result).await;
                }
                Victim::Folder(version) => {
                    self.delete_folder(space_root, &version, &mut result).await;
                }
            }
            used = used.saturating_sub(result.freed_bytes - freed_before);
        }

        info!(space = %space_root.display(), "{}", result.summary());
        Ok(result)
    }

    async fn delete_file(&self, space_root: &Path, version: &FileVersion, result: &mut CleanupResult) {
        match self.store.delete_file_version(space_root, version).await {
            Ok(freed) => {
                result.removed_versions += 1;
                result.freed_bytes += freed;
            }
            Err(err) => {
                warn!(id = %version.id, error = %err, "could not delete file version");
                result.errors.push(CleanupFailure {
                    version_id: version.id.to_string(),
                    path: version.storage_path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    async fn delete_folder(
        &self,
        space_root: &Path,
        version: &FolderVersion,
        result: &mut CleanupResult,
    ) {
        match self.store.delete_folder_version(space_root, version).await {
            Ok(freed) => {
                result.removed_versions += 1;
                result.freed_bytes += freed;
            }
            Err(err) => {
                warn!(id = %version.id, error = %err, "could not delete folder version");
                result.errors.push(CleanupFailure {
                    version_id: version.id.to_string(),
                    path: version.storage_path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Start the per-space enforcement timer. Idempotent: a second start
    /// for the same space is a no-op and returns `false`.
    pub fn start_timer(
        self: &Arc<Self>,
        space_root: PathBuf,
        policy: StoragePolicy,
        interval: Duration,
    ) -> bool {
        let mut timers = lock(&self.timers);
        if timers.contains_key(&space_root) {
            return false;
        }

        let engine = Arc::clone(self);
        let root = space_root.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick; enforcement runs on the period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match engine.enforce_policy(&policy, &root).await {
                    Ok(EnforcementOutcome::Cleaned(result)) => {
                        info!(space = %root.display(), "retention pass: {}", result.summary());
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(space = %root.display(), error = %err, "retention pass failed");
                    }
                }
            }
        });
        timers.insert(space_root, handle);
        true
    }

    /// Stop the enforcement timer for a space. Returns `false` if none ran.
    pub fn stop_timer(&self, space_root: &Path) -> bool {
        let mut timers = lock(&self.timers);
        match timers.remove(space_root) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop every enforcement timer.
    pub fn stop_all(&self) {
        let mut timers = lock(&self.timers);
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for RetentionEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn cutoff_from(age: Duration) -> RetentionResult<DateTime<Utc>> {
    let age = chrono::Duration::from_std(age)
        .map_err(|err| RetentionError::ScanFailed(err.to_string()))?;
    Ok(Utc::now() - age)
}
