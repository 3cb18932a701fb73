//! On-disk layout of a space's control directory.
//!
//! ```text
//! <space>/.control/
//!   file_versions/<sha256(file_path)>/<version_id>.data
//!   file_metadata/<sha256(file_path)>/<version_id>.json
//!   versions/<version_id>/...          # folder snapshot trees
//!   metadata/<version_id>.json         # folder snapshot records
//!   tmp/                               # restore staging, discarded on commit
//! ```

use crate::version::VersionId;
use keepsake_util::{path_digest, CONTROL_DIR_NAME};
use std::path::{Path, PathBuf};

/// Resolves paths inside one space's control directory.
#[derive(Debug, Clone)]
pub struct SpaceLayout {
    root: PathBuf,
}

impl SpaceLayout {
    /// Layout for a space rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The space root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The control directory itself.
    pub fn control_dir(&self) -> PathBuf {
        self.root.join(CONTROL_DIR_NAME)
    }

    /// Whether the control layout exists on disk.
    pub fn is_initialized(&self) -> bool {
        self.control_dir().is_dir()
    }

    /// Bucketed storage for file version bytes.
    pub fn file_versions_dir(&self) -> PathBuf {
        self.control_dir().join("file_versions")
    }

    /// Bucketed storage for file version records.
    pub fn file_metadata_dir(&self) -> PathBuf {
        self.control_dir().join("file_metadata")
    }

    /// Folder snapshot trees.
    pub fn folder_versions_dir(&self) -> PathBuf {
        self.control_dir().join("versions")
    }

    /// Folder snapshot records.
    pub fn folder_metadata_dir(&self) -> PathBuf {
        self.control_dir().join("metadata")
    }

    /// Staging area for restores; always on the same filesystem as the
    /// targets so backups are plain copies.
    pub fn staging_dir(&self) -> PathBuf {
        self.control_dir().join("tmp")
    }

    /// Every directory the control layout needs.
    pub fn all_dirs(&self) -> [PathBuf; 6] {
        [
            self.control_dir(),
            self.file_versions_dir(),
            self.file_metadata_dir(),
            self.folder_versions_dir(),
            self.folder_metadata_dir(),
            self.staging_dir(),
        ]
    }

    /// Bucket directory for one file's version bytes.
    pub fn file_bucket_data_dir(&self, file_path: &Path) -> PathBuf {
        self.file_versions_dir().join(path_digest(file_path))
    }

    /// Bucket directory for one file's version records.
    pub fn file_bucket_meta_dir(&self, file_path: &Path) -> PathBuf {
        self.file_metadata_dir().join(path_digest(file_path))
    }

    /// Data file for one file version.
    pub fn file_data_path(&self, file_path: &Path, id: &VersionId) -> PathBuf {
        self.file_bucket_data_dir(file_path)
            .join(format!("{}.data", id))
    }

    /// Record file for one file version.
    pub fn file_meta_path(&self, file_path: &Path, id: &VersionId) -> PathBuf {
        self.file_bucket_meta_dir(file_path)
            .join(format!("{}.json", id))
    }

    /// Snapshot tree for one folder version.
    pub fn folder_data_path(&self, id: &VersionId) -> PathBuf {
        self.folder_versions_dir().join(id.as_str())
    }

    /// Record file for one folder version.
    pub fn folder_meta_path(&self, id: &VersionId) -> PathBuf {
        self.folder_metadata_dir().join(format!("{}.json", id))
    }
}
