//! Version record types.

use chrono::{DateTime, Utc};
use keepsake_util::Identifier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a version.
///
/// ULID-backed and ascending: ids sort chronologically and are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    /// Create a new version ID.
    pub fn new() -> Self {
        Self(Identifier::version())
    }

    /// Create a version ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable version of a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    /// Unique identifier for this version.
    pub id: VersionId,

    /// Absolute path of the versioned file.
    pub file_path: PathBuf,

    /// When the version was captured.
    pub timestamp: DateTime<Utc>,

    /// Size of the captured bytes.
    #[serde(rename = "size")]
    pub size_bytes: u64,

    /// Optional comment.
    #[serde(default)]
    pub comment: Option<String>,

    /// SHA-256 of the captured bytes, hex-encoded.
    pub content_hash: String,

    /// Where the captured bytes live inside the control directory.
    pub storage_path: PathBuf,
}

/// An immutable whole-folder version: a copy of every tracked file at one
/// instant, the unit of whole-space checkpoint and restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderVersion {
    /// Unique identifier for this version.
    pub id: VersionId,

    /// Absolute path of the versioned folder.
    pub folder_path: PathBuf,

    /// When the version was captured.
    pub timestamp: DateTime<Utc>,

    /// Optional comment.
    #[serde(default)]
    pub comment: Option<String>,

    /// Directory holding the captured tree inside the control directory.
    pub storage_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_id_prefix() {
        let id = VersionId::new();
        assert!(id.as_str().starts_with("ver_"));
    }

    #[test]
    fn test_version_ids_ascend() {
        let a = VersionId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = VersionId::new();
        assert!(a < b);
    }

    #[test]
    fn test_file_version_metadata_round_trip() {
        let version = FileVersion {
            id: VersionId::from_string("ver_test"),
            file_path: PathBuf::from("/space/a.txt"),
            timestamp: Utc::now(),
            size_bytes: 5,
            comment: Some("saved".to_string()),
            content_hash: "abc".to_string(),
            storage_path: PathBuf::from("/space/.control/file_versions/x/ver_test.data"),
        };

        let json = serde_json::to_string(&version).unwrap();
        assert!(json.contains("\"size\":5"));
        let back: FileVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, version.id);
        assert_eq!(back.size_bytes, 5);
        assert_eq!(back.comment.as_deref(), Some("saved"));
    }
}
