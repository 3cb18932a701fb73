//! The persisted space record.

use chrono::{DateTime, Utc};
use keepsake_retention::StoragePolicy;
use keepsake_util::Identifier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unique identifier for a space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub String);

impl SpaceId {
    /// Create a new space ID.
    pub fn new() -> Self {
        Self(Identifier::space())
    }

    /// Create a space ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SpaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SpaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directory tree under continuous version protection.
///
/// A space owns exactly one hidden control directory under its root; the
/// record itself lives in the registry file, never inside the space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    /// Unique identifier.
    pub id: SpaceId,

    /// Display name.
    pub name: String,

    /// Root of the protected tree.
    pub root_path: PathBuf,

    /// Whether changes under the root currently trigger versions.
    pub monitoring_enabled: bool,

    /// When the space was created.
    pub created_at: DateTime<Utc>,

    /// The retention rule for this space's version storage.
    #[serde(default)]
    pub storage_policy: StoragePolicy,
}

impl Space {
    /// Create a new space record with monitoring enabled and the default
    /// storage policy.
    pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            id: SpaceId::new(),
            name: name.into(),
            root_path: root_path.into(),
            monitoring_enabled: true,
            created_at: Utc::now(),
            storage_policy: StoragePolicy::default(),
        }
    }

    /// Whether a path falls inside this space.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root_path)
    }
}
