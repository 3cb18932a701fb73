//! JSON file-backed registry.
//!
//! The whole registry is one `spaces.json` file, written atomically
//! (temp file, then rename). A missing file means zero spaces.

use crate::error::{RegistryError, RegistryResult};
use crate::space::Space;
use crate::RegistryStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the registry inside its directory.
const REGISTRY_FILE: &str = "spaces.json";

/// JSON file-backed space registry.
#[derive(Debug, Clone)]
pub struct JsonRegistry {
    path: PathBuf,
}

impl JsonRegistry {
    /// A registry stored under the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(REGISTRY_FILE),
        }
    }

    /// A registry at the platform default data directory.
    pub fn default_location() -> Option<Self> {
        keepsake_util::path::data_dir().map(Self::new)
    }

    /// Where the registry file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegistryStore for JsonRegistry {
    async fn load_spaces(&self) -> RegistryResult<Vec<Space>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let spaces: Vec<Space> = serde_json::from_str(&content)?;
                debug!(path = %self.path.display(), count = spaces.len(), "registry loaded");
                Ok(spaces)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(RegistryError::Io(err)),
        }
    }

    async fn save_spaces(&self, spaces: &[Space]) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(spaces)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &content).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = spaces.len(), "registry saved");
        Ok(())
    }
}
