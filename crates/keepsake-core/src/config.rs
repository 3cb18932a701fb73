//! Engine configuration.
//!
//! One flat JSON file covering the pipeline, retention cadence and the
//! registry location. Every field has a default, so a missing or partial
//! config is fine.

use crate::error::CoreResult;
use keepsake_watch::WatchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Change pipeline settings (throttle window, polling fallback,
    /// channel capacity, native watch budget).
    pub watch: WatchConfig,

    /// How often each space's retention policy is enforced.
    pub retention_interval: Duration,

    /// Where the space registry lives. `None` means the platform data
    /// directory.
    pub registry_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            retention_interval: Duration::from_secs(3600),
            registry_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub async fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or unreadable.
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "using default configuration");
                Self::default()
            }
        }
    }
}
