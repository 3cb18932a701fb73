//! In-memory registry for tests.

use crate::error::RegistryResult;
use crate::space::Space;
use crate::RegistryStore;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-memory space registry. Nothing is persisted; intended for tests.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    spaces: RwLock<Vec<Space>>,
}

impl MemoryRegistry {
    /// Create an empty in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn load_spaces(&self) -> RegistryResult<Vec<Space>> {
        Ok(self.spaces.read().await.clone())
    }

    async fn save_spaces(&self, spaces: &[Space]) -> RegistryResult<()> {
        *self.spaces.write().await = spaces.to_vec();
        Ok(())
    }
}
