//! Space registry for keepsake.
//!
//! This crate owns the persisted [`Space`] record and the [`RegistryStore`]
//! trait the coordinator persists through. Two implementations are
//! provided:
//! - [`JsonRegistry`] - one `spaces.json` file, written atomically;
//!   a missing file loads as zero spaces
//! - [`MemoryRegistry`] - for tests
//!
//! Registry failures are never fatal to the engine: callers log them and
//! continue with the spaces held in memory.

mod error;
mod json;
mod memory;
mod space;

pub use error::{RegistryError, RegistryResult};
pub use json::JsonRegistry;
pub use memory::MemoryRegistry;
pub use space::{Space, SpaceId};

use async_trait::async_trait;

/// Persistence for the list of spaces.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load every persisted space. A missing registry is an empty list.
    async fn load_spaces(&self) -> RegistryResult<Vec<Space>>;

    /// Persist the full list of spaces, replacing the previous contents.
    async fn save_spaces(&self, spaces: &[Space]) -> RegistryResult<()>;
}
