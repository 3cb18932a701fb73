//! Core engine for keepsake.
//!
//! Keepsake continuously protects designated directory trees ("spaces"):
//! every change to a file under a space captures an immutable,
//! content-addressed version, and any prior state - one file or the whole
//! space - can be restored with all-or-nothing semantics. No server, no
//! cloud.
//!
//! This crate wires the pieces together:
//! - [`SpaceManager`] - space lifecycle and coordination
//! - [`EngineConfig`] - engine-wide settings
//! - [`SearchIndex`] - the fire-and-forget indexing collaborator
//!
//! # Example
//!
//! ```no_run
//! use keepsake_core::{EngineConfig, NullIndex, SpaceManager};
//! use keepsake_registry::JsonRegistry;
//! use keepsake_store::VersionStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), keepsake_core::CoreError> {
//! let registry = JsonRegistry::default_location().expect("data dir");
//! let manager = SpaceManager::new(
//!     Arc::new(VersionStore::new()),
//!     Arc::new(registry),
//!     Arc::new(NullIndex),
//!     EngineConfig::default(),
//! );
//!
//! manager.load().await?;
//! let space = manager.create_space("documents", Path::new("/home/me/docs")).await?;
//!
//! // Changed files under the space now get versions automatically;
//! // restore through manager.file_versions / manager.restore_file_version.
//! # let _ = space;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod index;
mod manager;

pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};
pub use index::{NullIndex, SearchIndex};
pub use manager::SpaceManager;

// The records and results a front end works with.
pub use keepsake_registry::{Space, SpaceId};
pub use keepsake_retention::{CleanupResult, DiskUsage, PolicyKind, PolicyStatus, StoragePolicy};
pub use keepsake_store::{FileVersion, FolderVersion, VersionId};
