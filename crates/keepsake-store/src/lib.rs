//! Content-addressed version store for keepsake.
//!
//! This crate stores immutable versions of files and whole folders under a
//! per-space control directory and restores them with all-or-nothing
//! semantics:
//! - Bytes are committed before metadata, so a record and its storage
//!   never exist independently
//! - Listings are newest-first and tolerate corrupt records
//! - Restores validate storage and content hashes up front, stage a backup,
//!   and roll back on failure - the filesystem ends exactly as it started
//!
//! # Example
//!
//! ```no_run
//! use keepsake_store::VersionStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), keepsake_store::StoreError> {
//! let store = VersionStore::new();
//! store.initialize_space(Path::new("/space")).await?;
//!
//! let version = store
//!     .create_file_version(Path::new("/space/notes.txt"), None)
//!     .await?;
//!
//! // ... the file changes ...
//!
//! store
//!     .restore_file_version(Path::new("/space/notes.txt"), &version)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod layout;
mod store;
mod version;

pub use error::{StoreError, StoreResult};
pub use layout::SpaceLayout;
pub use store::VersionStore;
pub use version::{FileVersion, FolderVersion, VersionId};
