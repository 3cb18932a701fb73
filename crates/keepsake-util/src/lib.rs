//! Shared utilities for keepsake.
//!
//! This crate provides common utilities used across the keepsake workspace:
//! - ULID-based identifier generation with prefixes
//! - SHA-256 digests for file content and path buckets
//! - Path utilities (control directory handling, space-root discovery)

pub mod digest;
pub mod id;
pub mod path;

pub use digest::{content_digest, path_digest};
pub use id::Identifier;
pub use path::CONTROL_DIR_NAME;
