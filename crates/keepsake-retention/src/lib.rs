//! Retention engine for keepsake.
//!
//! This crate decides what version storage a space may keep and reclaims
//! the rest:
//! - Usage snapshots split between the user's files and the control
//!   directory
//! - Pure policy evaluation (`Compliant` / `Warning` / `Skipped` /
//!   `Exceeded`)
//! - Age- and size-based cleanup with structured partial-failure results
//! - A per-space enforcement timer, independent of the pipeline's
//!   maintenance timer
//!
//! Scans only see committed records, so retention can run while creations
//! are in flight.

mod engine;
mod error;
mod policy;
mod usage;

pub use engine::{CleanupFailure, CleanupResult, EnforcementOutcome, RetentionEngine};
pub use error::{RetentionError, RetentionResult};
pub use policy::{evaluate_policy, PolicyKind, PolicyStatus, StoragePolicy};
pub use usage::{compute_usage, DiskUsage};
