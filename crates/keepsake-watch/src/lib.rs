//! Change notification pipeline for keepsake.
//!
//! This crate converts bursty, possibly-duplicated raw filesystem
//! notifications into a clean, throttled stream of typed change events,
//! one bounded channel per watched space:
//! - Defensive decoding of native events into
//!   `{created, modified, deleted, renamed, unknown}`
//! - Filtering of control-directory and transient-file noise
//! - Per-path throttling so rapid repeated writes coalesce into at most
//!   one version-worthy event per window
//! - A polling fallback when the native watch mechanism is unavailable
//!
//! # Example
//!
//! ```no_run
//! use keepsake_watch::{ChangePipeline, WatchConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), keepsake_watch::WatchError> {
//! let mut pipeline = ChangePipeline::new(PathBuf::from("/space"), WatchConfig::default());
//! let mut events = pipeline.start()?.expect("fresh start yields the receiver");
//!
//! while let Some(event) = events.recv().await {
//!     println!("{} {}", event.kind, event.path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod event;
mod pipeline;
mod throttle;

pub use error::{WatchError, WatchResult};
pub use event::{decode_kind, ChangeEvent, ChangeKind};
pub use pipeline::{ChangePipeline, WatchBudget, WatchConfig};
pub use throttle::ThrottleMap;
