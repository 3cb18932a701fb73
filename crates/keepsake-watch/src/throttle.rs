//! Per-path throttling of version-worthy events.
//!
//! The throttle map bounds how often a single path may trigger a new
//! version: the first event for a path in a window is admitted, later ones
//! coalesce into the existing entry. Entries idle past an expiration window
//! are purged by periodic maintenance so a burst across many paths cannot
//! grow the map without bound.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Throttle state for one path.
#[derive(Debug, Clone)]
struct ThrottleEntry {
    /// When this path was first seen (window start).
    first_seen: Instant,
    /// Most recent raw event for this path.
    last_event: Instant,
    /// Whether any raw events were coalesced into this window.
    coalesced: bool,
}

/// Tracks the last admitted event per path.
#[derive(Debug)]
pub struct ThrottleMap {
    window: Duration,
    expiry: Duration,
    entries: HashMap<PathBuf, ThrottleEntry>,
}

impl ThrottleMap {
    /// Create a throttle map with the given admission window and entry
    /// expiration.
    pub fn new(window: Duration, expiry: Duration) -> Self {
        Self {
            window,
            expiry,
            entries: HashMap::new(),
        }
    }

    /// Decide whether an event for `path` at `now` should be admitted.
    ///
    /// Admits when the path has no entry or its window has elapsed; in both
    /// cases a fresh window starts at `now`. Otherwise the event coalesces:
    /// `last_event` is refreshed and the event is suppressed.
    pub fn should_emit(&mut self, path: &Path, now: Instant) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) if now.duration_since(entry.first_seen) < self.window => {
                entry.last_event = now;
                entry.coalesced = true;
                false
            }
            Some(entry) => {
                entry.first_seen = now;
                entry.last_event = now;
                entry.coalesced = false;
                true
            }
            None => {
                self.entries.insert(
                    path.to_path_buf(),
                    ThrottleEntry {
                        first_seen: now,
                        last_event: now,
                        coalesced: false,
                    },
                );
                true
            }
        }
    }

    /// Remove entries whose last event is older than the expiration window.
    ///
    /// Returns the number of entries purged.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let expiry = self.expiry;
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_event) <= expiry);
        before - self.entries.len()
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
