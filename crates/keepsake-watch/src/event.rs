//! Typed change events and defensive decoding of native payloads.

use notify::event::ModifyKind;
use notify::EventKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The kind of change observed for a path.
///
/// Native payloads are decoded exhaustively; anything unrecognized maps to
/// [`ChangeKind::Unknown`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A file was created.
    Created,
    /// A file's contents or metadata changed.
    Modified,
    /// A file was deleted.
    Deleted,
    /// A file was renamed.
    Renamed,
    /// An event the decoder could not classify.
    Unknown,
}

impl ChangeKind {
    /// Whether this kind of change should trigger a new version.
    pub fn is_version_worthy(&self) -> bool {
        matches!(self, ChangeKind::Created | ChangeKind::Modified)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A single decoded change for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The affected path.
    pub path: PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
}

/// Decode a native event kind into a [`ChangeKind`].
///
/// Returns `None` for access notifications, which are not changes at all
/// and would otherwise flood subscribers. Everything else decodes to a
/// concrete kind, with `Unknown` as the catch-all.
pub fn decode_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(ChangeKind::Unknown),
    }
}
