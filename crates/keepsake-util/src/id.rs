//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in keepsake follow the pattern: `prefix_ulid`
//! For example: `ver_01HQXYZ...` for versions.
//!
//! ULIDs are monotonic within a millisecond and encode their creation time,
//! so ascending identifiers sort chronologically and are never reused.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Space,
    Version,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Space => "spc",
            IdPrefix::Version => "ver",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spc" => Some(IdPrefix::Space),
            "ver" => Some(IdPrefix::Version),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        let ulid = Ulid::new();
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Generate an identifier with a specific ULID (for testing or imports).
    pub fn with_ulid(prefix: IdPrefix, ulid: Ulid) -> String {
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let parts: Vec<&str> = id.splitn(2, '_').collect();
        if parts.len() != 2 {
            return None;
        }

        let prefix = IdPrefix::parse(parts[0])?;
        let ulid = Ulid::from_string(parts[1]).ok()?;
        Some((prefix, ulid))
    }

    /// Check if an identifier has the expected prefix.
    pub fn has_prefix(id: &str, prefix: IdPrefix) -> bool {
        id.starts_with(prefix.as_str()) && id.chars().nth(prefix.as_str().len()) == Some('_')
    }

    /// Generate a space ID.
    pub fn space() -> String {
        Self::ascending(IdPrefix::Space)
    }

    /// Generate a version ID (ascending for chronological order).
    pub fn version() -> String {
        Self::ascending(IdPrefix::Version)
    }
}
