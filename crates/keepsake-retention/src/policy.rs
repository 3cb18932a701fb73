//! Storage policies and their evaluation.

use crate::usage::DiskUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a policy limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyKind {
    /// Cap the total bytes of version storage for a space.
    MaxTotalSize { bytes: u64 },
    /// Cap the age of retained versions.
    MaxVersionAge { max_age: Duration },
}

/// A per-space retention rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoragePolicy {
    /// The limit this policy enforces.
    pub kind: PolicyKind,

    /// Disabled policies evaluate to `Skipped` and never delete anything.
    pub enabled: bool,

    /// Fraction of the limit at which evaluation starts warning, in (0, 1).
    pub warning_threshold: f64,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            kind: PolicyKind::MaxTotalSize {
                bytes: 10 * 1024 * 1024 * 1024,
            },
            enabled: true,
            warning_threshold: 0.8,
        }
    }
}

impl StoragePolicy {
    /// A max-age policy with default threshold.
    pub fn max_age(max_age: Duration) -> Self {
        Self {
            kind: PolicyKind::MaxVersionAge { max_age },
            ..Self::default()
        }
    }

    /// A max-size policy with default threshold.
    pub fn max_size(bytes: u64) -> Self {
        Self {
            kind: PolicyKind::MaxTotalSize { bytes },
            ..Self::default()
        }
    }
}

/// Outcome of evaluating a policy against a usage snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyStatus {
    /// Within limits.
    Compliant,
    /// Approaching the limit (past the warning threshold).
    Warning { usage_ratio: f64 },
    /// The policy did not apply.
    Skipped { reason: String },
    /// Over the limit; cleanup is warranted.
    Exceeded { over_bytes: u64 },
}

/// Evaluate a policy against a usage snapshot at a given instant.
///
/// Pure: no filesystem access, no clock reads. For age policies
/// `over_bytes` is reported as zero - the reclaimable byte count is only
/// known to the cleanup pass that walks the records.
pub fn evaluate_policy(
    policy: &StoragePolicy,
    usage: &DiskUsage,
    now: DateTime<Utc>,
) -> PolicyStatus {
    if !policy.enabled {
        return PolicyStatus::Skipped {
            reason: "policy disabled".to_string(),
        };
    }

    match policy.kind {
        PolicyKind::MaxTotalSize { bytes } => {
            if bytes == 0 {
                return PolicyStatus::Skipped {
                    reason: "size limit is zero".to_string(),
                };
            }
            let used = usage.control_dir_size;
            if used > bytes {
                PolicyStatus::Exceeded {
                    over_bytes: used - bytes,
                }
            } else {
                let usage_ratio = used as f64 / bytes as f64;
                if usage_ratio >= policy.warning_threshold {
                    PolicyStatus::Warning { usage_ratio }
                } else {
                    PolicyStatus::Compliant
                }
            }
        }
        PolicyKind::MaxVersionAge { max_age } => {
            let Some(oldest) = usage.oldest_version else {
                return PolicyStatus::Compliant;
            };
            let Ok(limit) = chrono::Duration::from_std(max_age) else {
                return PolicyStatus::Skipped {
                    reason: "age limit out of range".to_string(),
                };
            };
            let age = now.signed_duration_since(oldest);
            if age > limit {
                PolicyStatus::Exceeded { over_bytes: 0 }
            } else {
                let usage_ratio = age.num_milliseconds() as f64 / limit.num_milliseconds() as f64;
                if usage_ratio >= policy.warning_threshold {
                    PolicyStatus::Warning { usage_ratio }
                } else {
                    PolicyStatus::Compliant
                }
            }
        }
    }
}
