//! SHA-256 digests for version content and path buckets.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Compute the SHA-256 digest of a byte buffer, hex-encoded.
///
/// This is the content hash recorded in version metadata and re-checked
/// before a restore overwrites anything.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute a stable digest of an absolute file path, hex-encoded.
///
/// Used as the bucket directory name under which all versions of one file
/// live, so listing the versions of a path is a single directory read.
pub fn path_digest(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_content_digest_known_value() {
        // sha256("hello") - a fixed vector so the on-disk format stays stable
        assert_eq!(
            content_digest(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_content_digest_differs() {
        assert_ne!(content_digest(b"a"), content_digest(b"b"));
    }

    #[test]
    fn test_path_digest_stable() {
        let path = PathBuf::from("/space/docs/report.txt");
        assert_eq!(path_digest(&path), path_digest(&path));
        assert_eq!(path_digest(&path).len(), 64);
    }

    #[test]
    fn test_path_digest_distinguishes_paths() {
        assert_ne!(
            path_digest(Path::new("/space/a.txt")),
            path_digest(Path::new("/space/b.txt"))
        );
    }
}
