//! Path utilities.
//!
//! Helpers for the per-space control directory, transient-file detection,
//! and space-root discovery.

use std::path::{Path, PathBuf};

/// Name of the hidden per-space directory holding all version data.
pub const CONTROL_DIR_NAME: &str = ".control";

/// Get the keepsake data directory.
///
/// This follows XDG conventions:
/// - `$XDG_DATA_HOME/keepsake` if set
/// - `~/.local/share/keepsake` otherwise
///
/// The space registry file lives here by default.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("keepsake"))
}

/// Get the control directory for a space root.
pub fn control_dir(space_root: &Path) -> PathBuf {
    space_root.join(CONTROL_DIR_NAME)
}

/// Check whether a path has the control directory as any component.
///
/// Events under the control directory must never reach subscribers or be
/// versioned themselves.
pub fn in_control_dir(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == CONTROL_DIR_NAME)
}

/// Check whether a file name denotes a transient or hidden file that should
/// not be versioned: dot-files, editor droppings (`~`, `~$` prefixes),
/// `*.tmp`/`*.temp`, and well-known system litter.
pub fn is_transient_name(name: &str) -> bool {
    if name.starts_with('.') || name.starts_with('~') {
        return true;
    }
    if name.ends_with(".tmp") || name.ends_with(".temp") {
        return true;
    }
    matches!(name, "Thumbs.db" | "desktop.ini")
}

/// Find the space root for a path by walking up until a directory containing
/// the control directory is found.
///
/// Returns `None` if the path is not inside any initialized space.
pub fn find_space_root(path: &Path) -> Option<PathBuf> {
    let mut current = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    loop {
        if control_dir(&current).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Check if a path is within a base directory.
pub fn is_within(path: &Path, base: &Path) -> bool {
    let canonical_path = path.canonicalize().ok();
    let canonical_base = base.canonicalize().ok();

    match (canonical_path, canonical_base) {
        (Some(p), Some(b)) => p.starts_with(&b),
        // If we can't canonicalize, fall back to a plain prefix check
        _ => path.starts_with(base),
    }
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                result.pop();
            }
            std::path::Component::CurDir => {}
            _ => {
                result.push(component);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_control_dir() {
        let dir = control_dir(Path::new("/space"));
        assert_eq!(dir, PathBuf::from("/space/.control"));
    }

    #[test]
    fn test_in_control_dir() {
        assert!(in_control_dir(Path::new("/space/.control/file_versions/x")));
        assert!(!in_control_dir(Path::new("/space/docs/report.txt")));
    }

    #[test]
    fn test_is_transient_name() {
        assert!(is_transient_name(".DS_Store"));
        assert!(is_transient_name("~$budget.xlsx"));
        assert!(is_transient_name("scratch.tmp"));
        assert!(is_transient_name("Thumbs.db"));
        assert!(!is_transient_name("report.txt"));
    }

    #[test]
    fn test_find_space_root() {
        let dir = tempdir().unwrap();
        let space = dir.path().join("space");
        let nested = space.join("docs/deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(space.join(CONTROL_DIR_NAME)).unwrap();

        let found = find_space_root(&nested.join("file.txt"));
        assert_eq!(found, Some(space.clone()));

        let found = find_space_root(&nested);
        assert_eq!(found, Some(space));
    }

    #[test]
    fn test_find_space_root_none() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(find_space_root(&file), None);
    }

    #[test]
    fn test_is_within() {
        let base = PathBuf::from("/home/user/project");
        assert!(is_within(Path::new("/home/user/project/src"), &base));
        assert!(!is_within(Path::new("/home/user/other"), &base));
    }

    #[test]
    fn test_normalize() {
        let path = Path::new("/space/./docs/../docs/report.txt");
        assert_eq!(normalize(path), PathBuf::from("/space/docs/report.txt"));
    }
}
