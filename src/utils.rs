// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for stmtrag

use std::path::{Path, PathBuf};

/// The name of the index directory
pub const INDEX_DIR: &str = ".stmtrag";

/// Result of finding an index root
#[derive(Debug)]
pub struct IndexRoot {
    /// The directory containing the .stmtrag folder
    pub root: PathBuf,
    /// The full path to the .stmtrag folder
    pub index_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .stmtrag index directory by walking up from the given path.
/// Returns None if no .stmtrag directory is found.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<IndexRoot> {
    let mut current = start.as_ref().to_path_buf();

    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    let original = current.clone();

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(IndexRoot {
                root: current.clone(),
                index_path,
                is_parent: current != original,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Resolve the index directory to read from.
///
/// An explicit path wins. Otherwise the configured path is used as is when
/// absolute or when it exists; the default relative `.stmtrag` is looked up
/// in parent directories as well.
pub fn resolve_index_path(explicit: Option<&Path>, configured: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if configured.is_absolute() || configured.exists() || configured != Path::new(INDEX_DIR) {
        return configured.to_path_buf();
    }
    match find_index_root(".") {
        Some(root) => root.index_path,
        None => configured.to_path_buf(),
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", flat[..cut].trim_end()),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_index_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let result = find_index_root(dir.path()).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(!result.is_parent);
    }

    #[test]
    fn find_index_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let subdir = dir.path().join("statements");
        fs::create_dir(&subdir).unwrap();

        let result = find_index_root(&subdir).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(result.is_parent);
    }

    #[test]
    fn find_index_root_none() {
        let dir = TempDir::new().unwrap();
        assert!(find_index_root(dir.path()).is_none());
    }

    #[test]
    fn explicit_index_path_wins() {
        let path = resolve_index_path(Some(Path::new("/data/idx")), Path::new(INDEX_DIR));
        assert_eq!(path, PathBuf::from("/data/idx"));
    }

    #[test]
    fn custom_configured_path_is_kept() {
        let path = resolve_index_path(None, Path::new("indexes/current"));
        assert_eq!(path, PathBuf::from("indexes/current"));
    }

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("Opening\n  balance", 100), "Opening balance");
        assert_eq!(excerpt("Opening balance", 7), "Opening...");
        assert_eq!(excerpt("Überweisung", 4), "Über...");
    }
}
