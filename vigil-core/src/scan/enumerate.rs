use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Regular files below `root`, recursively. Symlinks are not followed and
/// are not reported; unreadable entries are logged and skipped.
pub fn enumerate_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!(path = %path, error = %err, "skipping unreadable entry");
            }
        }
    }
    files
}

/// [`enumerate_files`] for every root, in order.
pub fn enumerate_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots.iter().flat_map(|root| enumerate_files(root)).collect()
}
