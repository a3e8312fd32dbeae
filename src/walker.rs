use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::format::DocumentFormat;

/// A discovered document file.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the indexed root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    pub format: DocumentFormat,
}

/// Recursively walk a directory and discover eligible document files.
///
/// Skips hidden files/directories (names starting with `.`) and only
/// returns files whose extension maps to a [`DocumentFormat`]. The result
/// is sorted by relative path so repeated walks over an unchanged tree
/// yield the same order.
///
/// Only a failure to read `root` itself is an error; unreadable
/// subdirectories are logged and skipped.
pub fn discover_files(root: &Path) -> io::Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    if !canonical_root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut results = Vec::new();
    let entries = std::fs::read_dir(&canonical_root)?;
    walk_entries(&canonical_root, entries, &mut results);
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(root: &Path, current: &Path, results: &mut Vec<DiscoveredFile>) {
    match std::fs::read_dir(current) {
        Ok(entries) => walk_entries(root, entries, results),
        Err(e) => {
            warn!(path = %current.display(), error = %e, "skipping unreadable directory");
        }
    }
}

fn walk_entries(
    root: &Path,
    entries: std::fs::ReadDir,
    results: &mut Vec<DiscoveredFile>,
) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files and directories.
        if name.starts_with('.') {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(root, &path, results);
        } else if file_type.is_symlink() {
            // Skip broken symlinks.
            let Ok(resolved) = path.canonicalize() else {
                continue;
            };
            // Directory symlinks pointing back into the root would cycle.
            if resolved.starts_with(root) && resolved.is_dir() {
                continue;
            }
            if resolved.is_file()
                && let Some(format) = DocumentFormat::from_path(&resolved)
            {
                results.push(make_discovered(root, &path, resolved, format));
            }
        } else if file_type.is_file()
            && let Some(format) = DocumentFormat::from_path(&path)
        {
            let absolute = path.canonicalize().unwrap_or_else(|_| path.clone());
            results.push(make_discovered(root, &path, absolute, format));
        }
    }
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
    format: DocumentFormat,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path,
        format,
    }
}
