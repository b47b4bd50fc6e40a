use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Relative path (with `/` separators) -> absolute local path
pub type FileIndex = BTreeMap<String, PathBuf>;

/// Scan `root` recursively and index every regular file below it.
///
/// All-or-nothing: any unreadable directory fails the whole scan.
pub fn scan(root: &Path) -> Result<FileIndex> {
    let metadata = fs::metadata(root).map_err(|e| SyncError::Access {
        path: root.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_dir() {
        return Err(SyncError::Access {
            path: root.to_path_buf(),
            source: std::io::Error::other("not a directory"),
        });
    }

    let mut index = FileIndex::new();
    scan_directory_recursive(root, root, &mut index)?;
    Ok(index)
}

fn scan_directory_recursive(
    current_path: &Path,
    root: &Path,
    index: &mut FileIndex,
) -> Result<()> {
    let access_error = |source: std::io::Error| SyncError::Access {
        path: current_path.to_path_buf(),
        source,
    };
    let entries = fs::read_dir(current_path).map_err(access_error)?;

    for entry in entries {
        let entry = entry.map_err(access_error)?;
        let entry_path = entry.path();
        // Does not follow symlinks
        let file_type = entry.file_type().map_err(access_error)?;

        if file_type.is_dir() {
            scan_directory_recursive(&entry_path, root, index)?;
        } else if file_type.is_file() {
            let relative_path = relative_path(root, &entry_path)?;
            index.insert(relative_path, entry_path);
        }
    }

    Ok(())
}

/// Relative path of `path` below `root`, joined with `/`
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        SyncError::InvalidPath(format!(
            "{} is not below {}",
            path.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();
    Ok(parts.join("/"))
}
