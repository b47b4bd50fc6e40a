use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};

// File system operations confined to the sync root; every path comes in relative
#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
}

impl FileSystem {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl FileSystem {
    /// Absolute path of a protocol-level relative path.
    ///
    /// Rejects empty paths, absolute paths and anything with `..`.
    pub fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let invalid = || SyncError::InvalidPath(relative_path.to_string());

        if relative_path.trim().is_empty() {
            return Err(invalid());
        }

        let mut resolved = self.root.clone();
        for part in relative_path.split(['/', '\\']) {
            if part.is_empty() || part == "." {
                continue;
            }
            match Path::new(part).components().next() {
                Some(Component::Normal(_)) => resolved.push(part),
                _ => return Err(invalid()),
            }
        }

        if resolved == self.root {
            return Err(invalid());
        }
        Ok(resolved)
    }

    /// Remove a file; a file that is already gone is not an error
    pub async fn remove_file(&self, relative_path: &str) -> Result<bool> {
        let path = self.resolve(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::from_io(path, e)),
        }
    }

    /// Create the directories leading to `path`, which must lie below the root
    pub async fn create_parent_directory(&self, path: &Path) -> Result<()> {
        if !path.starts_with(&self.root) {
            return Err(SyncError::InvalidPath(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}
