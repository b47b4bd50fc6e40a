use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Result, SyncError};
use crate::sync::{FileIndex, HashIndex, build_from_index, calculate_file_hash, scan, ABSENT};

/// An immutable view of one directory: its file index and the matching hashes
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub root: PathBuf,
    pub files: FileIndex,
    pub hashes: HashIndex,
}

impl Snapshot {
    /// Scan and hash `root` from scratch
    pub fn build(root: &Path, generation: u64) -> Result<Self> {
        let files = scan(root)?;
        let hashes = build_from_index(&files);
        Ok(Self {
            generation,
            root: root.to_path_buf(),
            files,
            hashes,
        })
    }

    /// Same as `build`, on the blocking pool
    pub async fn build_async(root: PathBuf, generation: u64) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::build(&root, generation))
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(e)))?
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.files.contains_key(relative_path)
    }

    /// Newline-joined relative paths, as sent for `!getFileList`
    pub fn file_list(&self) -> String {
        self.files.keys().cloned().collect::<Vec<_>>().join("\n")
    }

    pub fn hash(&self, relative_path: &str) -> Option<&str> {
        self.hashes.get(relative_path).map(String::as_str)
    }
}

/// Holder of the current snapshot.
///
/// Readers clone the `Arc` and keep a consistent generation for as long as
/// they need it; a rebuild swaps in a whole new snapshot.
pub struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
    /// Paths written or removed since the last swap; their cached hashes are stale
    touched: Mutex<HashSet<String>>,
}

impl SnapshotCell {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            touched: Mutex::new(HashSet::new()),
        }
    }

    pub fn load(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot and forget the touched paths
    pub fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        {
            let mut current = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *current = Arc::clone(&snapshot);
        }
        self.touched_set().clear();
        snapshot
    }

    /// Rescan the root of the current snapshot and swap the result in
    pub async fn rebuild(&self) -> Result<Arc<Snapshot>> {
        let current = self.load();
        let next = Snapshot::build_async(current.root.clone(), current.generation + 1).await?;
        Ok(self.swap(next))
    }

    pub fn mark_touched(&self, relative_path: &str) {
        self.touched_set().insert(relative_path.to_string());
    }

    /// Current digest of `relative_path`, or the absent marker.
    ///
    /// The cached hash is only used for indexed files untouched this session.
    pub fn current_hash(&self, relative_path: &str, absolute_path: &Path) -> Result<String> {
        if !absolute_path.is_file() {
            return Ok(ABSENT.to_string());
        }

        let snapshot = self.load();
        let touched = self.touched_set().contains(relative_path);
        if !touched {
            if let Some(hash) = snapshot.hash(relative_path) {
                return Ok(hash.to_string());
            }
        }

        match calculate_file_hash(absolute_path) {
            Ok(hash) => Ok(hash),
            Err(SyncError::NotFound(_)) => Ok(ABSENT.to_string()),
            Err(e) => Err(e),
        }
    }

    fn touched_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.touched.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_list_is_newline_joined_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/two.txt"), "2").unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();

        let snapshot = Snapshot::build(dir.path(), 0).unwrap();
        assert_eq!(snapshot.file_list(), "a.txt\nb/two.txt");
        assert!(snapshot.contains("b/two.txt"));
        assert!(!snapshot.contains("b"));
    }

    #[test]
    fn swap_bumps_generation_and_keeps_old_readers_consistent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        let cell = SnapshotCell::new(Snapshot::build(dir.path(), 0).unwrap());

        let before = cell.load();
        fs::write(dir.path().join("b.txt"), "2").unwrap();
        cell.swap(Snapshot::build(dir.path(), before.generation + 1).unwrap());
        let after = cell.load();

        assert_eq!(before.files.len(), 1);
        assert_eq!(after.files.len(), 2);
        assert_eq!(after.generation, 1);
    }

    #[test]
    fn touched_paths_bypass_the_cached_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "old").unwrap();
        let cell = SnapshotCell::new(Snapshot::build(dir.path(), 0).unwrap());
        let cached = cell.current_hash("a.txt", &path).unwrap();

        fs::remove_file(&path).unwrap();
        assert_eq!(cell.current_hash("a.txt", &path).unwrap(), ABSENT);

        fs::write(&path, "new").unwrap();
        cell.mark_touched("a.txt");
        let fresh = cell.current_hash("a.txt", &path).unwrap();
        assert_ne!(fresh, cached);

        cell.swap(Snapshot::build(dir.path(), 1).unwrap());
        assert_eq!(cell.current_hash("a.txt", &path).unwrap(), fresh);
    }

    #[test]
    fn unindexed_files_are_hashed_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let cell = SnapshotCell::new(Snapshot::build(dir.path(), 0).unwrap());

        let path = dir.path().join("late.txt");
        fs::write(&path, "a").unwrap();
        assert_eq!(
            cell.current_hash("late.txt", &path).unwrap(),
            "0cc175b9c0f1b6a831c399e269772661"
        );
    }
}
