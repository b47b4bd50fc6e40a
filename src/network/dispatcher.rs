use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::error::{Result, SyncError};
use crate::models::SnapshotCell;
use crate::network::{
    ABSENT_INFO, Command, Connection, FAILED, HASH_SEPARATOR, NO, NOT_RECOGNIZED, READY, YES,
};
use crate::sandboxed::FileSystem;
use crate::transfer::TransferEngine;
use crate::utils::Log;

/// What the connection loop should do after a request
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    Reply(String),
    Quit,
}

/// Server side of the command protocol for one connection
pub struct Dispatcher {
    fs: FileSystem,
    snapshot: Arc<SnapshotCell>,
    engine: Arc<TransferEngine>,
}

impl Dispatcher {
    pub fn new(fs: FileSystem, snapshot: Arc<SnapshotCell>, engine: Arc<TransferEngine>) -> Self {
        Self {
            fs,
            snapshot,
            engine,
        }
    }

    /// Decode and run one request.
    ///
    /// Nothing but `!qq` ends the connection: local failures become sentinels.
    pub async fn dispatch(&self, connection: &Connection, payload: &str) -> Dispatch {
        let command = match Command::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                Log::warning(format!("{}", e), None);
                return Dispatch::Reply(NOT_RECOGNIZED.to_string());
            }
        };

        let reply = match command {
            Command::Quit => return Dispatch::Quit,
            Command::GetHashes(paths) => self.get_hashes(paths).await,
            Command::GetFile(path) => self.get_file(connection, &path).await,
            Command::CatchFile(path) => self.catch_file(&path).await,
            Command::Exists(path) => Ok(self.exists(&path)),
            Command::GetFileList => Ok(self.snapshot.load().file_list()),
            Command::SessionDone => self.session_done().await,
            Command::Remove(path) => self.remove(&path).await,
            Command::GetFileInfo(path) => self.file_info(&path).await,
        };

        match reply {
            Ok(reply) => Dispatch::Reply(reply),
            Err(SyncError::InvalidPath(path)) => {
                Log::warning(format!("Rejected path outside the sync root: {}", path), None);
                Dispatch::Reply(NOT_RECOGNIZED.to_string())
            }
            Err(e) => {
                Log::error(format!("{} failed: {}", payload, e), None);
                Dispatch::Reply(FAILED.to_string())
            }
        }
    }

    /// `?`-joined digests in request order, `-` for missing files
    pub async fn get_hashes(&self, paths: Vec<String>) -> Result<String> {
        let fs = self.fs.clone();
        let snapshot = Arc::clone(&self.snapshot);

        // Touched files are hashed from disk
        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut hashes = Vec::with_capacity(paths.len());
            for relative_path in &paths {
                let absolute_path = fs.resolve(relative_path)?;
                hashes.push(snapshot.current_hash(relative_path, &absolute_path)?);
            }
            Ok(hashes.join(HASH_SEPARATOR.to_string().as_str()))
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))?
    }

    async fn get_file(&self, connection: &Connection, relative_path: &str) -> Result<String> {
        match self.engine.upload(connection, relative_path).await {
            Ok(_) => Ok(READY.to_string()),
            // Nothing was pushed, the peer disarms on `!fail`
            Err(SyncError::NotFound(_)) => {
                Log::warning(format!("Asked for missing file {}", relative_path), None);
                Ok(FAILED.to_string())
            }
            Err(e) => Err(e),
        }
    }

    async fn catch_file(&self, relative_path: &str) -> Result<String> {
        self.engine.expect_file(relative_path).await?;
        Ok(READY.to_string())
    }

    pub fn exists(&self, relative_path: &str) -> String {
        if self.snapshot.load().contains(relative_path) {
            YES.to_string()
        } else {
            NO.to_string()
        }
    }

    async fn session_done(&self) -> Result<String> {
        self.engine.receiver().wait_idle().await?;
        let snapshot = self.snapshot.rebuild().await?;
        Log::success(
            format!(
                "Session done! Indexed {} files (generation {})",
                snapshot.files.len(),
                snapshot.generation
            ),
            None,
        );
        Ok(READY.to_string())
    }

    pub async fn remove(&self, relative_path: &str) -> Result<String> {
        if self.fs.remove_file(relative_path).await? {
            self.snapshot.mark_touched(relative_path);
            Log::log(format!("Removed {}", relative_path), None);
        }
        Ok(READY.to_string())
    }

    /// `<size>\n<last access>` of a file, `-` when it does not exist
    pub async fn file_info(&self, relative_path: &str) -> Result<String> {
        let path = self.fs.resolve(relative_path)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(ABSENT_INFO.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ABSENT_INFO.to_string());
            }
            Err(e) => return Err(SyncError::from_io(path, e)),
        };

        let accessed = metadata.accessed().or_else(|_| metadata.modified())?;
        let accessed: DateTime<Local> = accessed.into();
        Ok(format!(
            "{}\n{}",
            metadata.len(),
            accessed.format("%Y-%m-%d %H:%M:%S")
        ))
    }
}
