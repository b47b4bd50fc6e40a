use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpSocket, lookup_host};
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};
use crate::models::{Snapshot, SnapshotCell, SyncSettings};
use crate::network::{
    Command, Connection, FAILED, NOT_RECOGNIZED, READY, split_file_list, split_hashes,
};
use crate::sandboxed::FileSystem;
use crate::sync::{ABSENT, FileDelta, SessionPhase, SyncReport, compute_delta, paths_in};
use crate::transfer::TransferEngine;
use crate::utils::Log;

/// Paths per `!getHashes` request
const HASH_BATCH: usize = 256;

/// The mirroring side: drives sync passes against a server
pub struct SyncClient {
    settings: SyncSettings,
    fs: FileSystem,
    snapshot: Arc<SnapshotCell>,
    engine: Arc<TransferEngine>,
    connection: Arc<Connection>,
    tasks: Vec<JoinHandle<()>>,
    phase: SessionPhase,
}

impl SyncClient {
    pub async fn connect(settings: SyncSettings) -> Result<Self> {
        let root = settings.root.clone();
        let snapshot = Arc::new(SnapshotCell::new(
            Snapshot::build_async(root.clone(), 0).await?,
        ));
        let fs = FileSystem::new(root);
        let engine = Arc::new(TransferEngine::new(fs.clone(), Arc::clone(&snapshot)));

        let address = resolve(&settings.ip, settings.port).await?;
        let socket = if address.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(settings.keepalive)?;
        let stream = tokio::time::timeout(settings.timeout(), socket.connect(address))
            .await
            .map_err(|_| SyncError::Timeout(settings.timeout()))??;

        let (connection, mut requests, reader_task) =
            Connection::open(stream, Arc::clone(&engine), settings.timeout())?;
        Log::success(format!("Connected to {}", connection.remote()), None);

        // The server never asks anything of us
        let responder = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                while let Some(request) = requests.recv().await {
                    let _ = connection
                        .respond(request.id, NOT_RECOGNIZED.to_string())
                        .await;
                }
            })
        };

        Ok(Self {
            settings,
            fs,
            snapshot,
            engine,
            connection,
            tasks: vec![reader_task, responder],
            phase: SessionPhase::Idle,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Arc<SnapshotCell> {
        Arc::clone(&self.snapshot)
    }

    /// One full pass: list, hash, diff, transfer, finalize.
    ///
    /// Any failure that breaks the session puts the client back to `Idle`.
    pub async fn sync_pass(&mut self) -> Result<SyncReport> {
        let result = self.run_pass().await;
        if let Err(e) = &result {
            Log::error(format!("Sync pass aborted while {}: {}", self.phase, e), None);
        }
        self.advance(SessionPhase::Idle);
        result
    }

    async fn run_pass(&mut self) -> Result<SyncReport> {
        let local = self.snapshot.rebuild().await?;
        let remote_paths = split_file_list(&self.call(Command::GetFileList).await?);
        self.advance(SessionPhase::ListExchanged);

        let mut paths: Vec<String> = local.files.keys().cloned().collect();
        paths.extend(remote_paths);
        paths.sort();
        paths.dedup();

        // Indexed but unhashable files are neither compared nor treated as missing
        let (local_hashes, unreadable) = local_hashes(&local, &paths);
        for path in &unreadable {
            Log::warning(format!("Skipping {}: it could not be hashed", path), Some(5));
        }
        paths.retain(|path| local_hashes.contains_key(path));

        let remote_hashes = self.remote_hashes(&paths).await?;
        self.advance(SessionPhase::HashesExchanged);

        let delta = compute_delta(&local_hashes, &remote_hashes);
        let mut report = SyncReport {
            unchanged: delta.values().filter(|state| !state.is_change()).count(),
            failed: unreadable.len(),
            ..SyncReport::default()
        };
        self.advance(SessionPhase::Diffed);

        let plan = plan(&self.settings, &delta);
        self.advance(SessionPhase::Transferring(plan.len()));
        self.execute(plan, &mut report).await?;

        self.advance(SessionPhase::Finalizing);
        self.expect_ready(Command::SessionDone).await?;
        self.snapshot.rebuild().await?;

        Log::success(format!("Sync pass done: {}", report), None);
        Ok(report)
    }

    async fn execute(&mut self, plan: Vec<Step>, report: &mut SyncReport) -> Result<()> {
        let progress = Log::transfers(plan.len() as u64);

        for step in plan {
            progress.set_message(step.path().to_string());
            let outcome = match &step {
                Step::Download { path, replace } => self.download(path, *replace).await,
                Step::Upload { path, replace } => self.upload(path, *replace).await,
                Step::DeleteLocal(path) => self.fs.remove_file(path).await.map(|_| ()),
                Step::DeleteRemote(path) => self.expect_ready(Command::Remove(path.clone())).await,
            };
            progress.inc(1);

            match outcome {
                Ok(()) => step.count(report),
                Err(e) if e.is_fatal() => {
                    progress.abandon();
                    return Err(e);
                }
                Err(e) => {
                    Log::error(format!("{} failed: {}", step.path(), e), Some(5));
                    report.failed += 1;
                }
            }
        }

        progress.finish_and_clear();
        Ok(())
    }

    /// Pull one file the server pushes for `!getFile`
    pub async fn download(&self, relative_path: &str, replace: bool) -> Result<()> {
        if replace {
            self.fs.remove_file(relative_path).await?;
        }

        let ticket = self.engine.expect_file(relative_path).await?;
        let reply = match self.call(Command::GetFile(relative_path.to_string())).await {
            Ok(reply) => reply,
            Err(e) => {
                self.engine.receiver().disarm();
                return Err(e);
            }
        };

        match reply.as_str() {
            READY => {
                // The stream is read before the response that follows it
                let outcome = tokio::time::timeout(self.settings.timeout(), ticket)
                    .await
                    .map_err(|_| SyncError::Timeout(self.settings.timeout()))?;
                outcome.map_err(|_| SyncError::Disconnected)?.map(|_| ())
            }
            FAILED => {
                self.engine.receiver().disarm();
                Err(SyncError::NotFound(relative_path.into()))
            }
            other => {
                self.engine.receiver().disarm();
                Err(unexpected(&Command::GetFile(relative_path.to_string()), other))
            }
        }
    }

    /// Push one local file to the server through `!catchFile`
    pub async fn upload(&self, relative_path: &str, replace: bool) -> Result<()> {
        // An armed server waits for a stream, so the file is opened first
        let (file, content_length) = self.engine.open_local(relative_path).await?;

        if replace {
            self.expect_ready(Command::Remove(relative_path.to_string()))
                .await?;
        }
        self.expect_ready(Command::CatchFile(relative_path.to_string()))
            .await?;
        self.engine
            .upload_file(&self.connection, relative_path, file, content_length)
            .await
            .map(|_| ())
    }

    /// Ask the server to stop serving
    pub async fn quit_server(&self) -> Result<()> {
        self.connection.notify(&Command::Quit.encode()).await
    }

    pub async fn disconnect(self) {
        self.connection.shutdown().await;
        for task in self.tasks {
            task.abort();
        }
    }

    async fn remote_hashes(&self, paths: &[String]) -> Result<HashMap<String, String>> {
        let mut hashes = HashMap::with_capacity(paths.len());
        for batch in paths.chunks(HASH_BATCH) {
            let reply = self.call(Command::GetHashes(batch.to_vec())).await?;
            let batch_hashes = split_hashes(&reply, batch.len())?;
            hashes.extend(batch.iter().cloned().zip(batch_hashes));
        }
        Ok(hashes)
    }

    async fn call(&self, command: Command) -> Result<String> {
        let reply = self.connection.call(&command.encode()).await?;
        if reply == NOT_RECOGNIZED {
            return Err(unexpected(&command, &reply));
        }
        Ok(reply)
    }

    async fn expect_ready(&self, command: Command) -> Result<()> {
        let reply = self.call(command.clone()).await?;
        match reply.as_str() {
            READY => Ok(()),
            FAILED => Err(SyncError::Io(std::io::Error::other(format!(
                "Server could not run {}",
                command
            )))),
            other => Err(unexpected(&command, other)),
        }
    }

    fn advance(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            Log::log(format!("Session: {} -> {}", self.phase, phase), Some(3));
            self.phase = phase;
        }
    }
}

/// Decide what to do with every changed path
fn plan(settings: &SyncSettings, delta: &BTreeMap<String, FileDelta>) -> Vec<Step> {
    let mut steps = Vec::new();

    for path in paths_in(delta, &[FileDelta::RemoteOnly]) {
        if settings.delete_on_server {
            steps.push(Step::DeleteRemote(path));
        } else if settings.allow_download {
            steps.push(Step::Download { path, replace: false });
        }
    }
    for path in paths_in(delta, &[FileDelta::LocalOnly]) {
        if settings.delete_on_client {
            steps.push(Step::DeleteLocal(path));
        } else if settings.allow_upload {
            steps.push(Step::Upload { path, replace: false });
        }
    }
    // The server wins when both directions are on
    for path in paths_in(delta, &[FileDelta::Differs]) {
        if settings.allow_download {
            steps.push(Step::Download { path, replace: true });
        } else if settings.allow_upload {
            steps.push(Step::Upload { path, replace: true });
        }
    }

    steps
}

/// Local digests of `paths`, and the indexed files that could not be hashed.
///
/// Only paths absent from the index get the absent marker.
fn local_hashes(local: &Snapshot, paths: &[String]) -> (HashMap<String, String>, Vec<String>) {
    let mut hashes = HashMap::with_capacity(paths.len());
    let mut unreadable = Vec::new();

    for path in paths {
        match local.hash(path) {
            Some(hash) => {
                hashes.insert(path.clone(), hash.to_string());
            }
            None if local.contains(path) => unreadable.push(path.clone()),
            None => {
                hashes.insert(path.clone(), ABSENT.to_string());
            }
        }
    }

    (hashes, unreadable)
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Download { path: String, replace: bool },
    Upload { path: String, replace: bool },
    DeleteLocal(String),
    DeleteRemote(String),
}

impl Step {
    fn path(&self) -> &str {
        match self {
            Step::Download { path, .. }
            | Step::Upload { path, .. }
            | Step::DeleteLocal(path)
            | Step::DeleteRemote(path) => path,
        }
    }

    fn count(&self, report: &mut SyncReport) {
        match self {
            Step::Download { .. } => report.downloaded += 1,
            Step::Upload { .. } => report.uploaded += 1,
            Step::DeleteLocal(_) => report.deleted_locally += 1,
            Step::DeleteRemote(_) => report.deleted_remotely += 1,
        }
    }
}

fn unexpected(command: &Command, reply: &str) -> SyncError {
    SyncError::Protocol(format!("Unexpected answer to {}: {:?}", command, reply))
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| SyncError::Config(format!("Cannot resolve {}", host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::FileIndex;
    use std::path::PathBuf;

    fn snapshot(indexed: &[&str], hashed: &[(&str, &str)]) -> Snapshot {
        let files: FileIndex = indexed
            .iter()
            .map(|path| (path.to_string(), PathBuf::from("/sync").join(path)))
            .collect();
        let hashes = hashed
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect();
        Snapshot {
            generation: 0,
            root: PathBuf::from("/sync"),
            files,
            hashes,
        }
    }

    fn paths(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|path| path.to_string()).collect()
    }

    #[test]
    fn unhashable_local_file_is_not_missing() {
        let local = snapshot(&["locked.txt", "same.txt"], &[("same.txt", "h1")]);
        let (hashes, unreadable) =
            local_hashes(&local, &paths(&["locked.txt", "same.txt", "remote.txt"]));

        assert_eq!(unreadable, vec!["locked.txt".to_string()]);
        assert!(!hashes.contains_key("locked.txt"));
        assert_eq!(hashes["same.txt"], "h1");
        assert_eq!(hashes["remote.txt"], ABSENT);
    }

    #[test]
    fn delete_on_server_spares_files_the_client_cannot_hash() {
        let local = snapshot(&["locked.txt", "same.txt"], &[("same.txt", "h1")]);
        let (local_hashes, _) =
            local_hashes(&local, &paths(&["locked.txt", "same.txt", "remote.txt"]));
        let remote: HashMap<String, String> = [("same.txt", "h1"), ("remote.txt", "h2")]
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect();

        let mut settings = SyncSettings::client("/sync", "127.0.0.1", 8080);
        settings.delete_on_server = true;
        settings.delete_on_client = true;

        let steps = plan(&settings, &compute_delta(&local_hashes, &remote));
        assert_eq!(steps, vec![Step::DeleteRemote("remote.txt".into())]);
    }

    #[test]
    fn plan_prefers_the_server_copy_when_both_directions_are_on() {
        let local: HashMap<String, String> = [("x", "a"), ("mine", "m")]
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect();
        let remote: HashMap<String, String> = [("x", "b"), ("theirs", "t")]
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect();

        let mut settings = SyncSettings::client("/sync", "127.0.0.1", 8080);
        settings.allow_download = true;
        settings.allow_upload = true;

        let steps = plan(&settings, &compute_delta(&local, &remote));
        assert_eq!(
            steps,
            vec![
                Step::Download { path: "theirs".into(), replace: false },
                Step::Upload { path: "mine".into(), replace: false },
                Step::Download { path: "x".into(), replace: true },
            ]
        );
    }
}
