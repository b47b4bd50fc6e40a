use std::path::Path;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{Result, SyncError};
use crate::models::SnapshotCell;
use crate::network::Connection;
use crate::sandboxed::FileSystem;
use crate::transfer::{InboundReceiver, TransferTicket};
use crate::utils::Log;

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Whole-file transfers of one connection
pub struct TransferEngine {
    fs: FileSystem,
    snapshot: Arc<SnapshotCell>,
    receiver: InboundReceiver,
}

impl TransferEngine {
    pub fn new(fs: FileSystem, snapshot: Arc<SnapshotCell>) -> Self {
        Self {
            fs,
            snapshot,
            receiver: InboundReceiver::new(),
        }
    }

    pub fn receiver(&self) -> &InboundReceiver {
        &self.receiver
    }

    /// Open a local file for pushing, with its length
    pub async fn open_local(&self, relative_path: &str) -> Result<(File, u64)> {
        let path = self.fs.resolve(relative_path)?;
        let file = File::open(&path)
            .await
            .map_err(|e| SyncError::from_io(&path, e))?;
        let content_length = file
            .metadata()
            .await
            .map_err(|e| SyncError::from_io(&path, e))?
            .len();
        Ok((file, content_length))
    }

    /// Push an opened file to the peer as a side-channel stream
    pub async fn upload_file(
        &self,
        connection: &Connection,
        relative_path: &str,
        mut file: File,
        content_length: u64,
    ) -> Result<u64> {
        connection.send_stream(content_length, &mut file).await?;
        Log::log(format!("Uploaded {} ({} bytes)", relative_path, content_length), None);
        Ok(content_length)
    }

    /// Open and push a local file
    pub async fn upload(&self, connection: &Connection, relative_path: &str) -> Result<u64> {
        let (file, content_length) = self.open_local(relative_path).await?;
        self.upload_file(connection, relative_path, file, content_length)
            .await
    }

    /// Arm the receiver for the next inbound stream, waiting for any transfer in progress
    pub async fn expect_file(&self, relative_path: &str) -> Result<TransferTicket> {
        let destination = self.fs.resolve(relative_path)?;
        self.receiver.arm(relative_path, destination).await
    }

    /// Consume one inbound stream of `content_length` bytes.
    ///
    /// With nothing armed the bytes are discarded. A failed write still
    /// drains the stream so the connection stays framed; only a broken source
    /// is returned as an error.
    pub async fn receive_stream<R>(&self, content_length: u64, source: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let Some(transfer) = self.receiver.take() else {
            Log::warning(
                format!("Discarding unexpected stream of {} bytes", content_length),
                None,
            );
            return drain(source, content_length).await;
        };

        let outcome = match self.fs.create_parent_directory(&transfer.destination).await {
            Ok(()) => receive_into(&transfer.destination, content_length, source).await,
            Err(e) => drain(source, content_length).await.and(Err(e)),
        };
        let result = match &outcome {
            Ok(written) => {
                self.snapshot.mark_touched(&transfer.relative_path);
                Log::log(
                    format!("Downloaded {} ({} bytes)", transfer.relative_path, written),
                    None,
                );
                Ok(())
            }
            Err(SyncError::Disconnected) => Err(SyncError::Disconnected),
            Err(e) => {
                Log::error(
                    format!("Failed to receive {}: {}", transfer.relative_path, e),
                    None,
                );
                Ok(())
            }
        };

        transfer.finish(outcome);
        result
    }
}

/// Write exactly `content_length` bytes of `source` into a new file.
///
/// The parent directory must exist and the destination must not; it is never
/// overwritten. Short reads are fine, end of stream before `content_length` is
/// `Disconnected`.
pub async fn receive_into<R>(destination: &Path, content_length: u64, source: &mut R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let opened = open_exclusive(destination).await;
    let mut file = match opened {
        Ok(file) => file,
        Err(e) => {
            drain(source, content_length).await?;
            return Err(e);
        }
    };

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut remaining = content_length;
    let mut write_error = None;

    while remaining > 0 {
        let wanted = remaining.min(CHUNK_SIZE as u64) as usize;
        let read = source
            .read(&mut buffer[..wanted])
            .await
            .map_err(|_| SyncError::Disconnected)?;
        if read == 0 {
            return Err(SyncError::Disconnected);
        }
        remaining -= read as u64;

        if write_error.is_none() {
            if let Err(e) = file.write_all(&buffer[..read]).await {
                write_error = Some(e);
            }
        }
    }

    if let Some(e) = write_error {
        return Err(SyncError::Io(e));
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(content_length)
}

async fn open_exclusive(destination: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
        .map_err(|e| SyncError::from_io(destination, e))
}

/// Read and throw away `content_length` bytes
pub async fn drain<R>(source: &mut R, content_length: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut limited = source.take(content_length);
    let copied = tokio::io::copy(&mut limited, &mut tokio::io::sink())
        .await
        .map_err(|_| SyncError::Disconnected)?;
    if copied < content_length {
        return Err(SyncError::Disconnected);
    }
    Ok(())
}
