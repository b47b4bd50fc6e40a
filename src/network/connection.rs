use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};
use crate::network::{Frame, read_frame, write_frame, write_stream};
use crate::transfer::TransferEngine;
use crate::utils::Log;

/// Id used for requests that expect no response (`!qq`)
pub const NO_RESPONSE_ID: u64 = 0;

/// A request from the peer, answered with `Connection::respond`
#[derive(Debug)]
pub struct InboundRequest {
    pub id: u64,
    pub payload: String,
}

/// One peer connection: request/response calls plus side-channel streams.
///
/// A single reader task demultiplexes the socket. Responses complete pending
/// calls, requests go to the channel returned by `open`, and streams are
/// written by the transfer engine before the next frame is read.
pub struct Connection {
    connection_id: String,
    remote: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    pending: StdMutex<HashMap<u64, oneshot::Sender<String>>>,
    next_id: AtomicU64,
    timeout: Duration,
    closed: AtomicBool,
}

impl Connection {
    pub fn open(
        stream: TcpStream,
        engine: Arc<TransferEngine>,
        timeout: Duration,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<InboundRequest>, JoinHandle<()>)> {
        let remote = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let connection = Arc::new(Connection {
            connection_id: generate_connection_id(),
            remote,
            writer: Mutex::new(writer),
            pending: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(NO_RESPONSE_ID + 1),
            timeout,
            closed: AtomicBool::new(false),
        });

        let (requests_tx, requests_rx) = mpsc::channel(32);
        let reader_task = tokio::spawn(read_loop(
            Arc::clone(&connection),
            reader,
            engine,
            requests_tx,
        ));

        Ok((connection, requests_rx, reader_task))
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response, up to the configured timeout
    pub async fn call(&self, payload: &str) -> Result<String> {
        if self.is_closed() {
            return Err(SyncError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (response_tx, response_rx) = oneshot::channel();
        self.pending_map().insert(id, response_tx);

        let sent = self
            .send_frame(&Frame::Request {
                id,
                payload: payload.to_string(),
            })
            .await;
        if let Err(e) = sent {
            self.pending_map().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, response_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(SyncError::Disconnected),
            Err(_) => {
                self.pending_map().remove(&id);
                Err(SyncError::Timeout(self.timeout))
            }
        }
    }

    /// Send a request without waiting for an answer
    pub async fn notify(&self, payload: &str) -> Result<()> {
        self.send_frame(&Frame::Request {
            id: NO_RESPONSE_ID,
            payload: payload.to_string(),
        })
        .await
    }

    pub async fn respond(&self, id: u64, payload: String) -> Result<()> {
        if id == NO_RESPONSE_ID {
            return Ok(());
        }
        self.send_frame(&Frame::Response { id, payload }).await
    }

    /// Push `content_length` bytes of `source` as one side-channel stream.
    ///
    /// Holds the write half for the whole stream so no frame interleaves. A
    /// failure mid-stream leaves the peer unframed and closes the connection.
    pub async fn send_stream<R>(&self, content_length: u64, source: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut writer = self.writer.lock().await;
        let result = write_stream(&mut *writer, content_length, source).await;
        if result.is_err() {
            self.closed.store(true, Ordering::SeqCst);
            let _ = writer.shutdown().await;
        }
        result
    }

    /// Close the write half; the reader task ends when the peer hangs up
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    async fn send_frame(&self, frame: &Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }

    fn complete(&self, id: u64, payload: String) {
        match self.pending_map().remove(&id) {
            Some(response_tx) => {
                let _ = response_tx.send(payload);
            }
            None => Log::warning(format!("Dropping late response #{}", id), None),
        }
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<String>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn read_loop(
    connection: Arc<Connection>,
    mut reader: OwnedReadHalf,
    engine: Arc<TransferEngine>,
    requests: mpsc::Sender<InboundRequest>,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(SyncError::Disconnected) => break,
            Err(e) => {
                Log::error(
                    format!("Connection {} failed: {}", connection.connection_id(), e),
                    None,
                );
                break;
            }
        };

        match frame {
            Frame::Response { id, payload } => connection.complete(id, payload),
            Frame::Request { id, payload } => {
                if requests.send(InboundRequest { id, payload }).await.is_err() {
                    break;
                }
            }
            Frame::Stream { content_length } => {
                if let Err(e) = engine.receive_stream(content_length, &mut reader).await {
                    Log::error(format!("Side-channel stream broke: {}", e), None);
                    break;
                }
            }
        }
    }

    connection.closed.store(true, Ordering::SeqCst);
    // Dropping the senders fails every call still waiting
    connection.pending_map().clear();
    engine.receiver().close();
}

// Unique id for log lines of one connection
pub fn generate_connection_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
