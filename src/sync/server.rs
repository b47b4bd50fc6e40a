use std::net::SocketAddr;
use std::sync::Arc;

use colored::Colorize;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::error::{Result, SyncError};
use crate::models::{Snapshot, SnapshotCell, SyncSettings};
use crate::network::{Command, Connection, Dispatch, Dispatcher};
use crate::sandboxed::FileSystem;
use crate::transfer::TransferEngine;
use crate::utils::Log;

/// How a served connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    Closed,
    Quit,
}

/// The directory-authoritative side: answers commands, one client at a time
pub struct SyncServer {
    settings: SyncSettings,
    fs: FileSystem,
    snapshot: Arc<SnapshotCell>,
}

impl SyncServer {
    /// Index and hash the sync root
    pub async fn start(settings: SyncSettings) -> Result<Self> {
        let root = settings.root.clone();
        let snapshot = Snapshot::build_async(root.clone(), 0).await?;
        Log::info(
            format!("Indexed {} files in {}", snapshot.files.len(), root.display()),
            None,
        );

        Ok(Self {
            settings,
            fs: FileSystem::new(root),
            snapshot: Arc::new(SnapshotCell::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Arc<SnapshotCell> {
        Arc::clone(&self.snapshot)
    }

    /// Bind to the configured address (`auto` or explicit) and port
    pub async fn bind(&self) -> Result<TcpListener> {
        let ip = self.settings.bind.resolve()?;
        let address = SocketAddr::new(ip, self.settings.port);

        let socket = if address.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.set_keepalive(self.settings.keepalive)?;
        socket.bind(address)?;
        let listener = socket.listen(16)?;

        Log::success(
            format!("Server started on {}", listener.local_addr()?.to_string().bright_cyan()),
            None,
        );
        Ok(listener)
    }

    /// Serve clients one after the other until one sends `!qq`
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, address) = listener.accept().await?;
            Log::success(format!("{} connected!", address), None);

            match self.serve_connection(stream).await {
                Ok(ConnectionEnd::Closed) => {
                    Log::warning(format!("{} disconnected!", address), None);
                }
                Ok(ConnectionEnd::Quit) => {
                    Log::info(format!("{} asked the server to stop", address), None);
                    return Ok(());
                }
                Err(e) => Log::error(format!("Connection with {} failed: {}", address, e), None),
            }
        }
    }

    /// Dispatch requests of one client until it hangs up or quits
    pub async fn serve_connection(&self, stream: TcpStream) -> Result<ConnectionEnd> {
        let engine = Arc::new(TransferEngine::new(self.fs.clone(), Arc::clone(&self.snapshot)));
        let (connection, mut requests, reader_task) =
            Connection::open(stream, Arc::clone(&engine), self.settings.timeout())?;
        let dispatcher = Arc::new(Dispatcher::new(
            self.fs.clone(),
            Arc::clone(&self.snapshot),
            engine,
        ));
        Log::log(
            format!("Connection id {}", connection.connection_id().bright_black()),
            Some(3),
        );

        while let Some(request) = requests.recv().await {
            if Command::parse(&request.payload).ok() == Some(Command::Quit) {
                connection.shutdown().await;
                reader_task.abort();
                return Ok(ConnectionEnd::Quit);
            }

            // A waiting `!catchFile` must not hold up the reader
            let dispatcher = Arc::clone(&dispatcher);
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                let reply = match dispatcher.dispatch(&connection, &request.payload).await {
                    Dispatch::Reply(reply) => reply,
                    Dispatch::Quit => return,
                };
                if let Err(e) = connection.respond(request.id, reply).await {
                    if !matches!(e, SyncError::Disconnected) {
                        Log::error(format!("Failed to answer {}: {}", request.payload, e), None);
                    }
                }
            });
        }

        connection.shutdown().await;
        Ok(ConnectionEnd::Closed)
    }
}
