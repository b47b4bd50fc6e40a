use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the sync engine.
///
/// Filesystem errors are normally caught at the operation boundary and turned
/// into a response sentinel or a log line; only broken framing and `!qq` end a
/// connection.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The sync root (or a directory below it) cannot be read.
    #[error("Cannot access directory {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file vanished between indexing and reading.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// The destination of an inbound stream already exists.
    #[error("Destination already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Read/write failure, usually mid-transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request did not get its response in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Unparseable frame, command or response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A relative path that would leave the sync root.
    #[error("Invalid relative path: {0}")]
    InvalidPath(String),

    /// The peer went away.
    #[error("Connection closed")]
    Disconnected,

    /// Invalid or unreadable settings.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Maps an io error on `path` to `NotFound` when the file is gone.
    pub fn from_io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => SyncError::NotFound(path.into()),
            std::io::ErrorKind::AlreadyExists => SyncError::AlreadyExists(path.into()),
            _ => SyncError::Io(error),
        }
    }

    /// Errors that end the current sync pass instead of a single transfer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Timeout(_) | SyncError::Disconnected | SyncError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_taxonomy() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            SyncError::from_io("a.txt", missing),
            SyncError::NotFound(_)
        ));

        let exists = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "there");
        assert!(matches!(
            SyncError::from_io("a.txt", exists),
            SyncError::AlreadyExists(_)
        ));

        let other = std::io::Error::other("disk on fire");
        assert!(matches!(SyncError::from_io("a.txt", other), SyncError::Io(_)));
    }

    #[test]
    fn only_session_breaking_errors_are_fatal() {
        assert!(SyncError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(SyncError::Disconnected.is_fatal());
        assert!(!SyncError::AlreadyExists(PathBuf::from("x")).is_fatal());
        assert!(!SyncError::NotFound(PathBuf::from("x")).is_fatal());
    }
}
