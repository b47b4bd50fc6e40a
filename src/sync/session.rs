use std::fmt;

/// Where a client sync pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    ListExchanged,
    HashesExchanged,
    Diffed,
    Transferring(usize),
    Finalizing,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::ListExchanged => write!(f, "file lists exchanged"),
            SessionPhase::HashesExchanged => write!(f, "hashes exchanged"),
            SessionPhase::Diffed => write!(f, "diffed"),
            SessionPhase::Transferring(count) => write!(f, "transferring ({} files)", count),
            SessionPhase::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// What one sync pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub unchanged: usize,
    pub downloaded: usize,
    pub uploaded: usize,
    pub deleted_locally: usize,
    pub deleted_remotely: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn transferred(&self) -> usize {
        self.downloaded + self.uploaded
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} unchanged, {} downloaded, {} uploaded, {} deleted locally, {} deleted on server, {} failed",
            self.unchanged,
            self.downloaded,
            self.uploaded,
            self.deleted_locally,
            self.deleted_remotely,
            self.failed
        )
    }
}
