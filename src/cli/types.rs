use std::fmt;
use std::path::PathBuf;

use crate::models::BindAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Connect,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Serve => write!(f, "serve"),
            Command::Connect => write!(f, "connect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub command: Command,
    pub abs_workspace_path: PathBuf,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub bind: Option<BindAddress>,
    pub timeout_ms: Option<u64>,
    pub download: bool,
    pub upload: bool,
    pub delete_client: bool,
    pub delete_server: bool,
    pub quit_server: bool,
    pub config: Option<PathBuf>,
    pub save_config: bool,
}
