use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SyncError};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Client => write!(f, "client"),
        }
    }
}

/// Where the server listens.
///
/// `Auto` picks the machine's local IPv4 address, an explicit address is used
/// as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindAddress {
    Auto,
    Address(IpAddr),
}

impl BindAddress {
    pub fn resolve(&self) -> Result<IpAddr> {
        match self {
            BindAddress::Auto => local_ip_address::local_ip().map_err(|e| {
                SyncError::Config(format!("Failed to detect a local IPv4 address: {}", e))
            }),
            BindAddress::Address(ip) => Ok(*ip),
        }
    }
}

impl FromStr for BindAddress {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("auto") {
            return Ok(BindAddress::Auto);
        }
        value
            .parse::<IpAddr>()
            .map(BindAddress::Address)
            .map_err(|_| SyncError::Config(format!("Invalid bind address: '{}'", value)))
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Auto => write!(f, "auto"),
            BindAddress::Address(ip) => write!(f, "{}", ip),
        }
    }
}

/// Per-connection configuration, read-only once a connection is up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub root: PathBuf,
    pub role: Role,
    /// Peer address the client connects to
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: BindAddress,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive: bool,
    #[serde(default)]
    pub allow_download: bool,
    #[serde(default)]
    pub allow_upload: bool,
    /// Delete local files that are missing on the server
    #[serde(default)]
    pub delete_on_client: bool,
    /// Delete server files that are missing locally
    #[serde(default)]
    pub delete_on_server: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> BindAddress {
    BindAddress::Auto
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_keepalive() -> bool {
    true
}

impl SyncSettings {
    pub fn server(root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            root: root.into(),
            role: Role::Server,
            ip: String::new(),
            port,
            bind: BindAddress::Auto,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            keepalive: true,
            allow_download: false,
            allow_upload: false,
            delete_on_client: false,
            delete_on_server: false,
        }
    }

    pub fn client(root: impl Into<PathBuf>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            role: Role::Client,
            ip: ip.into(),
            ..Self::server(root, port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the settings before a connection is opened
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(SyncError::Config(format!(
                "Sync root is not a directory: {}",
                self.root.display()
            )));
        }
        if self.timeout_ms == 0 {
            return Err(SyncError::Config("Timeout must be greater than zero".into()));
        }
        if self.role == Role::Client && self.ip.trim().is_empty() {
            return Err(SyncError::Config("Client needs a server address".into()));
        }
        Ok(())
    }
}
