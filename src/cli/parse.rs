use std::path::{Path, PathBuf};

use super::types::{Args, Command};
use crate::error::Result;
use crate::models::{DEFAULT_PORT, Role, SyncSettings};
use crate::storage::read_settings;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseArgsError {
    InvalidArguments,
    InvalidCommand(String),
    InvalidPath(String),
    InvalidPortNumber(String),
    InvalidOption(String),
    MissingValue(String),
}

// Parse Function
pub fn parse_args() -> std::result::Result<Args, ParseArgsError> {
    // Get the arguments from the command line
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    parse_from(&args)
}

pub fn parse_from(args: &[String]) -> std::result::Result<Args, ParseArgsError> {
    // Improper usage
    if args.len() < 2 || args[0] == "-h" || args[0] == "--help" {
        return Err(ParseArgsError::InvalidArguments);
    }

    // Get the command
    let command = match args[0].as_str() {
        "serve" => Command::Serve,
        "connect" => Command::Connect,
        _ => return Err(ParseArgsError::InvalidCommand(args[0].clone())),
    };

    // Get the path and validate it
    let abs_workspace_path = canonical_workspace(&args[1])?;

    let mut parsed = Args {
        command,
        abs_workspace_path,
        ip: None,
        port: None,
        bind: None,
        timeout_ms: None,
        download: false,
        upload: false,
        delete_client: false,
        delete_server: false,
        quit_server: false,
        config: None,
        save_config: false,
    };

    // Other arguments
    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        let arg = arg.as_str();
        let mut value = |flag: &str| {
            rest.next()
                .cloned()
                .ok_or_else(|| ParseArgsError::MissingValue(flag.to_string()))
        };

        match arg {
            "-p" | "--port" => {
                let port = value(arg)?;
                parsed.port = Some(
                    port.parse::<u16>()
                        .map_err(|_| ParseArgsError::InvalidPortNumber(port.clone()))?,
                );
            }
            "--bind" => {
                let bind = value(arg)?;
                parsed.bind = Some(
                    bind.parse()
                        .map_err(|_| ParseArgsError::InvalidOption(format!("--bind {}", bind)))?,
                );
            }
            "--timeout" => {
                let timeout = value(arg)?;
                parsed.timeout_ms = Some(
                    timeout
                        .parse::<u64>()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .ok_or_else(|| {
                            ParseArgsError::InvalidOption(format!("--timeout {}", timeout))
                        })?,
                );
            }
            "--config" => parsed.config = Some(PathBuf::from(value(arg)?)),
            "--download" => parsed.download = true,
            "--upload" => parsed.upload = true,
            "--delete-client" => parsed.delete_client = true,
            "--delete-server" => parsed.delete_server = true,
            "--quit-server" => parsed.quit_server = true,
            "--save-config" => parsed.save_config = true,
            other if other.starts_with('-') => {
                return Err(ParseArgsError::InvalidOption(other.to_string()));
            }
            // The server address of `connect`
            other if command == Command::Connect && parsed.ip.is_none() => {
                parsed.ip = Some(other.to_string());
            }
            other => return Err(ParseArgsError::InvalidOption(other.to_string())),
        }
    }

    Ok(parsed)
}

fn canonical_workspace(path: &str) -> std::result::Result<PathBuf, ParseArgsError> {
    let canonical = Path::new(path)
        .canonicalize()
        .map_err(|_| ParseArgsError::InvalidPath(path.to_string()))?;

    // Drop the verbatim prefix Windows adds
    let stripped = canonical
        .to_str()
        .and_then(|canonical_str| canonical_str.strip_prefix(r"\\?\"))
        .map(PathBuf::from);
    let canonical_workspace = stripped.unwrap_or(canonical);

    if !canonical_workspace.is_dir() {
        return Err(ParseArgsError::InvalidPath(path.to_string()));
    }
    Ok(canonical_workspace)
}

impl Args {
    /// Settings for this run: the config file if any, overridden by flags
    pub fn settings(&self) -> Result<SyncSettings> {
        let role = match self.command {
            Command::Serve => Role::Server,
            Command::Connect => Role::Client,
        };

        let mut settings = match &self.config {
            Some(path) if path.exists() => read_settings(path)?,
            _ => SyncSettings::server(&self.abs_workspace_path, DEFAULT_PORT),
        };

        settings.root = self.abs_workspace_path.clone();
        settings.role = role;
        if let Some(ip) = &self.ip {
            settings.ip = ip.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(bind) = self.bind {
            settings.bind = bind;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        settings.allow_download |= self.download;
        settings.allow_upload |= self.upload;
        settings.delete_on_client |= self.delete_client;
        settings.delete_on_server |= self.delete_server;

        Ok(settings)
    }
}
