use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{Result, SyncError};
use crate::models::SyncSettings;

/// Generic JSON write operation
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json_string = serde_json::to_string_pretty(data)
        .map_err(|e| SyncError::Config(format!("Failed to serialize JSON: {}", e)))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json_string).map_err(|e| {
        SyncError::Config(format!("Failed to write file {}: {}", path.display(), e))
    })
}

/// Generic JSON read operation
pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("Failed to read file {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        SyncError::Config(format!("Failed to parse JSON from {}: {}", path.display(), e))
    })
}

/// Get the path to the default settings file
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("tcpsync").join("settings.json"))
        .ok_or_else(|| SyncError::Config("Failed to get the config directory".to_string()))
}

/// Helper to read settings from a file
pub fn read_settings(path: &Path) -> Result<SyncSettings> {
    read_json(path)
}

/// Helper to write settings to a file
pub fn write_settings(path: &Path, settings: &SyncSettings) -> Result<()> {
    write_json(path, settings)
}
