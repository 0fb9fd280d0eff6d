//! Standard file locations

use anyhow::{anyhow, Result};
use std::path::PathBuf;

const APP_DIR: &str = "hive";

/// `~/.config/hive`
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| anyhow!("Could not determine config directory"))
}

/// `~/.config/hive/config.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// `~/.local/share/hive`
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// `~/.local/share/hive/hive.db`
pub fn default_database_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("hive.db"))
}
