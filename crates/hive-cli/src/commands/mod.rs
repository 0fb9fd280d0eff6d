//! CLI subcommands

pub mod chat;
pub mod events;
pub mod feed;
pub mod game;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

use hive_core::HiveConfig;

/// Read a JSON array from a file, or stdin when the path is `-`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?
    };
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

pub fn config_toml(config: &HiveConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.chat.api_key.is_some() {
        shown.chat.api_key = Some("********".to_string());
    }
    hive_core::config::to_toml(&shown)
}
