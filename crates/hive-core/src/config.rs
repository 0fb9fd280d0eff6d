//! Hive configuration
//!
//! Loaded from `~/.config/hive/config.toml`. Every field has a default, so a
//! missing file or a partial one is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ai::retry::RetryConfig;
use crate::ratelimit::RateLimitConfig;

/// Environment variable overriding the chat API base URL
pub const CHAT_API_URL_ENV: &str = "HIVE_CHAT_API_URL";
/// Environment variable overriding the chat API key
pub const CHAT_API_KEY_ENV: &str = "HIVE_CHAT_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub chat: ChatApiConfig,
    pub storage: StorageConfig,
}

/// Remote chat assistant settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatApiConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Connect timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to `<data dir>/hive/hive.db`
    pub database_path: Option<PathBuf>,
}

impl HiveConfig {
    /// Load from the default location, applying environment overrides
    pub fn load() -> Result<Self> {
        let path = crate::paths::config_file()?;
        Self::load_from(&path)
    }

    /// Load from an explicit path, applying environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            Self::parse(&content)?
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(CHAT_API_URL_ENV) {
            debug!("Chat API URL overridden by {}", CHAT_API_URL_ENV);
            self.chat.api_url = url;
        }
        if let Ok(key) = std::env::var(CHAT_API_KEY_ENV) {
            self.chat.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.chat.api_url)
            .with_context(|| format!("Invalid chat api_url: {}", self.chat.api_url))?;
        if self.rate_limit.window_ms == 0 {
            anyhow::bail!("rate_limit.window_ms must be greater than zero");
        }
        Ok(())
    }

    /// Database path, falling back to the data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => crate::paths::default_database_file(),
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = to_toml(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }
}

/// Render a config as TOML
pub fn to_toml(config: &HiveConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}
