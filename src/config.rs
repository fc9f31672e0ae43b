use crate::monitor::DEFAULT_POLL_INTERVAL;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Directory the client writes chat logs to.
    /// Default: ~/Documents/EVE/logs/Chatlogs
    pub chat_dir: Option<PathBuf>,
    /// Channels to monitor.
    /// Example: ["Alliance", "Corp", "ESC.Delve"]
    pub channels: Option<Vec<String>>,
    /// Seconds between polls. Default: 2
    pub poll_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration from ~/.config/eve-chatmon/config.toml
    ///
    /// - File missing: returns default config (Ok)
    /// - File exists but invalid TOML: returns Err so caller can show warning
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, with the same rules as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Chat log directory, falling back to the client's default location.
    pub fn chat_dir(&self) -> Option<PathBuf> {
        self.chat_dir.clone().or_else(default_chat_dir)
    }

    /// Channels to monitor; empty when none are configured.
    pub fn channels(&self) -> &[String] {
        self.channels.as_deref().unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|d| d.join(".config").join("eve-chatmon").join("config.toml"))
    }
}

/// Where the client writes chat logs by default: `Documents/EVE/logs/Chatlogs`.
pub fn default_chat_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join("EVE").join("logs").join("Chatlogs"))
}
