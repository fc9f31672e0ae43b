//! Chat log file name conventions.
//!
//! The client writes one file per channel session, named
//! `{channel}_{YYYYMMDD}_{HHMMSS}.txt`. A channel name may itself contain
//! underscores, so it is everything before the trailing date/time group.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<channel>.+?)_(?P<stamp>\d{8}_\d{6})\.[^.]+$").expect("valid regex")
});

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A chat log file on disk, identified by its channel and creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLogFile {
    pub channel: String,
    pub timestamp: NaiveDateTime,
    pub path: PathBuf,
}

impl ChatLogFile {
    /// Parse a path whose file name follows the chat log convention.
    /// Returns `None` for anything else, including impossible dates.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let (channel, timestamp) = parse_file_name(file_name)?;
        Some(Self {
            channel: channel.to_string(),
            timestamp,
            path: path.to_path_buf(),
        })
    }

    fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Whether this file should replace `other` as the active file of a channel.
    /// Later timestamps win; equal timestamps fall back to the greater file name
    /// so the outcome does not depend on directory listing order.
    pub fn supersedes(&self, other: &ChatLogFile) -> bool {
        (self.timestamp, self.file_name()) > (other.timestamp, other.file_name())
    }
}

fn parse_file_name(file_name: &str) -> Option<(&str, NaiveDateTime)> {
    let caps = FILE_NAME.captures(file_name)?;
    let channel = caps.name("channel")?.as_str();
    let timestamp = NaiveDateTime::parse_from_str(caps.name("stamp")?.as_str(), STAMP_FORMAT).ok()?;
    Some((channel, timestamp))
}

/// Extract the channel name from a chat log file name.
pub fn chat_name_from_file_name(file_name: &str) -> Option<&str> {
    parse_file_name(file_name).map(|(channel, _)| channel)
}

/// Extract the creation timestamp from a chat log file name.
pub fn timestamp_from_file_name(file_name: &str) -> Option<NaiveDateTime> {
    parse_file_name(file_name).map(|(_, timestamp)| timestamp)
}

/// Fail unless `path` exists and is a directory.
pub fn ensure_chat_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::InvalidChatDirectory {
            path: path.to_path_buf(),
            reason: "the path does not exist".to_string(),
        });
    }
    if !path.is_dir() {
        return Err(Error::InvalidChatDirectory {
            path: path.to_path_buf(),
            reason: "the path does not point to a directory".to_string(),
        });
    }
    Ok(())
}

/// Scan `dir` (non-recursively) and return the newest chat log of every channel.
pub fn latest_chat_logs(dir: &Path) -> Result<HashMap<String, ChatLogFile>> {
    ensure_chat_dir(dir)?;

    let mut latest: HashMap<String, ChatLogFile> = HashMap::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        // Follows symlinks, so a linked chat log counts as a file.
        if !path.is_file() {
            continue;
        }

        let Some(log) = ChatLogFile::from_path(&path) else {
            debug!(path = %path.display(), "skipping file that is not a chat log");
            continue;
        };

        match latest.get(&log.channel) {
            Some(current) if !log.supersedes(current) => {}
            _ => {
                latest.insert(log.channel.clone(), log);
            }
        }
    }

    Ok(latest)
}
