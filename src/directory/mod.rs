//! Chat directory tracking.
//!
//! A [`ChatDirectory`] keeps exactly one open [`ChatLogReader`] per channel,
//! bound to the channel's newest log file, and follows the client as it
//! rotates to fresh files.

pub mod watcher;

use crate::chatlog::{latest_chat_logs, ChatLogFile, ChatLogReader};
use crate::error::{Error, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use watcher::{DirEvent, DirEventKind};

/// Tracks the active chat log of every channel in one directory.
///
/// All reads and all reader swaps go through the same lock, so a reader is
/// never read after it has been replaced and never replaced mid-read.
pub struct ChatDirectory {
    path: PathBuf,
    chats: Mutex<HashMap<String, ChatLogReader>>,
    observer: Mutex<Option<RecommendedWatcher>>,
}

impl ChatDirectory {
    /// Scan `path` and open the newest log of every channel found there.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let directory = Self {
            path: path.clone(),
            chats: Mutex::new(HashMap::new()),
            observer: Mutex::new(None),
        };

        for (channel, log) in latest_chat_logs(&path)? {
            directory.add_chat_log(&channel, &log.path)?;
        }

        Ok(directory)
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all channels with an active log, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.chats.lock().keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Path of the log file currently read for `channel`.
    pub fn active_path(&self, channel: &str) -> Option<PathBuf> {
        self.chats
            .lock()
            .get(channel)
            .map(|reader| reader.path().to_path_buf())
    }

    /// Raw messages appended to `channel`'s active log since the last call.
    ///
    /// Returns `None` for an unknown channel. A failed read is logged and
    /// reported as no new messages.
    pub fn read_messages(&self, channel: &str) -> Option<Vec<String>> {
        let mut chats = self.chats.lock();
        let reader = chats.get_mut(channel)?;

        match reader.read_messages() {
            Ok(messages) => Some(messages),
            Err(e) => {
                warn!(
                    channel,
                    path = %reader.path().display(),
                    error = %e,
                    "failed to read chat log"
                );
                Some(Vec::new())
            }
        }
    }

    /// Make `path` the active log of `channel`, closing the previous one.
    ///
    /// The previous reader is discarded even when `path` cannot be opened.
    pub fn add_chat_log(&self, channel: &str, path: &Path) -> Result<()> {
        let opened = ChatLogReader::open(path);

        let mut chats = self.chats.lock();
        install(&mut chats, channel, path, opened)
    }

    /// Switch to `log` unless the channel's active file is at least as new.
    fn add_if_newer(&self, log: &ChatLogFile) -> Result<()> {
        let opened = ChatLogReader::open(&log.path);

        let mut chats = self.chats.lock();
        let active = chats
            .get(&log.channel)
            .and_then(|reader| ChatLogFile::from_path(reader.path()));
        if let Some(active) = active.filter(|active| !log.supersedes(active)) {
            debug!(
                channel = %log.channel,
                path = %log.path.display(),
                active = %active.path.display(),
                "ignoring chat log older than the active one"
            );
            return Ok(());
        }

        install(&mut chats, &log.channel, &log.path, opened)
    }

    /// Close and forget the reader of `channel`, if any.
    pub fn remove_chat_log(&self, channel: &str) {
        if let Some(reader) = self.chats.lock().remove(channel) {
            info!(channel, path = %reader.path().display(), "chat log removed");
        }
    }

    /// React to a change in the directory.
    pub fn handle_event(&self, event: &DirEvent) {
        if event.is_dir {
            return;
        }

        let Some(log) = ChatLogFile::from_path(&event.path) else {
            debug!(path = %event.path.display(), "ignoring non chat log event");
            return;
        };

        match event.kind {
            DirEventKind::Created => {
                if let Err(e) = self.add_if_newer(&log) {
                    warn!(
                        channel = %log.channel,
                        path = %log.path.display(),
                        error = %e,
                        "failed to open new chat log"
                    );
                }
            }
            DirEventKind::Deleted => self.remove_if_active(&log),
        }
    }

    /// Deleting a superseded log of a channel leaves its active reader alone.
    fn remove_if_active(&self, log: &ChatLogFile) {
        let mut chats = self.chats.lock();
        let is_active = chats
            .get(&log.channel)
            .is_some_and(|reader| reader.path().file_name() == log.path.file_name());

        if is_active {
            if let Some(reader) = chats.remove(&log.channel) {
                info!(
                    channel = %log.channel,
                    path = %reader.path().display(),
                    "active chat log deleted"
                );
            }
        } else {
            debug!(
                channel = %log.channel,
                path = %log.path.display(),
                "inactive chat log deleted"
            );
        }
    }

    /// Start following file creation and deletion in the directory.
    ///
    /// The observer holds only a weak reference, so dropping the last
    /// `Arc<ChatDirectory>` also stops the observer.
    pub fn watch(self: &Arc<Self>) -> Result<()> {
        let mut observer = self.observer.lock();
        if observer.is_some() {
            return Err(Error::ObserverAlreadyRegistered);
        }

        let directory = Arc::downgrade(self);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if let Some(directory) = directory.upgrade() {
                        for dir_event in DirEvent::from_notify(&event) {
                            directory.handle_event(&dir_event);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "chat directory watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        debug!(path = %self.path.display(), "watching chat directory");
        *observer = Some(watcher);
        Ok(())
    }
}

fn install(
    chats: &mut HashMap<String, ChatLogReader>,
    channel: &str,
    path: &Path,
    opened: io::Result<ChatLogReader>,
) -> Result<()> {
    let previous = chats.remove(channel);
    let reader = opened?;

    match &previous {
        Some(old) => info!(
            channel,
            from = %old.path().display(),
            to = %path.display(),
            "chat log rotated"
        ),
        None => info!(channel, path = %path.display(), "chat log added"),
    }
    chats.insert(channel.to_string(), reader);

    Ok(())
}
