//! Translation of `notify` events into chat directory events.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

/// What happened to an entry of the chat directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEventKind {
    Created,
    Deleted,
}

/// A file-level change in the chat directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEvent {
    pub kind: DirEventKind,
    pub path: PathBuf,
    /// The changed entry is a directory (such events are ignored)
    pub is_dir: bool,
}

impl DirEvent {
    pub fn created(path: impl AsRef<Path>) -> Self {
        Self {
            kind: DirEventKind::Created,
            path: path.as_ref().to_path_buf(),
            is_dir: false,
        }
    }

    pub fn deleted(path: impl AsRef<Path>) -> Self {
        Self {
            kind: DirEventKind::Deleted,
            path: path.as_ref().to_path_buf(),
            is_dir: false,
        }
    }

    pub fn with_dir(mut self, is_dir: bool) -> Self {
        self.is_dir = is_dir;
        self
    }

    /// Convert a `notify` event. Renames into the directory count as
    /// creations and renames out of it as deletions; everything else
    /// (modify, access, metadata) is dropped.
    pub fn from_notify(event: &Event) -> Vec<DirEvent> {
        match &event.kind {
            EventKind::Create(kind) => event
                .paths
                .iter()
                .map(|p| {
                    let is_dir = matches!(kind, CreateKind::Folder) || p.is_dir();
                    DirEvent::created(p).with_dir(is_dir)
                })
                .collect(),
            EventKind::Remove(kind) => event
                .paths
                .iter()
                .map(|p| DirEvent::deleted(p).with_dir(matches!(kind, RemoveKind::Folder)))
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
                .paths
                .iter()
                .map(|p| DirEvent::created(p).with_dir(p.is_dir()))
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                event.paths.iter().map(DirEvent::deleted).collect()
            }
            // FSEvents and some Windows renames do not say which side this is.
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event
                .paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        DirEvent::created(p).with_dir(p.is_dir())
                    } else {
                        DirEvent::deleted(p)
                    }
                })
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to] => vec![
                    DirEvent::deleted(from),
                    DirEvent::created(to).with_dir(to.is_dir()),
                ],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
