use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid chat directory '{}': {reason}", path.display())]
    InvalidChatDirectory { path: PathBuf, reason: String },

    #[error("invalid monitor state: {0}")]
    InvalidState(&'static str),

    #[error("a file observer is already registered for this directory")]
    ObserverAlreadyRegistered,

    #[error("monitor must be started from within a tokio runtime")]
    NoRuntime,

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
