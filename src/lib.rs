//! Tails rotating EVE Online chat logs.
//!
//! [`directory::ChatDirectory`] keeps one reader on the newest log of each
//! channel, [`chatlog`] reads and parses what gets appended, and
//! [`monitor::Monitor`] polls a fixed list of channels and hands every parsed
//! message to a [`monitor::MessageHandler`].

pub mod chatlog;
pub mod config;
pub mod directory;
pub mod error;
pub mod monitor;

pub use chatlog::ChatMessage;
pub use error::{Error, Result};
pub use monitor::{MessageHandler, Monitor};
