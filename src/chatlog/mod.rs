//! Chat log files: naming, incremental reading and line parsing.
//!
//! The client writes one UTF-16LE file per channel session to
//! `Documents/EVE/logs/Chatlogs/{channel}_{YYYYMMDD}_{HHMMSS}.txt`.

mod filename;
mod message;
mod reader;

pub use filename::{
    chat_name_from_file_name, ensure_chat_dir, latest_chat_logs, timestamp_from_file_name,
    ChatLogFile,
};
pub use message::{fingerprint, parse_message, ChatMessage};
pub use reader::{split_messages, ChatLogReader, MESSAGE_DELIMITER};
