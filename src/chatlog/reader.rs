//! Incremental reader for a single chat log file.

use encoding_rs::{Decoder, UTF_16LE};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The client writes a byte order mark before every message, including the
/// first, so it doubles as the message delimiter.
pub const MESSAGE_DELIMITER: char = '\u{feff}';

/// Reads newly appended messages from one UTF-16LE chat log.
///
/// The read position is the source's own cursor; nothing already returned is
/// kept in memory. The decoder carries any code unit split across two reads
/// over to the next call.
pub struct ChatLogReader {
    path: PathBuf,
    source: Box<dyn Read + Send>,
    decoder: Decoder,
}

impl ChatLogReader {
    /// Open a chat log and skip everything it currently contains, so that
    /// only messages appended from now on are returned.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_source(path, file)
    }

    /// Like [`ChatLogReader::open`], over an already opened source that
    /// `path` only labels.
    pub fn from_source(
        path: impl AsRef<Path>,
        source: impl Read + Send + 'static,
    ) -> io::Result<Self> {
        let mut reader = Self {
            path: path.as_ref().to_path_buf(),
            source: Box::new(source),
            decoder: UTF_16LE.new_decoder_without_bom_handling(),
        };
        let skipped = reader.read_text()?;
        debug!(
            path = %reader.path.display(),
            skipped_chars = skipped.chars().count(),
            "opened chat log"
        );

        Ok(reader)
    }

    /// Path of the file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read everything appended since the last call and split it into messages.
    /// Returns an empty list when nothing new has been written.
    pub fn read_messages(&mut self) -> io::Result<Vec<String>> {
        let text = self.read_text()?;
        Ok(split_messages(&text))
    }

    fn read_text(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        self.source.read_to_end(&mut bytes)?;

        let mut text = String::new();
        if bytes.is_empty() {
            return Ok(text);
        }

        let capacity = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "chat log read too large"))?;
        text.reserve(capacity);
        let (_, _, had_errors) = self.decoder.decode_to_string(&bytes, &mut text, false);
        if had_errors {
            debug!(path = %self.path.display(), "replaced malformed UTF-16 in chat log");
        }

        Ok(text)
    }
}

impl Drop for ChatLogReader {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "closed chat log");
    }
}

/// Split decoded text on the message delimiter, dropping the delimiter,
/// trailing whitespace and empty fragments.
pub fn split_messages(text: &str) -> Vec<String> {
    text.split(MESSAGE_DELIMITER)
        .map(|fragment| fragment.trim_end())
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}
