//! Chat line parsing.
//!
//! Every chat line has the shape `[ YYYY.MM.DD HH:MM:SS ] Author > body`,
//! where the body may continue over several lines.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static CHAT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*\[\s(?P<timestamp>[^\]\n]*?)\s\]\s(?P<author>[^\n]*?)\s>\s(?P<body>.*)$")
        .expect("valid regex")
});

const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// A parsed chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub timestamp: NaiveDateTime,
    pub author: String,
    pub body: String,
    /// The raw text the message was parsed from
    pub line: String,
    /// Hash of `body`, for downstream de-duplication
    pub fingerprint: i32,
}

/// Parse one raw message unit. Returns `None` when the text is not a chat line.
pub fn parse_message(raw: &str) -> Option<ChatMessage> {
    let caps = CHAT_LINE.captures(raw)?;
    let timestamp =
        NaiveDateTime::parse_from_str(caps.name("timestamp")?.as_str(), TIMESTAMP_FORMAT).ok()?;
    let body = caps.name("body")?.as_str();

    Some(ChatMessage {
        timestamp,
        author: caps.name("author")?.as_str().to_string(),
        body: body.to_string(),
        line: raw.to_string(),
        fingerprint: fingerprint(body),
    })
}

/// MurmurHash3 (x86, 32-bit, seed 0) of the UTF-8 text, as a signed integer.
pub fn fingerprint(text: &str) -> i32 {
    murmur3_32(text.as_bytes(), 0) as i32
}

fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut blocks = data.chunks_exact(4);

    for block in &mut blocks {
        let mut k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k |= (*byte as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
