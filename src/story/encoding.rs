//! Single-byte text encoding used on the interpreter's pipes.
//!
//! Story files may use the upper half of the byte range for accented letters
//! and special glyphs, so input is written as Latin-1 rather than UTF-8.

use serde::Deserialize;

/// Replacement byte for characters outside Latin-1.
const UNMAPPABLE: u8 = b'?';

/// How interpreter output bytes are decoded into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputEncoding {
    /// Every byte maps to the code point of the same value.
    #[default]
    Latin1,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Utf8,
}

impl OutputEncoding {
    /// Decode `bytes` without ever failing.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Latin1 => decode_latin1(bytes),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Decode Latin-1 bytes. Total: every byte has a code point.
#[must_use]
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode `text` as Latin-1, substituting `?` for unmappable characters.
#[must_use]
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(UNMAPPABLE))
        .collect()
}
