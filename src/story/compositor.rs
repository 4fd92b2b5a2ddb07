//! Turns raw interpreter output into chat-sized story messages.
//!
//! The interpreter writes plain terminal text. Each flush of that text is
//! decoded, split into lines, stripped of the session's left margin, escaped
//! for the chat markup and packed into blocks that stay under the transport's
//! per-message character limit.

use super::encoding::OutputEncoding;

/// Maximum characters per outbound message accepted by the chat transport.
pub const DEFAULT_MESSAGE_LIMIT: usize = 2000;

/// Smallest usable limit: an escaped character plus its newline must fit
/// strictly below it.
pub const MIN_MESSAGE_LIMIT: usize = 4;

/// Characters that toggle emphasis in the outbound markup.
const MARKUP: [char; 3] = ['*', '_', '~'];

/// Per-session settings for [`compose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Columns dropped from the start of every line.
    pub indent: usize,
    /// Character limit per block; every block stays strictly below it.
    pub limit: usize,
    /// How output bytes are decoded.
    pub encoding: OutputEncoding,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            indent: 0,
            limit: DEFAULT_MESSAGE_LIMIT,
            encoding: OutputEncoding::default(),
        }
    }
}

/// Convert an output buffer into zero or more display-ready blocks.
///
/// Blocks are returned in output order. An empty result means there was
/// nothing worth sending.
#[must_use]
pub fn compose(bytes: &[u8], options: &ComposeOptions) -> Vec<String> {
    let text = options.encoding.decode(bytes);
    let limit = options.limit.max(MIN_MESSAGE_LIMIT);

    let mut blocks = Vec::new();
    let mut buffer = String::new();
    let mut buffered = 0_usize;

    for raw in text.lines() {
        let Some(line) = render_line(raw, options.indent) else {
            continue;
        };

        for piece in escaped_chunks(&line, limit - 2) {
            let len = piece.chars().count() + 1;
            if buffered + len >= limit {
                flush(&mut blocks, &buffer);
                buffer.clear();
                buffered = 0;
            }
            buffer.push_str(&piece);
            buffer.push('\n');
            buffered += len;
        }
    }

    let last = buffer.trim();
    if !last.is_empty() {
        blocks.push(last.to_owned());
    }

    blocks
}

/// Strip the margin from one terminal line, or `None` when it carries no
/// content.
fn render_line(raw: &str, indent: usize) -> Option<String> {
    // A lone period is the interpreter's stand-in for a blank paragraph.
    if raw.trim() == "." {
        return None;
    }
    Some(raw.chars().skip(indent).collect())
}

/// Escape markup and cut the result into chunks of at most `max_chars`
/// characters. A backslash always stays in the same chunk as the character
/// it escapes.
fn escaped_chunks(line: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    let mut len = 0_usize;

    for c in line.chars() {
        let width = if MARKUP.contains(&c) { 2 } else { 1 };
        if len + width > max_chars && len > 0 {
            chunks.push(std::mem::take(&mut chunk));
            len = 0;
        }
        if width == 2 {
            chunk.push('\\');
        }
        chunk.push(c);
        len += width;
    }

    if len > 0 || chunks.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

fn flush(blocks: &mut Vec<String>, buffer: &str) {
    if !buffer.trim().is_empty() {
        blocks.push(buffer.trim_end().to_owned());
    }
}
