//! Story text handling: byte encodings and message composition.

pub mod compositor;
pub mod encoding;

pub use compositor::{compose, ComposeOptions, DEFAULT_MESSAGE_LIMIT, MIN_MESSAGE_LIMIT};
pub use encoding::OutputEncoding;
