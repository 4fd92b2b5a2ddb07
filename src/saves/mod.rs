//! Save artifacts: Quetzal header matching and per-session save directories.

pub mod discovery;
pub mod quetzal;

pub use discovery::{SaveFile, SaveTracker, UPLOAD_SENTINEL};
pub use quetzal::{headers_match, parse_program_image, parse_save, HeaderData};
