//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failures raised while reading a Quetzal save or a story file header.
///
/// All variants are non-retriable: they describe the artifact itself, so the
/// caller rejects the upload rather than trying again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The blob is not a `FORM`/`IFZS` container.
    InvalidFormat,
    /// The first sub-chunk is not `IFhd`.
    MissingHeaderChunk,
    /// The `IFhd` chunk declares a size other than 13 bytes.
    InvalidHeaderSize(u32),
    /// The serial field is not six ASCII decimal digits.
    InvalidSerial(String),
    /// The blob ends before the fields it declares.
    Truncated,
    /// The save was written by a different story file.
    Mismatch,
}

impl Display for HeaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid file format"),
            Self::MissingHeaderChunk => write!(f, "file does not start with an IFhd chunk"),
            Self::InvalidHeaderSize(size) => write!(f, "invalid size for IFhd chunk: {size}"),
            Self::InvalidSerial(raw) => write!(f, "invalid serial code: {raw:?}"),
            Self::Truncated => write!(f, "file is truncated"),
            Self::Mismatch => write!(f, "save file belongs to a different story"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Save or story header could not be parsed.
    Header(HeaderError),
    /// A process or session already exists where a new one was requested.
    AlreadyRunning(String),
    /// Input or termination was requested for a process that is not running.
    NotRunning(String),
    /// The interpreter process could not be spawned or driven.
    Process(String),
    /// The messaging collaborator refused or failed an outbound message.
    Delivery(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
    /// An arbitration mode name was not recognised.
    InvalidMode(String),
    /// Inbound stream framing or decoding failure.
    Codec(String),
    /// A channel id or file name would resolve outside its directory.
    PathViolation(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Header(err) => write!(f, "header: {err}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::NotRunning(msg) => write!(f, "not running: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Delivery(msg) => write!(f, "delivery: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::InvalidMode(msg) => write!(f, "invalid mode: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Message suitable for showing to a chat user, without the category
    /// prefix used in logs.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Header(err) => err.to_string(),
            Self::Config(msg)
            | Self::Io(msg)
            | Self::AlreadyRunning(msg)
            | Self::NotRunning(msg)
            | Self::Process(msg)
            | Self::Delivery(msg)
            | Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::InvalidMode(msg)
            | Self::Codec(msg)
            | Self::PathViolation(msg) => msg.clone(),
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<HeaderError> for AppError {
    fn from(err: HeaderError) -> Self {
        Self::Header(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
