//! Quetzal save header and Z-machine story header parsing.
//!
//! Only the identity fields needed to decide whether a save belongs to a
//! story are read: release number, serial code and checksum. The save side
//! comes from the `IFhd` chunk of an IFF `FORM`/`IFZS` container; the story
//! side comes from fixed offsets in the story file header.
//!
//! All functions are pure and operate on bytes the caller already read.

use crate::errors::HeaderError;

/// Length of the `IFhd` chunk body.
pub const IFHD_LEN: usize = 13;

/// Size an `IFhd` chunk must declare in its chunk header.
const IFHD_DECLARED_SIZE: u32 = 13;

const FORM_ID: &[u8; 4] = b"FORM";
const IFZS_ID: &[u8; 4] = b"IFZS";
const IFHD_ID: &[u8; 4] = b"IFhd";

/// Offset of the first sub-chunk inside the `FORM` container.
const FIRST_CHUNK: usize = 12;

const STORY_RELEASE: usize = 0x02;
const STORY_SERIAL: usize = 0x12;
const STORY_CHECKSUM: usize = 0x1C;
const STORY_HEADER_MIN: usize = 0x1E;

/// Identity fields shared by a save file and the story it was made from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderData {
    /// Story release number.
    pub release: u16,
    /// Six-digit serial code, usually the compile date as `YYMMDD`.
    pub serial: String,
    /// Story file checksum; zero when the story was built without one.
    pub checksum: u16,
}

/// Complete `IFhd` chunk, including the program counter the interpreter
/// resumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfhdChunk {
    header: HeaderData,
    pc: u32,
}

impl IfhdChunk {
    /// Identity fields of the chunk.
    #[must_use]
    pub fn header(&self) -> &HeaderData {
        &self.header
    }

    /// Consume the chunk and keep only the identity fields.
    #[must_use]
    pub fn into_header(self) -> HeaderData {
        self.header
    }

    /// Serialise the chunk body back to its 13-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; IFHD_LEN] {
        let mut out = [0_u8; IFHD_LEN];
        out[0..2].copy_from_slice(&self.header.release.to_be_bytes());
        out[2..8].copy_from_slice(self.header.serial.as_bytes());
        out[8..10].copy_from_slice(&self.header.checksum.to_be_bytes());
        out[10..13].copy_from_slice(&self.pc.to_be_bytes()[1..]);
        out
    }
}

/// Parse the `IFhd` chunk of a Quetzal save and return its identity fields.
///
/// # Errors
///
/// - [`HeaderError::InvalidFormat`] if the blob is not a `FORM`/`IFZS` container.
/// - [`HeaderError::MissingHeaderChunk`] if the first sub-chunk is not `IFhd`.
/// - [`HeaderError::InvalidHeaderSize`] if `IFhd` is not exactly 13 bytes.
/// - [`HeaderError::InvalidSerial`] if the serial is not six decimal digits.
/// - [`HeaderError::Truncated`] if the blob ends inside the chunk.
pub fn parse_save(bytes: &[u8]) -> Result<HeaderData, HeaderError> {
    parse_ifhd(bytes).map(IfhdChunk::into_header)
}

/// Parse the full `IFhd` chunk of a Quetzal save.
///
/// # Errors
///
/// Same as [`parse_save`].
pub fn parse_ifhd(bytes: &[u8]) -> Result<IfhdChunk, HeaderError> {
    if bytes.len() < FIRST_CHUNK
        || &bytes[0..4] != FORM_ID
        || &bytes[8..FIRST_CHUNK] != IFZS_ID
    {
        return Err(HeaderError::InvalidFormat);
    }

    let chunk_header = bytes
        .get(FIRST_CHUNK..FIRST_CHUNK + 8)
        .ok_or(HeaderError::Truncated)?;
    if &chunk_header[0..4] != IFHD_ID {
        return Err(HeaderError::MissingHeaderChunk);
    }

    let size = u32::from_be_bytes([
        chunk_header[4],
        chunk_header[5],
        chunk_header[6],
        chunk_header[7],
    ]);
    if size != IFHD_DECLARED_SIZE {
        return Err(HeaderError::InvalidHeaderSize(size));
    }

    let body_start = FIRST_CHUNK + 8;
    let data = bytes
        .get(body_start..body_start + IFHD_LEN)
        .ok_or(HeaderError::Truncated)?;

    let release = read_word(data, 0);
    let serial = read_serial(&data[2..8])?;
    let checksum = read_word(data, 8);
    let pc = (u32::from(data[10]) << 16) | (u32::from(data[11]) << 8) | u32::from(data[12]);

    Ok(IfhdChunk {
        header: HeaderData {
            release,
            serial,
            checksum,
        },
        pc,
    })
}

/// Read the identity fields from a Z-machine story file header.
///
/// # Errors
///
/// - [`HeaderError::Truncated`] if the image is shorter than the header fields.
/// - [`HeaderError::InvalidSerial`] if the serial is not six decimal digits.
pub fn parse_program_image(bytes: &[u8]) -> Result<HeaderData, HeaderError> {
    if bytes.len() < STORY_HEADER_MIN {
        return Err(HeaderError::Truncated);
    }

    Ok(HeaderData {
        release: read_word(bytes, STORY_RELEASE),
        serial: read_serial(&bytes[STORY_SERIAL..STORY_SERIAL + 6])?,
        checksum: read_word(bytes, STORY_CHECKSUM),
    })
}

/// Decide whether a save was produced by the given story.
///
/// Release and serial must match exactly. The checksum must match too,
/// unless the story's checksum is zero, which marks a story compiled without
/// one.
#[must_use]
pub fn headers_match(save: &HeaderData, program: &HeaderData) -> bool {
    save.release == program.release
        && save.serial == program.serial
        && (program.checksum == 0 || save.checksum == program.checksum)
}

fn read_word(mem: &[u8], address: usize) -> u16 {
    u16::from_be_bytes([mem[address], mem[address + 1]])
}

fn read_serial(raw: &[u8]) -> Result<String, HeaderError> {
    if raw.iter().all(u8::is_ascii_digit) {
        // All bytes are ASCII digits, so each maps to a single char.
        Ok(raw.iter().map(|&b| char::from(b)).collect())
    } else {
        Err(HeaderError::InvalidSerial(
            raw.iter().map(|&b| char::from(b)).collect(),
        ))
    }
}
