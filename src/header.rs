//! Fixed 48-byte header that precedes the inner archive.
//!
//! # Layout
//! ```text
//! 0x00  magic            16 bytes  b"raw_nv" + 10 zero bytes
//! 0x10  compressed_size  u32 LE    length of the payload that follows
//! 0x14  checksum         u32 LE    byte sum of the payload, mod 2^32
//! 0x18  version          u32 LE    always 0x7FD0
//! 0x1c  fs_id            u32 LE    always 0x10000
//! 0x20  reserved         16 bytes  zero
//! ```
//!
//! Decoding is tolerant: a wrong magic tag is reported as a
//! [`HeaderWarning`], not an error, because some firmware writes
//! damaged tags.  Encoding always emits the canonical tag.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

pub const HEADER_SIZE:        usize = 0x30;
pub const MAGIC:              &[u8; 6] = b"raw_nv";
pub const MAGIC_FIELD_SIZE:   usize = 16;
pub const RESERVED_SIZE:      usize = 16;
pub const FORMAT_VERSION:     u32 = 0x7FD0;
pub const FS_ID:              u32 = 0x10000;

pub const MAGIC_OFFSET:           usize = 0x00;
pub const COMPRESSED_SIZE_OFFSET: usize = 0x10;
pub const CHECKSUM_OFFSET:        usize = 0x14;
pub const VERSION_OFFSET:         usize = 0x18;
pub const FS_ID_OFFSET:           usize = 0x1c;
pub const RESERVED_OFFSET:        usize = 0x20;

// ── Errors and warnings ──────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Malformed header: need {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },
}

/// Non-fatal findings about a decoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderWarning {
    MagicMismatch { found: [u8; MAGIC_FIELD_SIZE] },
    SizeMismatch { recorded: u32, actual: u64 },
    ChecksumMismatch { recorded: u32, computed: u32 },
    UnexpectedVersion { found: u32 },
    UnexpectedFsId { found: u32 },
}

impl fmt::Display for HeaderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderWarning::MagicMismatch { found } => write!(
                f,
                "magic tag is different: found {:?} ({}), expected {:?}",
                String::from_utf8_lossy(trim_nul(found)),
                hex::encode(found),
                String::from_utf8_lossy(MAGIC),
            ),
            HeaderWarning::SizeMismatch { recorded, actual } => write!(
                f,
                "compressed size field says {recorded} bytes but {actual} bytes follow the header"
            ),
            HeaderWarning::ChecksumMismatch { recorded, computed } => write!(
                f,
                "checksum field is 0x{recorded:08X} but payload sums to 0x{computed:08X}"
            ),
            HeaderWarning::UnexpectedVersion { found } => write!(
                f,
                "version field is 0x{found:04X}, expected 0x{FORMAT_VERSION:04X}"
            ),
            HeaderWarning::UnexpectedFsId { found } => write!(
                f,
                "fs id field is 0x{found:04X}, expected 0x{FS_ID:04X}"
            ),
        }
    }
}

// ── HeaderRecord ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub magic:           [u8; MAGIC_FIELD_SIZE],
    pub compressed_size: u32,
    pub checksum:        u32,
    pub version:         u32,
    pub fs_id:           u32,
    pub reserved:        [u8; RESERVED_SIZE],
}

impl HeaderRecord {
    /// Canonical header for a payload of `compressed_size` bytes summing to `checksum`.
    pub fn new(compressed_size: u32, checksum: u32) -> Self {
        Self {
            magic: canonical_magic(),
            compressed_size,
            checksum,
            version: FORMAT_VERSION,
            fs_id: FS_ID,
            reserved: [0u8; RESERVED_SIZE],
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.fs_id)?;
        writer.write_all(&self.reserved)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut magic = [0u8; MAGIC_FIELD_SIZE];
        reader.read_exact(&mut magic)?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let checksum = reader.read_u32::<LittleEndian>()?;
        let version = reader.read_u32::<LittleEndian>()?;
        let fs_id = reader.read_u32::<LittleEndian>()?;
        let mut reserved = [0u8; RESERVED_SIZE];
        reader.read_exact(&mut reserved)?;
        Ok(Self {
            magic,
            compressed_size,
            checksum,
            version,
            fs_id,
            reserved,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[MAGIC_OFFSET..COMPRESSED_SIZE_OFFSET].copy_from_slice(&self.magic);
        out[COMPRESSED_SIZE_OFFSET..CHECKSUM_OFFSET].copy_from_slice(&self.compressed_size.to_le_bytes());
        out[CHECKSUM_OFFSET..VERSION_OFFSET].copy_from_slice(&self.checksum.to_le_bytes());
        out[VERSION_OFFSET..FS_ID_OFFSET].copy_from_slice(&self.version.to_le_bytes());
        out[FS_ID_OFFSET..RESERVED_OFFSET].copy_from_slice(&self.fs_id.to_le_bytes());
        out[RESERVED_OFFSET..HEADER_SIZE].copy_from_slice(&self.reserved);
        out
    }

    /// The leading tag bytes, i.e. the first `MAGIC.len()` bytes of the magic field.
    pub fn magic_tag(&self) -> &[u8] {
        &self.magic[..MAGIC.len()]
    }

    /// Exact comparison of the whole 16-byte field, padding included.
    pub fn magic_matches(&self) -> bool {
        self.magic == canonical_magic()
    }

    /// Compare the recorded size/checksum/version/fs_id against `payload`.
    ///
    /// The magic tag is not re-checked here; [`decode_header`] reports it.
    pub fn validate_payload(&self, payload: &[u8]) -> Vec<HeaderWarning> {
        let mut warnings = Vec::new();
        if u64::from(self.compressed_size) != payload.len() as u64 {
            warnings.push(HeaderWarning::SizeMismatch {
                recorded: self.compressed_size,
                actual:   payload.len() as u64,
            });
        }
        let computed = compute_checksum(payload);
        if computed != self.checksum {
            warnings.push(HeaderWarning::ChecksumMismatch {
                recorded: self.checksum,
                computed,
            });
        }
        if self.version != FORMAT_VERSION {
            warnings.push(HeaderWarning::UnexpectedVersion { found: self.version });
        }
        if self.fs_id != FS_ID {
            warnings.push(HeaderWarning::UnexpectedFsId { found: self.fs_id });
        }
        warnings
    }

    pub fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            magic:           String::from_utf8_lossy(trim_nul(&self.magic)).into_owned(),
            magic_hex:       hex::encode(self.magic),
            compressed_size: self.compressed_size,
            checksum:        self.checksum,
            version:         self.version,
            fs_id:           self.fs_id,
        }
    }
}

/// Printable view of a header, used by `inspect --json`.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub magic:           String,
    pub magic_hex:       String,
    pub compressed_size: u32,
    pub checksum:        u32,
    pub version:         u32,
    pub fs_id:           u32,
}

// ── Codec entry points ───────────────────────────────────────────────────────

/// A decoded header together with the non-fatal findings about it.
#[derive(Debug, Clone)]
pub struct DecodedHeader {
    pub header:   HeaderRecord,
    pub warnings: Vec<HeaderWarning>,
}

/// Parse the first [`HEADER_SIZE`] bytes of `bytes`.
///
/// Fails only when fewer than [`HEADER_SIZE`] bytes are available; a wrong
/// magic tag yields [`HeaderWarning::MagicMismatch`] and decoding continues.
pub fn decode_header(bytes: &[u8]) -> Result<DecodedHeader, HeaderError> {
    if bytes.len() < HEADER_SIZE {
        return Err(HeaderError::Malformed {
            expected: HEADER_SIZE,
            actual:   bytes.len(),
        });
    }
    let header = HeaderRecord::read(Cursor::new(&bytes[..HEADER_SIZE])).map_err(|_| {
        HeaderError::Malformed {
            expected: HEADER_SIZE,
            actual:   bytes.len(),
        }
    })?;

    let mut warnings = Vec::new();
    if !header.magic_matches() {
        warnings.push(HeaderWarning::MagicMismatch { found: header.magic });
    }
    Ok(DecodedHeader { header, warnings })
}

/// Build the canonical header describing `payload`.
///
/// Payloads longer than `u32::MAX` bytes cannot be described by the format;
/// their size field wraps the same way the checksum does.
pub fn encode_header(payload: &[u8]) -> HeaderRecord {
    HeaderRecord::new(payload.len() as u32, compute_checksum(payload))
}

/// Unsigned sum of every byte, wrapping at 2^32.
pub fn compute_checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

fn canonical_magic() -> [u8; MAGIC_FIELD_SIZE] {
    let mut magic = [0u8; MAGIC_FIELD_SIZE];
    magic[..MAGIC.len()].copy_from_slice(MAGIC);
    magic
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}
