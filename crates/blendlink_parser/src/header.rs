//! Outer file header codec
//!
//! The first 12 bytes of a file: a 7-byte magic, a pointer-width marker
//! (`'_'` for 32-bit files, `'-'` for 64-bit), an endian marker (`'v'`
//! little, `'V'` big) and a 3-ASCII-digit version. A second magic denotes
//! the stripped variant, which parses identically.

use blendlink_error::{BlendLinkError, ParserErrorKind, Result};

/// Primary 7-byte magic
pub const MAGIC: [u8; 7] = *b"BLENDER";
/// Alternate magic marking a stripped file (no user-data chunks guaranteed)
pub const MAGIC_STRIPPED: [u8; 7] = *b"BLENDSK";

/// Byte size of the header
pub const HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendHeader {
    pub magic: [u8; 7],
    /// Pointer width of the writing process, 4 or 8
    pub pointer_size: u8,
    pub is_little_endian: bool,
    /// Three-digit version, e.g. 305
    pub version: u32,
}

impl BlendHeader {
    /// Decode the 12-byte header from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<BlendHeader> {
        if data.len() < HEADER_SIZE {
            return Err(BlendLinkError::short_read(
                "file too small to contain a header",
            ));
        }

        let magic: [u8; 7] = data[0..7].try_into().unwrap();
        if magic != MAGIC && magic != MAGIC_STRIPPED {
            return Err(BlendLinkError::parser(
                format!("unrecognized magic bytes: {magic:?}"),
                ParserErrorKind::InvalidMagic,
            ));
        }

        let pointer_size = match data[7] {
            b'_' => 4,
            b'-' => 8,
            other => {
                return Err(BlendLinkError::parser(
                    format!("invalid pointer-width marker: {:?}", other as char),
                    ParserErrorKind::InvalidHeader,
                ));
            }
        };

        let is_little_endian = match data[8] {
            b'v' => true,
            b'V' => false,
            other => {
                return Err(BlendLinkError::parser(
                    format!("invalid endian marker: {:?}", other as char),
                    ParserErrorKind::InvalidHeader,
                ));
            }
        };

        let digits = &data[9..12];
        if !digits.iter().all(|c| c.is_ascii_digit()) {
            return Err(BlendLinkError::parser(
                "non-numeric version field",
                ParserErrorKind::InvalidHeader,
            ));
        }
        let version = (digits[0] - b'0') as u32 * 100
            + (digits[1] - b'0') as u32 * 10
            + (digits[2] - b'0') as u32;

        Ok(BlendHeader {
            magic,
            pointer_size,
            is_little_endian,
            version,
        })
    }

    /// Encode the header back to its 12-byte form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..7].copy_from_slice(&self.magic);
        out[7] = if self.pointer_size == 4 { b'_' } else { b'-' };
        out[8] = if self.is_little_endian { b'v' } else { b'V' };
        out[9] = b'0' + ((self.version / 100) % 10) as u8;
        out[10] = b'0' + ((self.version / 10) % 10) as u8;
        out[11] = b'0' + (self.version % 10) as u8;
        out
    }

    pub fn is_stripped(&self) -> bool {
        self.magic == MAGIC_STRIPPED
    }

    /// True when the file's byte order differs from the host's.
    pub fn needs_swap(&self) -> bool {
        self.is_little_endian != cfg!(target_endian = "little")
    }
}
