//! Chunk record header codec
//!
//! A chunk stream is a sequence of fixed-shape record headers, each followed
//! by its payload. The header exists in two on-disk widths (32-bit and
//! 64-bit old-address) and may need byte-swapping when the file was written
//! on a foreign-endian machine. A cross-width compatibility mode reads the
//! other width's record while keeping every non-address field at its
//! declared width.

use blendlink_error::{BlendLinkError, ParserErrorKind, Result};

/// File-space address of a chunk as it existed in the writing process.
///
/// Never a dereferenceable pointer; used purely as an identity key into the
/// address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct OldAddress(pub u64);

impl OldAddress {
    pub const NULL: OldAddress = OldAddress(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Keep only the low 32 bits, as when narrowing into a 32-bit record.
    pub fn narrowed(&self) -> OldAddress {
        OldAddress(self.0 & 0xFFFF_FFFF)
    }
}

impl std::fmt::Display for OldAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// End-of-stream sentinel record code
pub const CODE_ENDB: [u8; 4] = *b"ENDB";
/// Record code carrying the file's embedded schema blob
pub const CODE_DNA1: [u8; 4] = *b"DNA1";
/// Generic data record code
pub const CODE_DATA: [u8; 4] = *b"DATA";
/// Magic prefix of a schema blob; a record boundary starting with these
/// bytes is a legacy bare schema stream
pub const SCHEMA_MAGIC: [u8; 4] = *b"SDNA";

/// Reserved "all ones" length, rejected as invalid
pub const INVALID_LENGTH: u32 = u32::MAX;

/// Fixed chunk record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHead {
    pub code: [u8; 4],
    /// Payload byte length
    pub length: u32,
    pub old: OldAddress,
    /// Index into the writing schema's struct table
    pub sdna_index: u32,
    /// Number of consecutive same-typed elements in the payload
    pub count: u32,
}

impl ChunkHead {
    pub fn code_string(&self) -> String {
        self.code
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }
}

/// Decoding configuration for one chunk stream
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecFlags {
    /// Records carry 64-bit old-addresses
    pub wide_addresses: bool,
    /// The stream was written foreign-endian; swap every multi-byte field
    pub swap: bool,
    /// Read the record of the *other* width, translating only the address
    pub cross_width: bool,
}

impl CodecFlags {
    /// Byte size of one record header under these flags.
    pub fn head_size(&self) -> usize {
        let wide = self.wide_addresses != self.cross_width;
        if wide { 4 + 4 + 8 + 4 + 4 } else { 4 + 4 + 4 + 4 + 4 }
    }
}

#[inline]
fn read_u32_at(data: &[u8], offset: usize, swap: bool) -> u32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    let value = u32::from_ne_bytes(bytes);
    if swap { value.swap_bytes() } else { value }
}

#[inline]
fn read_u64_at(data: &[u8], offset: usize, swap: bool) -> u64 {
    let bytes: [u8; 8] = data[offset..offset + 8].try_into().unwrap();
    let value = u64::from_ne_bytes(bytes);
    if swap { value.swap_bytes() } else { value }
}

/// Parse one chunk record header at `offset`.
///
/// Returns the header plus the number of bytes consumed. In cross-width
/// mode the other width's record is read and only the address field is
/// narrowed (low 32 bits kept) or widened (zero-extended).
pub fn read_chunk_head(data: &[u8], offset: usize, flags: CodecFlags) -> Result<(ChunkHead, usize)> {
    let head_size = flags.head_size();
    if offset + head_size > data.len() {
        return Err(BlendLinkError::short_read(format!(
            "chunk header at offset {offset} needs {head_size} bytes, {} available",
            data.len().saturating_sub(offset)
        )));
    }

    // The record width actually present on disk
    let wide = flags.wide_addresses != flags.cross_width;

    let mut code: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    if flags.swap {
        let mut value = u32::from_ne_bytes(code).swap_bytes();
        // Two-character codes were historically packed into the upper half
        // on the opposite endianness; shift them back down.
        if value & 0xFFFF == 0 {
            value >>= 16;
        }
        code = value.to_ne_bytes();
    }

    let mut cursor = offset + 4;
    let length = read_u32_at(data, cursor, flags.swap);
    cursor += 4;

    let old = if wide {
        let address = read_u64_at(data, cursor, flags.swap);
        cursor += 8;
        if flags.cross_width {
            // Narrowing into a 32-bit field keeps the low 32 bits
            OldAddress(address).narrowed()
        } else {
            OldAddress(address)
        }
    } else {
        let address = read_u32_at(data, cursor, flags.swap) as u64;
        cursor += 4;
        OldAddress(address)
    };

    let sdna_index = read_u32_at(data, cursor, flags.swap);
    cursor += 4;
    let count = read_u32_at(data, cursor, flags.swap);
    cursor += 4;

    if length == INVALID_LENGTH {
        return Err(BlendLinkError::parser(
            format!("chunk at offset {offset} declares the reserved all-ones length"),
            ParserErrorKind::InvalidChunkLength,
        ));
    }

    let head = ChunkHead {
        code,
        length,
        old,
        sdna_index,
        count,
    };
    Ok((head, cursor - offset))
}

/// Encode one chunk record header into `out`, returning bytes written.
pub fn write_chunk_head(out: &mut Vec<u8>, head: &ChunkHead, wide_addresses: bool) -> usize {
    let start = out.len();
    out.extend_from_slice(&head.code);
    out.extend_from_slice(&head.length.to_ne_bytes());
    if wide_addresses {
        out.extend_from_slice(&head.old.0.to_ne_bytes());
    } else {
        out.extend_from_slice(&(head.old.narrowed().0 as u32).to_ne_bytes());
    }
    out.extend_from_slice(&head.sdna_index.to_ne_bytes());
    out.extend_from_slice(&head.count.to_ne_bytes());
    out.len() - start
}

/// Encode a full chunk record: header immediately followed by
/// `head.length` payload bytes.
pub fn write_chunk(out: &mut Vec<u8>, head: &ChunkHead, payload: &[u8], wide_addresses: bool) -> usize {
    debug_assert_eq!(head.length as usize, payload.len());
    let written = write_chunk_head(out, head, wide_addresses);
    out.extend_from_slice(payload);
    written + payload.len()
}
