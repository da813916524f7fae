//! Save path: reflect relocated data back to a file image
//!
//! The writer emits the header, every live chunk (new-space addresses
//! become the written old-addresses, struct indices are remapped to the
//! reference schema), the reference schema as the `DNA1` chunk, and the
//! end sentinel. Only the native layout the reference schema was compiled
//! for is supported; asking for another word size or endianness is an
//! explicit error, not a silent hybrid file.

use crate::codec::{ChunkHead, OldAddress, write_chunk};
use crate::header::{BlendHeader, MAGIC};
use crate::{BlendData, Relinker};
use blendlink_error::{BlendLinkError, ParserErrorKind, Result};
use log::debug;

/// Target layout for the save path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub pointer_size: u8,
    pub little_endian: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            pointer_size: std::mem::size_of::<usize>() as u8,
            little_endian: cfg!(target_endian = "little"),
        }
    }
}

/// Serialize a parsed file back into a complete image.
pub fn to_bytes(relinker: &Relinker, data: &BlendData, options: &WriteOptions) -> Result<Vec<u8>> {
    let native = WriteOptions::default();
    if *options != native {
        return Err(BlendLinkError::parser(
            format!(
                "writing {}-bit {}-endian output is not implemented (native is {}-bit {}-endian)",
                options.pointer_size * 8,
                if options.little_endian { "little" } else { "big" },
                native.pointer_size * 8,
                if native.little_endian { "little" } else { "big" },
            ),
            ParserErrorKind::Unsupported,
        ));
    }

    let header = BlendHeader {
        magic: MAGIC,
        pointer_size: options.pointer_size,
        is_little_endian: options.little_endian,
        version: data.header().version,
    };

    let mut out = Vec::new();
    out.extend_from_slice(&header.encode());

    let wide = options.pointer_size == 8;
    let mut written = 0usize;
    for chunk in data.chunks() {
        let Some(payload) = chunk.data() else { continue };
        let head = ChunkHead {
            code: chunk.head.code,
            length: payload.len() as u32,
            old: OldAddress(chunk.new_address),
            // Payloads are in reference layout now; raw pointer arrays
            // keep struct 0 like any other typeless data block
            sdna_index: chunk.memory_struct.unwrap_or(0),
            count: chunk.head.count,
        };
        write_chunk(&mut out, &head, payload, wide);
        written += 1;
    }

    let blob = relinker.reference_blob();
    let dna_head = ChunkHead {
        code: *b"DNA1",
        length: blob.len() as u32,
        old: OldAddress::NULL,
        sdna_index: 0,
        count: 1,
    };
    write_chunk(&mut out, &dna_head, blob, wide);

    let end_head = ChunkHead {
        code: *b"ENDB",
        length: 0,
        old: OldAddress::NULL,
        sdna_index: 0,
        count: 0,
    };
    write_chunk(&mut out, &end_head, &[], wide);

    debug!("wrote {written} chunks, {} bytes total", out.len());
    Ok(out)
}

/// Serialize to a file on disk.
pub fn write_to_path<P: AsRef<std::path::Path>>(
    relinker: &Relinker,
    data: &BlendData,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(relinker, data, &WriteOptions::default())?;
    std::fs::write(path, bytes).map_err(|err| BlendLinkError::from(err).with_file_path(path))?;
    Ok(())
}
