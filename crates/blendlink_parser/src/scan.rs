//! Chunk-stream scanning
//!
//! Walks the record stream that follows the file header: one chunk header
//! plus payload per record, terminated by the `ENDB` sentinel. Payloads are
//! not copied here; the scanner records offsets into the underlying buffer.
//!
//! Legacy quirk: very old writers emitted the schema blob bare, without its
//! `DNA1` record header. A record boundary that starts directly with the
//! `SDNA` magic is resynthesized as a `DNA1` chunk covering the remaining
//! stream.

use crate::codec::{CODE_DNA1, CODE_ENDB, ChunkHead, CodecFlags, OldAddress, SCHEMA_MAGIC, read_chunk_head};
use blendlink_error::{BlendLinkError, ParserErrorKind, Result};
use log::{debug, trace};

/// One record located in the stream
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub head: ChunkHead,
    /// Offset of the record header within the buffer
    pub header_offset: usize,
    /// Offset of the payload within the buffer
    pub data_offset: usize,
}

/// Scan every chunk record from `start_offset` to the end sentinel.
pub fn scan_chunks(
    data: &[u8],
    start_offset: usize,
    flags: CodecFlags,
    max_chunk_size: u32,
) -> Result<Vec<RawChunk>> {
    let mut chunks = Vec::new();
    let mut offset = start_offset;
    let mut index = 0usize;

    loop {
        if offset + 4 <= data.len() && data[offset..offset + 4] == SCHEMA_MAGIC {
            // Bare schema blob: synthesize the canonical record around it
            let length = (data.len() - offset) as u32;
            trace!("bare SDNA stream at offset {offset}, resynthesizing DNA1 record");
            chunks.push(RawChunk {
                head: ChunkHead {
                    code: CODE_DNA1,
                    length,
                    old: OldAddress::NULL,
                    sdna_index: 0,
                    count: 1,
                },
                header_offset: offset,
                data_offset: offset,
            });
            break;
        }

        let (head, consumed) = read_chunk_head(data, offset, flags)
            .map_err(|err| err.with_chunk_index(index))?;
        let data_offset = offset + consumed;

        if head.code == CODE_ENDB {
            trace!("ENDB sentinel after {index} chunks");
            break;
        }

        if head.length > max_chunk_size {
            return Err(BlendLinkError::parser(
                format!(
                    "chunk {index} declares {} bytes, limit is {max_chunk_size}",
                    head.length
                ),
                ParserErrorKind::SizeLimitExceeded,
            )
            .with_chunk_index(index));
        }

        let end = data_offset + head.length as usize;
        if end > data.len() {
            return Err(BlendLinkError::short_read(format!(
                "chunk {index} payload ends at {end}, buffer is {} bytes",
                data.len()
            ))
            .with_chunk_index(index));
        }

        chunks.push(RawChunk {
            head,
            header_offset: offset,
            data_offset,
        });
        index += 1;
        offset = end;
    }

    debug!("scanned {} chunks", chunks.len());
    Ok(chunks)
}
