//! Transparent decompression of file images
//!
//! Files may arrive zstd-framed, gzip-wrapped or zlib-wrapped. Detection is
//! by magic bytes; inflation is whole-buffer and in-memory. Anything
//! unrecognized passes through untouched.

use blendlink_error::{BlendLinkError, ParserErrorKind, Result};
use log::debug;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Gzip,
    Zlib,
    Zstd,
}

/// Parse-time knobs supplied by the caller
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Force a specific codec instead of sniffing magic bytes
    pub compression: Option<CompressionKind>,
    /// Upper bound for a single chunk's declared payload size
    pub max_chunk_size: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            compression: None,
            max_chunk_size: 100_000_000,
        }
    }
}

/// Sniff the compression codec from leading magic bytes.
pub fn detect(data: &[u8]) -> CompressionKind {
    if data.len() >= 4 && data[0..4] == [0x28, 0xB5, 0x2F, 0xFD] {
        return CompressionKind::Zstd;
    }
    if data.len() >= 2 {
        if data[0] == 0x1F && data[1] == 0x8B {
            return CompressionKind::Gzip;
        }
        if data[0] == 0x78 && matches!(data[1], 0x01 | 0x5E | 0x9C | 0xDA) {
            return CompressionKind::Zlib;
        }
    }
    CompressionKind::None
}

/// Inflate `data` according to `kind`; `None` passes through.
pub fn decompress(data: Vec<u8>, kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(data),
        CompressionKind::Gzip => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(&data[..])
                .read_to_end(&mut out)
                .map_err(|err| {
                    BlendLinkError::parser(
                        format!("gzip decode: {err}"),
                        ParserErrorKind::DecompressionFailed,
                    )
                })?;
            debug!("inflated gzip image: {} -> {} bytes", data.len(), out.len());
            Ok(out)
        }
        CompressionKind::Zlib => {
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(&data[..])
                .read_to_end(&mut out)
                .map_err(|err| {
                    BlendLinkError::parser(
                        format!("zlib decode: {err}"),
                        ParserErrorKind::DecompressionFailed,
                    )
                })?;
            debug!("inflated zlib image: {} -> {} bytes", data.len(), out.len());
            Ok(out)
        }
        CompressionKind::Zstd => {
            #[cfg(feature = "zstd")]
            {
                let mut decoder = zstd::stream::read::Decoder::new(&data[..]).map_err(|err| {
                    BlendLinkError::parser(
                        format!("zstd init: {err}"),
                        ParserErrorKind::DecompressionFailed,
                    )
                })?;
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).map_err(|err| {
                    BlendLinkError::parser(
                        format!("zstd decode: {err}"),
                        ParserErrorKind::DecompressionFailed,
                    )
                })?;
                debug!("inflated zstd image: {} -> {} bytes", data.len(), out.len());
                Ok(out)
            }
            #[cfg(not(feature = "zstd"))]
            {
                Err(BlendLinkError::parser(
                    "zstd support not compiled in",
                    ParserErrorKind::UnsupportedCompression,
                ))
            }
        }
    }
}

/// Sniff-and-inflate in one step, honoring an explicit override.
pub fn maybe_decompress(data: Vec<u8>, options: &ParseOptions) -> Result<Vec<u8>> {
    let kind = options.compression.unwrap_or_else(|| detect(&data));
    decompress(data, kind)
}
