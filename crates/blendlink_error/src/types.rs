//! Main error type and Result alias

use crate::kinds::{LinkErrorKind, ParserErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the blendlink crates
pub type Result<T> = std::result::Result<T, BlendLinkError>;

/// Unified error type for the blendlink toolkit
///
/// Errors are grouped by domain; every variant carries a message plus
/// whatever context was known at the point of failure.
#[derive(Error, Debug)]
pub enum BlendLinkError {
    /// I/O failures from the underlying byte source
    #[error("I/O error: {message}")]
    Io {
        message: String,
        file_path: Option<PathBuf>,
        source_message: Option<String>,
    },

    /// Failures while decoding the container, header, chunks or schema
    #[error("Parse error: {message} ({kind})")]
    Parser {
        message: String,
        file_path: Option<PathBuf>,
        chunk_index: Option<usize>,
        kind: ParserErrorKind,
    },

    /// Failures while matching schemas or relocating blocks
    #[error("Link error: {message} ({kind})")]
    Link {
        message: String,
        struct_name: Option<String>,
        chunk_index: Option<usize>,
        kind: LinkErrorKind,
    },
}
