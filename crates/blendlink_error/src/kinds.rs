//! Error kind enums for the parser and linker domains
//!
//! These categorize errors within each domain for programmatic handling;
//! the human-readable context lives on the enclosing [`crate::BlendLinkError`].

use thiserror::Error;

/// Specific kinds of parse-side errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserErrorKind {
    #[error("Invalid file header")]
    InvalidHeader,
    #[error("Invalid magic bytes")]
    InvalidMagic,
    #[error("Unsupported file version")]
    UnsupportedVersion,
    #[error("Invalid chunk length")]
    InvalidChunkLength,
    #[error("Short read")]
    ReadFailure,
    #[error("Missing schema chunk")]
    NoSchemaFound,
    #[error("Schema parsing error")]
    SchemaError,
    #[error("Schema table overflow")]
    SchemaTableOverflow,
    #[error("Invalid data structure")]
    InvalidData,
    #[error("Invalid chunk index")]
    InvalidChunkIndex,
    #[error("Size limit exceeded")]
    SizeLimitExceeded,
    #[error("Compression not supported")]
    UnsupportedCompression,
    #[error("Decompression failed")]
    DecompressionFailed,
    #[error("Operation not supported")]
    Unsupported,
}

/// Specific kinds of schema-link and relocation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkErrorKind {
    #[error("Struct matching failed")]
    StructMatchFailed,
    #[error("Conflicting duplicate address")]
    DuplicateAddress,
    #[error("Block relocation failed")]
    RelocationFailed,
}
