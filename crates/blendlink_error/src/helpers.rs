//! Constructors for standardized errors

use crate::kinds::*;
use crate::types::BlendLinkError;
use std::path::PathBuf;

impl BlendLinkError {
    /// Create a new I/O error
    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io {
            message: message.into(),
            file_path: None,
            source_message: None,
        }
    }

    /// Create a new I/O error with file path context
    pub fn io_with_path<M: Into<String>, P: Into<PathBuf>>(message: M, path: P) -> Self {
        Self::Io {
            message: message.into(),
            file_path: Some(path.into()),
            source_message: None,
        }
    }

    /// Create a new parse-side error
    pub fn parser<M: Into<String>>(message: M, kind: ParserErrorKind) -> Self {
        Self::Parser {
            message: message.into(),
            file_path: None,
            chunk_index: None,
            kind,
        }
    }

    /// Create a new link-side error
    pub fn link<M: Into<String>>(message: M, kind: LinkErrorKind) -> Self {
        Self::Link {
            message: message.into(),
            struct_name: None,
            chunk_index: None,
            kind,
        }
    }

    /// Shorthand for the short-read condition
    pub fn short_read<M: Into<String>>(message: M) -> Self {
        Self::parser(message, ParserErrorKind::ReadFailure)
    }
}
