//! Error conversions and contextual methods

use crate::kinds::{LinkErrorKind, ParserErrorKind};
use crate::types::BlendLinkError;
use std::path::PathBuf;

impl From<std::io::Error> for BlendLinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            file_path: None,
            source_message: Some(format!("IO Error: {err}")),
        }
    }
}

// === Contextual builder methods ===

impl BlendLinkError {
    /// Add file path context to any error type that carries one
    pub fn with_file_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        match &mut self {
            Self::Io { file_path, .. } => *file_path = Some(path.into()),
            Self::Parser { file_path, .. } => *file_path = Some(path.into()),
            Self::Link { .. } => {}
        }
        self
    }

    /// Add chunk index context to supported error types
    pub fn with_chunk_index(mut self, index: usize) -> Self {
        match &mut self {
            Self::Parser { chunk_index, .. } => *chunk_index = Some(index),
            Self::Link { chunk_index, .. } => *chunk_index = Some(index),
            Self::Io { .. } => {}
        }
        self
    }

    /// Add struct name context to link errors
    pub fn with_struct_name<S: Into<String>>(mut self, name: S) -> Self {
        if let Self::Link { struct_name, .. } = &mut self {
            *struct_name = Some(name.into());
        }
        self
    }
}

// === Accessors ===

impl BlendLinkError {
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { file_path, .. } => file_path.as_ref(),
            Self::Parser { file_path, .. } => file_path.as_ref(),
            Self::Link { .. } => None,
        }
    }

    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::Parser { chunk_index, .. } => *chunk_index,
            Self::Link { chunk_index, .. } => *chunk_index,
            Self::Io { .. } => None,
        }
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Self::Link { struct_name, .. } => struct_name.as_deref(),
            _ => None,
        }
    }

    pub fn parser_kind(&self) -> Option<&ParserErrorKind> {
        match self {
            Self::Parser { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn link_kind(&self) -> Option<&LinkErrorKind> {
        match self {
            Self::Link { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

// === Type checking methods ===

impl BlendLinkError {
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    pub fn is_parser(&self) -> bool {
        matches!(self, Self::Parser { .. })
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. })
    }
}
