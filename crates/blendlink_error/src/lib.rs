//! # blendlink_error - Unified Error Handling
//!
//! This crate provides the error system shared by the blendlink crates:
//! - Consistent error types across the parser, linker and writer layers
//! - Contextual information (file paths, chunk indices, struct names)
//! - Fine-grained error kinds for programmatic handling
//!
//! ## Module Organization
//!
//! - [`types`] - Main error type and Result alias
//! - [`kinds`] - Error kind enums for fine-grained categorization
//! - [`helpers`] - Constructors for standardized errors
//! - [`conversions`] - Type conversions and contextual methods

pub use kinds::*;
pub use types::*;

pub mod conversions;
pub mod helpers;
pub mod kinds;
pub mod types;
