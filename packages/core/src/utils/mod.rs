//! Utility functions for DataSpace Core
//!
//! This module provides common utility functions used across the codebase.

mod markdown;

pub use markdown::{extract_code_blocks, markdown_title, CodeBlock};
