//! Input Validation Errors
//!
//! Everything in this module is raised before a statement reaches the engine.

use thiserror::Error;

/// Malformed input rejected before any SQL is issued
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': expected letters, digits and underscores, not starting with a digit")]
    InvalidIdentifier(String),

    #[error("Static SQL text must not contain '?' placeholders; bind values instead: {0}")]
    InlinePlaceholder(String),

    #[error("Placeholder count mismatch: statement has {placeholders} placeholder(s) but {values} bound value(s)")]
    PlaceholderMismatch { placeholders: usize, values: usize },

    #[error("Numbered or named placeholders are not supported: {0}")]
    UnsupportedPlaceholder(String),

    #[error("Identifier hole '{{{0}}}' has no identifier bound")]
    MissingIdentifier(String),

    #[error("Identifier '{0}' was bound but never used")]
    UnusedIdentifier(String),

    #[error("Transaction control is managed by the data space: {0}")]
    TransactionControl(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unsupported query clause: {0}")]
    UnsupportedClause(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid node ID: {0}")]
    InvalidId(String),

    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown built-in call: {0}")]
    UnknownBuiltin(String),

    #[error("Unknown action parameter: {0}")]
    UnknownParameter(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ValidationError {
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
