//! Database Error Types
//!
//! Errors raised by the SQL gateway: opening the database file, initializing
//! the metadata tables, running statements and decoding result rows.
//! Domain-level failures (not found, conflicts) live in the service layer.

use crate::models::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Gateway errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open the database file
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to create the metadata tables or apply pragmas
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    #[error("Invalid database path: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// Error reported by the engine, passed through unmodified
    #[error(transparent)]
    Engine(#[from] libsql::Error),

    /// Statement rejected before reaching the engine
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A result row did not have the expected shape
    #[error("Unexpected value in column '{column}': expected {expected}")]
    RowDecode { column: String, expected: String },

    /// Rollback or commit itself failed
    #[error("Transaction aborted: {context}")]
    TransactionAborted { context: String },

    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabaseError {
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn invalid_path(path: PathBuf) -> Self {
        Self::InvalidPath { path }
    }

    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    pub fn row_decode(column: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::RowDecode {
            column: column.into(),
            expected: expected.into(),
        }
    }

    pub fn transaction_aborted(context: impl Into<String>) -> Self {
        Self::TransactionAborted {
            context: context.into(),
        }
    }
}
