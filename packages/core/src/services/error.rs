//! Data Space Error Types
//!
//! The error every public [`DataSpace`](crate::services::DataSpace) operation
//! returns. Engine errors pass through unmodified; gateway errors are unpacked
//! so callers can match on validation and transaction failures directly.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataSpaceError {
    /// Input rejected before any statement ran
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Operation conflicts with current state (id collision, last view, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Error reported by the embedded engine
    #[error(transparent)]
    Engine(#[from] libsql::Error),

    /// Rollback or commit failed after the body had finished
    #[error("Transaction aborted: {context}")]
    TransactionAborted { context: String },

    /// Connection, path or initialization failure
    #[error("Database error: {0}")]
    Database(DatabaseError),

    /// Operation needs `init()` first
    #[error("Data space is not initialized")]
    NotInitialized,

    /// Undo/redo requested while undo tracking is disabled
    #[error("Undo is disabled for this data space")]
    UndoUnavailable,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DatabaseError> for DataSpaceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Engine(e) => Self::Engine(e),
            DatabaseError::Validation(e) => Self::Validation(e),
            DatabaseError::TransactionAborted { context } => Self::TransactionAborted { context },
            DatabaseError::Serialization(e) => Self::Serialization(e),
            other => Self::Database(other),
        }
    }
}

impl DataSpaceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::not_found("Node", id)
    }

    pub fn view_not_found(id: impl Into<String>) -> Self {
        Self::not_found("View", id)
    }

    pub fn script_not_found(id: impl Into<String>) -> Self {
        Self::not_found("Script", id)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
