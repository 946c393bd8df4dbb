//! Database Layer
//!
//! Everything that talks to the embedded libsql engine:
//!
//! - [`SqlGateway`] - the single connection, scoped transactions, batches
//! - [`Statement`] / [`Identifier`] / [`SqlValue`] - identifier-safe statement building
//! - [`FreeformSql`] - caller-written SQL with separated identifiers and values
//! - `sql_parser` - sqlparser tokenizing and statement classification
//! - [`schema`] - the `ds__*` metadata tables

mod error;
mod freeform;
mod gateway;
pub mod schema;
mod sql_parser;
mod statement;

pub use error::DatabaseError;
pub use freeform::FreeformSql;
pub use gateway::{Journal, SqlExecutor, SqlGateway, Transaction, MEMORY_PATH};
pub(crate) use gateway::percent;
pub use statement::{Identifier, SqlRow, SqlValue, Statement, StatementBuilder, StatementKind};
