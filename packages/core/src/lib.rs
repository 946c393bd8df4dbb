//! DataSpace Core - Local Data-Space Engine
//!
//! This crate keeps tables, documents and automation scripts in one local
//! libsql database: a catalog of content nodes, user tables with field
//! metadata, saved views, markdown documents, prompts and actions, and
//! undo/redo over every compound change.
//!
//! # Architecture
//!
//! - **One connection**: a single libsql connection behind an async mutex is
//!   the execution queue; compound operations hold it for one transaction
//! - **Catalog + physical tables**: `ds__tree` lists every node, a table node
//!   `<id>` is backed by the physical table `tb_<id>`
//! - **Safe SQL composition**: identifiers and values are separate types, so
//!   caller input is never spliced into SQL text
//! - **Journaled undo**: every mutation is recorded with statements that revert
//!   it, in the same transaction as the mutation
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, UiColumn, View, Script, ...)
//! - [`services`] - Catalog, schema, views, documents, scripts, undo and the `DataSpace` facade
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - `DataSpaceConfig`
//! - [`utils`] - Markdown helpers

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{DataSpaceConfig, UndoConfig};
pub use db::{FreeformSql, Identifier, SqlRow, SqlValue, StatementKind};
pub use models::*;
pub use services::{DataSpace, DataSpaceError, ScriptHandle, SqlOutcome, UndoStack, UNTITLED};
pub use utils::{extract_code_blocks, markdown_title, CodeBlock};
