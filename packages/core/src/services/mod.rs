//! Data Space Services
//!
//! The components that keep the catalog, the physical tables and their
//! metadata consistent:
//!
//! - `Catalog` - the `ds__tree` node registry
//! - `PhysicalTables` - DDL and row writes on `tb_<id>` tables
//! - `SchemaIntrospector` - physical columns joined with field metadata
//! - `ViewManager` - saved views and structured query edits
//! - `DocumentStore` - markdown content of documents
//! - `ScriptRegistry` - prompts and actions
//! - `UndoLog` - the undo/redo stacks
//! - `DataSpace` - the session facade running all of the above in transactions
//!
//! Components are stateless; they take the executor or transaction to work on.

pub mod catalog;
pub mod data_space;
pub mod document_store;
pub mod error;
pub mod physical_tables;
pub mod script_registry;
mod snapshot;
pub mod ui_columns;
pub mod undo;
pub mod view_service;

pub use catalog::Catalog;
pub use data_space::{DataSpace, ScriptHandle, SqlOutcome, UNTITLED};
pub use document_store::DocumentStore;
pub use error::DataSpaceError;
pub use physical_tables::{PhysicalColumn, PhysicalTables};
pub use script_registry::ScriptRegistry;
pub use ui_columns::SchemaIntrospector;
pub use undo::{UndoEntry, UndoLog, UndoStack};
pub use view_service::ViewManager;
