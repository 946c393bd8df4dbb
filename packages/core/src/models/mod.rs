//! Data Models
//!
//! Plain data carried between the data space and its callers:
//!
//! - [`Node`] - catalog entries for tables, documents, scripts and actions
//! - [`UiColumn`] / [`FieldType`] - field metadata of user tables
//! - [`View`] / [`SelectStatement`] - saved views and their structured queries
//! - [`Script`] / [`ActionDefinition`] - prompts and linear actions
//! - [`ValidationError`] - input rejected before it reaches the engine

mod field;
mod import;
mod node;
mod query;
mod script;
mod template;
mod validation;
mod view;

pub use field::{FieldType, SelectOption, UiColumn, ROW_ID_COLUMN, TITLE_COLUMN};
pub use import::{ImportColumn, TableImport};
pub use node::{new_node_id, physical_table_name, table_id_from_name, Node, NodeType, NodeUpdate};
pub(crate) use node::timestamp_now;
pub use query::{SelectStatement, SortDirection};
pub use script::{
    ActionCall, ActionDefinition, ActionParam, BuiltinCall, CallArgument, Script, ScriptFilter,
    ScriptType,
};
pub use template::ArgTemplate;
pub use validation::ValidationError;
pub use view::{View, ViewPatch, ViewType, DEFAULT_VIEW_NAME};
