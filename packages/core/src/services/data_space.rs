//! DataSpace - the session facade
//!
//! One `DataSpace` owns one open database. Every public operation either reads
//! through the gateway or runs as a single transaction:
//!
//! 1. `begin` takes the connection (the one execution queue)
//! 2. the components read and write through the transaction, journaling each
//!    change with the statements that revert it
//! 3. on success the journal becomes one undo entry in the same transaction
//! 4. `finish` commits, or rolls back and returns the original error
//!
//! Free-form SQL runs outside this path and is never recorded for undo.
//!
//! # Examples
//!
//! ```no_run
//! # use dataspace_core::{DataSpace, DataSpaceConfig, SortDirection};
//! # #[tokio::main]
//! # async fn main() -> Result<(), dataspace_core::DataSpaceError> {
//! let space = DataSpace::open(DataSpaceConfig::new("/tmp/space.db")).await?;
//! let table_id = space.create_table("Tasks", None).await?;
//! let view = &space.list_views(&table_id).await?[0];
//! space.add_sort(&view.id, "title", SortDirection::Asc).await?;
//! space.undo().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::DataSpaceConfig;
use crate::db::{
    percent, DatabaseError, FreeformSql, Identifier, SqlExecutor, SqlGateway, SqlRow, SqlValue,
    StatementKind, Transaction,
};
use crate::models::{
    new_node_id, table_id_from_name, ActionDefinition, BuiltinCall, FieldType, Node, NodeType,
    NodeUpdate, Script, ScriptFilter, ScriptType, SelectOption, SortDirection,
    TableImport, UiColumn, ValidationError, View, ViewPatch, ROW_ID_COLUMN, TITLE_COLUMN,
};
use crate::services::{
    Catalog, DataSpaceError, DocumentStore, PhysicalTables, SchemaIntrospector, ScriptRegistry,
    UndoLog, UndoStack, ViewManager,
};
use crate::utils::{markdown_title, CodeBlock};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Name of a document created from markdown without a heading
pub const UNTITLED: &str = "Untitled";

/// Display name of the built-in title column
const TITLE_DISPLAY_NAME: &str = "Title";

/// Result of one free-form statement
#[derive(Debug, Clone)]
pub struct SqlOutcome {
    pub kind: StatementKind,
    /// Rows of a read; empty otherwise
    pub rows: Vec<SqlRow>,
    /// Changed rows of a write; zero for reads
    pub rows_affected: u64,
}

impl SqlOutcome {
    /// Whether callers should re-read the catalog and field metadata
    pub fn changes_schema(&self) -> bool {
        self.kind.changes_schema()
    }
}

pub struct DataSpace {
    config: DataSpaceConfig,
    gateway: Option<SqlGateway>,
}

impl DataSpace {
    /// A closed data space; call [`init`](Self::init) before use
    pub fn new(config: DataSpaceConfig) -> Self {
        Self {
            config,
            gateway: None,
        }
    }

    pub async fn open(config: DataSpaceConfig) -> Result<Self, DataSpaceError> {
        let mut space = Self::new(config);
        space.init().await?;
        Ok(space)
    }

    /// Open the database and create the metadata tables. Idempotent.
    pub async fn init(&mut self) -> Result<(), DataSpaceError> {
        if self.gateway.is_some() {
            return Ok(());
        }
        self.config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let gateway =
            SqlGateway::open(self.config.db_path.clone(), self.config.busy_timeout()).await?;
        tracing::info!(
            undo = self.config.undo.enabled,
            "Data space initialized at {}",
            gateway.db_path().display()
        );
        self.gateway = Some(gateway);
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(gateway) = self.gateway.take() {
            tracing::info!("Closed data space at {}", gateway.db_path().display());
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn config(&self) -> &DataSpaceConfig {
        &self.config
    }

    fn gateway(&self) -> Result<&SqlGateway, DataSpaceError> {
        self.gateway.as_ref().ok_or(DataSpaceError::NotInitialized)
    }

    /// Record the journal as one undo entry (when enabled and non-empty) and
    /// finish the transaction.
    async fn commit<T>(
        &self,
        mut tx: Transaction<'_>,
        label: &str,
        result: Result<T, DataSpaceError>,
    ) -> Result<T, DataSpaceError> {
        let result = match result {
            Ok(value) if self.config.undo.enabled => {
                let journal = tx.take_journal();
                if journal.is_empty() {
                    Ok(value)
                } else {
                    UndoLog::record(&tx, label, &journal, self.config.undo.history_limit)
                        .await
                        .map(|tx_id| {
                            tracing::debug!(
                                tx_id = tx_id.as_str(),
                                "Recorded '{}' ({} statements)",
                                label,
                                journal.forward.len()
                            );
                            value
                        })
                        .map_err(DataSpaceError::from)
                }
            }
            other => other,
        };
        tx.finish(result).await
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Create a node of any type with its backing storage. Returns the id.
    pub async fn create_node(
        &self,
        node_type: NodeType,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DataSpaceError> {
        let node = Node::new(node_type, name, parent_id.map(str::to_string));
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::insert_node(&mut tx, node).await.map(|n| n.id);
        self.commit(tx, &format!("create {node_type}"), result).await
    }

    /// Create a table node, `tb_<id>` with `_id` and `title`, their field
    /// metadata and the default view
    pub async fn create_table(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DataSpaceError> {
        self.create_node(NodeType::Table, name, parent_id).await
    }

    pub async fn create_doc(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DataSpaceError> {
        self.create_node(NodeType::Doc, name, parent_id).await
    }

    async fn insert_node(tx: &mut Transaction<'_>, node: Node) -> Result<Node, DataSpaceError> {
        match node.node_type {
            NodeType::Table => Self::insert_table(tx, node).await,
            NodeType::Doc => Catalog::insert(tx, &node).await,
            NodeType::Script => Self::insert_prompt(tx, node, "").await,
            NodeType::Action => {
                let definition = ActionDefinition {
                    id: Some(node.id.clone()),
                    name: node.name.clone(),
                    description: None,
                    params: Vec::new(),
                    nodes: Vec::new(),
                };
                Self::insert_action(tx, definition, node.parent_id).await
            }
        }
    }

    async fn insert_table(tx: &mut Transaction<'_>, node: Node) -> Result<Node, DataSpaceError> {
        let table = node.table_name()?;
        if PhysicalTables::exists(&*tx, &table).await? {
            return Err(DataSpaceError::conflict(format!(
                "table '{}' already exists",
                table
            )));
        }
        PhysicalTables::create(tx, &table).await?;
        let node = Catalog::insert(tx, &node).await?;

        let row_id = UiColumn::new(table.as_str(), ROW_ID_COLUMN, ROW_ID_COLUMN, FieldType::RowId);
        SchemaIntrospector::upsert(tx, &row_id).await?;
        let title = UiColumn::new(table.as_str(), TITLE_COLUMN, TITLE_DISPLAY_NAME, FieldType::Title);
        SchemaIntrospector::upsert(tx, &title).await?;

        ViewManager::create_default(tx, &node.id, None).await?;
        Ok(node)
    }

    /// Any node with this id, soft-deleted or not
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, DataSpaceError> {
        Ok(Catalog::get(self.gateway()?, id).await?)
    }

    /// Non-deleted nodes ordered by `(parent_id, position)`; empty before `init`
    pub async fn list_all_nodes(&self) -> Result<Vec<Node>, DataSpaceError> {
        match &self.gateway {
            Some(gateway) => Ok(Catalog::list(gateway, false).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn list_all_nodes_including_deleted(&self) -> Result<Vec<Node>, DataSpaceError> {
        match &self.gateway {
            Some(gateway) => Ok(Catalog::list(gateway, true).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Daily documents (id `YYYY-MM-DD`), newest first
    pub async fn list_day_docs(&self, limit: u32, offset: u32) -> Result<Vec<Node>, DataSpaceError> {
        Ok(Catalog::list_day_docs(self.gateway()?, limit, offset).await?)
    }

    pub async fn rename_node(&self, id: &str, name: &str) -> Result<Node, DataSpaceError> {
        let patch = NodeUpdate {
            name: Some(name.to_string()),
            ..NodeUpdate::default()
        };
        self.update_node(id, &patch).await
    }

    pub async fn update_node(&self, id: &str, patch: &NodeUpdate) -> Result<Node, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::update_node_in(&mut tx, id, patch).await;
        self.commit(tx, "update node", result).await
    }

    async fn update_node_in(
        tx: &mut Transaction<'_>,
        id: &str,
        patch: &NodeUpdate,
    ) -> Result<Node, DataSpaceError> {
        let node = Catalog::update(tx, id, patch).await?;
        if let Some(name) = &patch.name {
            if matches!(node.node_type, NodeType::Script | NodeType::Action) {
                ScriptRegistry::rename(tx, id, name).await?;
            }
        }
        Ok(node)
    }

    /// Soft delete; the node disappears from [`list_all_nodes`](Self::list_all_nodes)
    pub async fn delete_node(&self, id: &str) -> Result<(), DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Catalog::set_deleted(&mut tx, id, true).await.map(|_| ());
        self.commit(tx, "delete node", result).await
    }

    pub async fn restore_node(&self, id: &str) -> Result<Node, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Catalog::set_deleted(&mut tx, id, false).await;
        self.commit(tx, "restore node", result).await
    }

    /// Remove a node and everything backing it
    pub async fn purge_node(&self, id: &str) -> Result<(), DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::purge_in(&mut tx, id).await;
        self.commit(tx, "purge node", result).await
    }

    /// [`purge_node`](Self::purge_node) for table nodes only
    pub async fn delete_table(&self, id: &str) -> Result<(), DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let found = Catalog::get(&tx, id).await;
        let result = match found {
            Ok(Some(node)) if node.node_type == NodeType::Table => Self::purge_in(&mut tx, id).await,
            Ok(_) => Err(DataSpaceError::not_found("Table", id)),
            Err(e) => Err(e.into()),
        };
        self.commit(tx, "delete table", result).await
    }

    async fn purge_in(tx: &mut Transaction<'_>, id: &str) -> Result<(), DataSpaceError> {
        let node = Catalog::require(&*tx, id).await?;
        if !Catalog::children(&*tx, id).await?.is_empty() {
            return Err(DataSpaceError::conflict(format!(
                "node '{}' still has children",
                id
            )));
        }

        match node.node_type {
            NodeType::Table => {
                let table = node.table_name()?;
                ViewManager::delete_for_table(tx, id).await?;
                SchemaIntrospector::delete_for_table(tx, &table).await?;
                if PhysicalTables::exists(&*tx, &table).await? {
                    PhysicalTables::drop(tx, &table).await?;
                } else {
                    tracing::warn!("Purging table node {} without physical table", id);
                }
            }
            NodeType::Doc => {
                DocumentStore::delete(tx, id).await?;
            }
            NodeType::Script | NodeType::Action => {
                ScriptRegistry::delete(tx, id).await?;
            }
        }
        Catalog::remove(tx, id).await
    }

    /// Copy a table's rows and field metadata under a new node. Returns the new id.
    pub async fn duplicate_table(&self, id: &str, name: &str) -> Result<String, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::duplicate_in(&mut tx, id, name).await.map(|n| n.id);
        self.commit(tx, "duplicate table", result).await
    }

    async fn duplicate_in(
        tx: &mut Transaction<'_>,
        id: &str,
        name: &str,
    ) -> Result<Node, DataSpaceError> {
        let source = Catalog::require_live(&*tx, id, NodeType::Table).await?;
        let source_table = source.table_name()?;

        let node = Node::new(NodeType::Table, name, source.parent_id.clone());
        let target = node.table_name()?;
        PhysicalTables::copy(tx, &source_table, &target).await?;
        let node = Catalog::insert(tx, &node).await?;
        SchemaIntrospector::copy_for_table(tx, &source_table, &target).await?;
        ViewManager::create_default(tx, &node.id, None).await?;
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Fields of every user table; empty before `init`
    pub async fn list_all_ui_columns(&self) -> Result<Vec<UiColumn>, DataSpaceError> {
        match &self.gateway {
            Some(gateway) => Ok(SchemaIntrospector::list_all(gateway).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Fields of one physical table (`tb_<id>`)
    pub async fn list_ui_columns(&self, table_name: &str) -> Result<Vec<UiColumn>, DataSpaceError> {
        let gateway = self.gateway()?;
        let table = require_table(gateway, table_name).await?;
        Ok(SchemaIntrospector::list_for_table(gateway, &table).await?)
    }

    pub async fn update_column_name(
        &self,
        table_name: &str,
        column: &str,
        name: &str,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let table = require_table(&tx, table_name).await;
        let result = match table {
            Ok(table) => SchemaIntrospector::update_name(&mut tx, &table, column, name).await,
            Err(e) => Err(e),
        };
        self.commit(tx, "rename field", result).await
    }

    pub async fn update_column_property(
        &self,
        table_name: &str,
        column: &str,
        property: Value,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let table = require_table(&tx, table_name).await;
        let result = match table {
            Ok(table) => {
                SchemaIntrospector::update_property(&mut tx, &table, column, property).await
            }
            Err(e) => Err(e),
        };
        self.commit(tx, "update field property", result).await
    }

    pub async fn add_select_option(
        &self,
        table_name: &str,
        column: &str,
        option: SelectOption,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let table = require_table(&tx, table_name).await;
        let result = match table {
            Ok(table) => SchemaIntrospector::add_select_option(&mut tx, &table, column, option).await,
            Err(e) => Err(e),
        };
        self.commit(tx, "add select option", result).await
    }

    pub async fn remove_select_option(
        &self,
        table_name: &str,
        column: &str,
        option_id: &str,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let table = require_table(&tx, table_name).await;
        let result = match table {
            Ok(table) => {
                SchemaIntrospector::remove_select_option(&mut tx, &table, column, option_id).await
            }
            Err(e) => Err(e),
        };
        self.commit(tx, "remove select option", result).await
    }

    /// Add a `cl_xxxx` column and its field metadata
    pub async fn add_column(
        &self,
        table_id: &str,
        name: &str,
        field_type: FieldType,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::add_column_in(&mut tx, table_id, name, field_type).await;
        self.commit(tx, "add field", result).await
    }

    async fn add_column_in(
        tx: &mut Transaction<'_>,
        table_id: &str,
        name: &str,
        field_type: FieldType,
    ) -> Result<UiColumn, DataSpaceError> {
        let node = Catalog::require_live(&*tx, table_id, NodeType::Table).await?;
        let table = node.table_name()?;
        let existing = PhysicalTables::columns(&*tx, &table).await?;

        let column = loop {
            let candidate = format!("cl_{}", &new_node_id()[..4]);
            if !existing.iter().any(|c| c.name == candidate) {
                break Identifier::new(candidate)?;
            }
        };
        PhysicalTables::add_column(tx, &table, &column, field_type).await?;

        let field = UiColumn::new(table.as_str(), column.as_str(), name, field_type);
        SchemaIntrospector::upsert(tx, &field).await?;
        Ok(field)
    }

    /// Drop a user column with its metadata and any sort on it.
    /// `_id` and `title` cannot be dropped.
    pub async fn drop_column(&self, table_id: &str, column: &str) -> Result<(), DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::drop_column_in(&mut tx, table_id, column).await;
        self.commit(tx, "drop field", result).await
    }

    async fn drop_column_in(
        tx: &mut Transaction<'_>,
        table_id: &str,
        column: &str,
    ) -> Result<(), DataSpaceError> {
        let node = Catalog::require_live(&*tx, table_id, NodeType::Table).await?;
        let table = node.table_name()?;
        let ident = Identifier::new(column)?;
        if column == ROW_ID_COLUMN || column == TITLE_COLUMN {
            return Err(DataSpaceError::conflict(format!(
                "built-in column '{}' cannot be dropped",
                column
            )));
        }
        if !PhysicalTables::columns(&*tx, &table)
            .await?
            .iter()
            .any(|c| c.name == column)
        {
            return Err(DataSpaceError::not_found("Column", format!("{table}.{column}")));
        }

        for view in ViewManager::list(&*tx, table_id).await? {
            ViewManager::remove_sort(tx, &view.id, &ident).await?;
        }
        PhysicalTables::drop_column(tx, &table, &ident).await?;
        SchemaIntrospector::delete_column(tx, &table, column).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub async fn create_default_view(&self, table_id: &str) -> Result<View, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let table = Catalog::require_live(&tx, table_id, NodeType::Table).await;
        let result = match table {
            Ok(_) => ViewManager::create_default(&mut tx, table_id, None).await,
            Err(e) => Err(e),
        };
        self.commit(tx, "create view", result).await
    }

    pub async fn list_views(&self, table_id: &str) -> Result<Vec<View>, DataSpaceError> {
        Ok(ViewManager::list(self.gateway()?, table_id).await?)
    }

    pub async fn get_view(&self, view_id: &str) -> Result<View, DataSpaceError> {
        ViewManager::require(self.gateway()?, view_id).await
    }

    pub async fn update_view(&self, view_id: &str, patch: &ViewPatch) -> Result<View, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = ViewManager::update(&mut tx, view_id, patch).await;
        self.commit(tx, "update view", result).await
    }

    /// Delete a view; the only view of a table is a conflict
    pub async fn del_view(&self, view_id: &str) -> Result<(), DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = ViewManager::delete(&mut tx, view_id).await;
        self.commit(tx, "delete view", result).await
    }

    /// Sort by `column`: flips an existing term, appends a new one, and
    /// writes nothing when the term is already there.
    pub async fn add_sort(
        &self,
        view_id: &str,
        column: &str,
        direction: SortDirection,
    ) -> Result<View, DataSpaceError> {
        let column = Identifier::new(column)?;
        let mut tx = self.gateway()?.begin().await?;
        let result = ViewManager::add_sort(&mut tx, view_id, &column, direction).await;
        self.commit(tx, "sort view", result).await
    }

    pub async fn remove_sort(&self, view_id: &str, column: &str) -> Result<View, DataSpaceError> {
        let column = Identifier::new(column)?;
        let mut tx = self.gateway()?.begin().await?;
        let result = ViewManager::remove_sort(&mut tx, view_id, &column).await;
        self.commit(tx, "remove sort", result).await
    }

    pub async fn set_filter(
        &self,
        view_id: &str,
        filter: Option<&str>,
    ) -> Result<View, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = ViewManager::set_filter(&mut tx, view_id, filter).await;
        self.commit(tx, "filter view", result).await
    }

    /// Rows produced by the view's stored query
    pub async fn view_rows(&self, view_id: &str) -> Result<Vec<SqlRow>, DataSpaceError> {
        let gateway = self.gateway()?;
        let view = ViewManager::require(gateway, view_id).await?;
        ViewManager::checked_query(&view, &view.query)?;
        Ok(PhysicalTables::select(gateway, &view.query).await?)
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Upsert a document's markdown, creating the doc node first if needed.
    /// A new node is named after the first heading, else [`UNTITLED`].
    pub async fn create_or_update_doc_with_markdown(
        &self,
        doc_id: &str,
        markdown: &str,
    ) -> Result<Node, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::upsert_doc_in(&mut tx, doc_id, markdown).await;
        self.commit(tx, "write document", result).await
    }

    async fn upsert_doc_in(
        tx: &mut Transaction<'_>,
        doc_id: &str,
        markdown: &str,
    ) -> Result<Node, DataSpaceError> {
        if doc_id.trim().is_empty() {
            return Err(ValidationError::InvalidId(doc_id.to_string()).into());
        }
        let node = match Catalog::get(&*tx, doc_id).await? {
            Some(node) if node.node_type != NodeType::Doc => {
                return Err(DataSpaceError::conflict(format!(
                    "node '{}' is a {}, not a doc",
                    doc_id, node.node_type
                )))
            }
            Some(node) if node.is_deleted => Catalog::set_deleted(tx, doc_id, false).await?,
            Some(node) => node,
            None => {
                let name = markdown_title(markdown).unwrap_or_else(|| UNTITLED.to_string());
                Catalog::insert(tx, &Node::new_with_id(doc_id, NodeType::Doc, name, None)).await?
            }
        };
        DocumentStore::upsert(tx, doc_id, markdown).await?;
        Ok(node)
    }

    /// Markdown of a document; `None` when it has no content or before `init`
    pub async fn get_doc(&self, doc_id: &str) -> Result<Option<String>, DataSpaceError> {
        match &self.gateway {
            Some(gateway) => Ok(DocumentStore::get(gateway, doc_id).await?),
            None => Ok(None),
        }
    }

    pub async fn update_doc(&self, doc_id: &str, content: &str) -> Result<(), DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let doc = Catalog::require_live(&tx, doc_id, NodeType::Doc).await;
        let result = match doc {
            Ok(_) => DocumentStore::upsert(&mut tx, doc_id, content)
                .await
                .map_err(DataSpaceError::from),
            Err(e) => Err(e),
        };
        self.commit(tx, "update document", result).await
    }

    /// Remove a document's content; the catalog node stays. Returns whether
    /// there was content.
    pub async fn delete_doc(&self, doc_id: &str) -> Result<bool, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = DocumentStore::delete(&mut tx, doc_id)
            .await
            .map_err(DataSpaceError::from);
        self.commit(tx, "delete document content", result).await
    }

    // ------------------------------------------------------------------
    // Scripts and actions
    // ------------------------------------------------------------------

    /// Validate and register an action. Returns its id.
    pub async fn add_action(&self, definition: ActionDefinition) -> Result<String, DataSpaceError> {
        definition.validate()?;
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::insert_action(&mut tx, definition, None)
            .await
            .map(|n| n.id);
        self.commit(tx, "add action", result).await
    }

    async fn insert_action(
        tx: &mut Transaction<'_>,
        definition: ActionDefinition,
        parent_id: Option<String>,
    ) -> Result<Node, DataSpaceError> {
        definition.validate()?;
        let id = definition.id.clone().unwrap_or_else(new_node_id);
        let node = Node::new_with_id(
            id.as_str(),
            NodeType::Action,
            definition.name.as_str(),
            parent_id,
        );
        let node = Catalog::insert(tx, &node).await?;

        let script = Script {
            id,
            script_type: ScriptType::Action,
            name: definition.name,
            description: definition.description,
            enabled: true,
            code: None,
            params: definition.params,
            nodes: definition.nodes,
        };
        ScriptRegistry::insert(tx, &script).await?;
        Ok(node)
    }

    /// Register a prompt script. Returns its id.
    pub async fn add_prompt(&self, name: &str, code: &str) -> Result<String, DataSpaceError> {
        let node = Node::new(NodeType::Script, name, None);
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::insert_prompt(&mut tx, node, code).await.map(|n| n.id);
        self.commit(tx, "add prompt", result).await
    }

    async fn insert_prompt(
        tx: &mut Transaction<'_>,
        node: Node,
        code: &str,
    ) -> Result<Node, DataSpaceError> {
        let node = Catalog::insert(tx, &node).await?;
        ScriptRegistry::insert(tx, &Script::prompt(node.id.as_str(), node.name.as_str(), code))
            .await?;
        Ok(node)
    }

    /// Registry handle; reads return empty before `init`
    pub fn script(&self) -> ScriptHandle<'_> {
        ScriptHandle { space: self }
    }

    pub async fn update_script_code(&self, id: &str, code: &str) -> Result<Script, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = ScriptRegistry::update_code(&mut tx, id, code).await;
        self.commit(tx, "edit script", result).await
    }

    pub async fn set_script_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<Script, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = ScriptRegistry::set_enabled(&mut tx, id, enabled).await;
        self.commit(tx, "toggle script", result).await
    }

    /// Run an action's calls in order in one transaction. Returns the `_id`s
    /// of inserted rows.
    pub async fn run_action(
        &self,
        id: &str,
        args: &HashMap<String, Value>,
    ) -> Result<Vec<String>, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::run_action_in(&mut tx, id, args).await;
        self.commit(tx, "run action", result).await
    }

    async fn run_action_in(
        tx: &mut Transaction<'_>,
        id: &str,
        args: &HashMap<String, Value>,
    ) -> Result<Vec<String>, DataSpaceError> {
        let script = ScriptRegistry::require(&*tx, id).await?;
        let definition = script.action_definition().ok_or_else(|| {
            ValidationError::InvalidNodeType(format!("script '{id}' is a prompt, not an action"))
        })?;
        if !script.enabled {
            return Err(DataSpaceError::conflict(format!(
                "action '{}' is disabled",
                script.name
            )));
        }

        let mut inserted = Vec::new();
        for (step, call) in definition.nodes.iter().enumerate() {
            tracing::debug!("Action '{}' step {}: {}", script.name, step + 1, call.name);
            match call.bind(args)? {
                BuiltinCall::AddRow { table_name, data } => {
                    let table_id = table_id_from_name(table_name.as_str())
                        .ok_or_else(|| DataSpaceError::not_found("Table", table_name.as_str()))?;
                    Catalog::require_live(&*tx, table_id, NodeType::Table).await?;
                    inserted.push(Self::insert_data_row(tx, &table_name, data).await?);
                }
            }
        }
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    /// Insert one row keyed by raw column names. Returns its `_id`.
    pub async fn add_row(
        &self,
        table_id: &str,
        data: Map<String, Value>,
    ) -> Result<String, DataSpaceError> {
        let mut tx = self.gateway()?.begin().await?;
        let table = Catalog::require_live(&tx, table_id, NodeType::Table).await;
        let result = match table {
            Ok(node) => match node.table_name() {
                Ok(table) => Self::insert_data_row(&mut tx, &table, data).await,
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };
        self.commit(tx, "add row", result).await
    }

    /// Insert many rows in one transaction, reporting percent done after each
    pub async fn insert_rows<F>(
        &self,
        table_id: &str,
        rows: Vec<Map<String, Value>>,
        mut progress: F,
    ) -> Result<Vec<String>, DataSpaceError>
    where
        F: FnMut(u8) + Send,
    {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::insert_rows_in(&mut tx, table_id, rows, &mut progress).await;
        self.commit(tx, "insert rows", result).await
    }

    async fn insert_rows_in<F>(
        tx: &mut Transaction<'_>,
        table_id: &str,
        rows: Vec<Map<String, Value>>,
        progress: &mut F,
    ) -> Result<Vec<String>, DataSpaceError>
    where
        F: FnMut(u8) + Send,
    {
        let node = Catalog::require_live(&*tx, table_id, NodeType::Table).await?;
        let table = node.table_name()?;
        let total = rows.len();
        let mut ids = Vec::with_capacity(total);
        for (idx, row) in rows.into_iter().enumerate() {
            ids.push(Self::insert_data_row(tx, &table, row).await?);
            progress(percent(idx + 1, total));
        }
        Ok(ids)
    }

    /// Create a table from columns and rows in one transaction. Returns the
    /// table id.
    pub async fn import_table<F>(
        &self,
        import: TableImport,
        mut progress: F,
    ) -> Result<String, DataSpaceError>
    where
        F: FnMut(u8) + Send,
    {
        let mut tx = self.gateway()?.begin().await?;
        let result = Self::import_in(&mut tx, import, &mut progress)
            .await
            .map(|n| n.id);
        self.commit(tx, "import table", result).await
    }

    async fn import_in<F>(
        tx: &mut Transaction<'_>,
        import: TableImport,
        progress: &mut F,
    ) -> Result<Node, DataSpaceError>
    where
        F: FnMut(u8) + Send,
    {
        let node = match &import.id {
            Some(id) => Node::new_with_id(
                id.as_str(),
                NodeType::Table,
                import.name.as_str(),
                import.parent_id.clone(),
            ),
            None => Node::new(NodeType::Table, import.name.as_str(), import.parent_id.clone()),
        };
        let node = Self::insert_table(tx, node).await?;
        let table = node.table_name()?;

        let title_index = import.title_index();
        let mut keys = Vec::with_capacity(import.columns.len());
        for (idx, column) in import.columns.iter().enumerate() {
            if Some(idx) == title_index {
                SchemaIntrospector::update_name(tx, &table, TITLE_COLUMN, &column.name).await?;
                keys.push(TITLE_COLUMN.to_string());
            } else {
                let field = Self::add_column_in(tx, &node.id, &column.name, column.field_type).await?;
                keys.push(field.table_column_name);
            }
        }

        let total = import.rows.len();
        for (idx, row) in import.rows.into_iter().enumerate() {
            if row.len() > keys.len() {
                return Err(ValidationError::invalid_argument(format!(
                    "row {} has {} values but the import has {} columns",
                    idx + 1,
                    row.len(),
                    keys.len()
                ))
                .into());
            }
            let data: Map<String, Value> = keys.iter().cloned().zip(row).collect();
            Self::insert_data_row(tx, &table, data).await?;
            progress(percent(idx + 1, total));
        }
        Ok(node)
    }

    /// Insert `data` (raw column → JSON value) with a bound value per column.
    /// A missing `_id` is generated.
    async fn insert_data_row(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        data: Map<String, Value>,
    ) -> Result<String, DataSpaceError> {
        let physical = PhysicalTables::columns(&*tx, table).await?;
        let mut row_id = None;
        let mut columns = vec![Identifier::from_engine(ROW_ID_COLUMN)];
        let mut values = Vec::with_capacity(data.len() + 1);

        for (key, value) in data {
            if !physical.iter().any(|c| c.name == key) {
                return Err(ValidationError::invalid_argument(format!(
                    "table '{}' has no column '{}'",
                    table, key
                ))
                .into());
            }
            if key == ROW_ID_COLUMN {
                match value {
                    Value::String(id) if !id.is_empty() => row_id = Some(id),
                    Value::Null => {}
                    _ => {
                        return Err(
                            ValidationError::invalid_argument("_id must be a string").into()
                        )
                    }
                }
                continue;
            }
            columns.push(Identifier::from_engine(key));
            values.push(SqlValue::from_json(&value));
        }

        let row_id = row_id.unwrap_or_else(new_node_id);
        values.insert(0, SqlValue::from(row_id.as_str()));
        PhysicalTables::insert_row(tx, table, &columns, values).await?;
        Ok(row_id)
    }

    // ------------------------------------------------------------------
    // Free-form SQL
    // ------------------------------------------------------------------

    /// Run caller-written SQL. Not recorded for undo.
    pub async fn execute_sql(&self, sql: FreeformSql) -> Result<SqlOutcome, DataSpaceError> {
        let gateway = self.gateway()?;
        let stmt = sql.render()?;
        let kind = stmt.kind();

        let outcome = match kind {
            StatementKind::Read => SqlOutcome {
                kind,
                rows: gateway.query(&stmt).await?,
                rows_affected: 0,
            },
            _ => SqlOutcome {
                kind,
                rows: Vec::new(),
                rows_affected: gateway.execute(&stmt).await?,
            },
        };
        if outcome.changes_schema() {
            tracing::info!("Schema changed by free-form SQL");
        }
        Ok(outcome)
    }

    /// Run statements in one transaction; all are rendered before any runs
    pub async fn execute_batch<F>(
        &self,
        statements: Vec<FreeformSql>,
        progress: F,
    ) -> Result<u64, DataSpaceError>
    where
        F: FnMut(u8) + Send,
    {
        let gateway = self.gateway()?;
        let rendered = statements
            .iter()
            .map(FreeformSql::render)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(gateway.execute_batch(&rendered, progress).await?)
    }

    /// Run a fenced `sql` block, e.g. one taken from an AI answer
    pub async fn run_code_block(&self, block: &CodeBlock) -> Result<SqlOutcome, DataSpaceError> {
        match block.lang.as_str() {
            "sql" | "sqlite" => self.execute_sql(FreeformSql::new(block.code.as_str())).await,
            other => Err(ValidationError::UnsupportedLanguage(other.to_string()).into()),
        }
    }

    // ------------------------------------------------------------------
    // Undo/redo
    // ------------------------------------------------------------------

    /// Revert the newest committed operation. `Ok(false)` when there is none.
    pub async fn undo(&self) -> Result<bool, DataSpaceError> {
        self.step(UndoStack::Undo).await
    }

    /// Reapply the newest undone operation. `Ok(false)` when there is none.
    pub async fn redo(&self) -> Result<bool, DataSpaceError> {
        self.step(UndoStack::Redo).await
    }

    async fn step(&self, from: UndoStack) -> Result<bool, DataSpaceError> {
        if !self.config.undo.enabled {
            return Err(DataSpaceError::UndoUnavailable);
        }
        let tx = self.gateway()?.begin().await?;
        let result = Self::step_in(&tx, from).await;
        match tx.finish(result).await? {
            Some(label) => {
                tracing::info!("{} '{}'", from.as_str(), label);
                Ok(true)
            }
            None => {
                tracing::debug!("Nothing to {}", from.as_str());
                Ok(false)
            }
        }
    }

    async fn step_in(
        tx: &Transaction<'_>,
        from: UndoStack,
    ) -> Result<Option<String>, DataSpaceError> {
        let Some(entry) = UndoLog::top(tx, from).await? else {
            return Ok(None);
        };
        let statements = match from {
            UndoStack::Undo => &entry.inverse,
            UndoStack::Redo => &entry.forward,
        };
        tx.replay(statements).await?;
        UndoLog::move_to(tx, &entry.tx_id, from.opposite()).await?;
        Ok(Some(entry.label))
    }

    pub async fn can_undo(&self) -> Result<bool, DataSpaceError> {
        Ok(self.history_len(UndoStack::Undo).await? > 0)
    }

    pub async fn can_redo(&self) -> Result<bool, DataSpaceError> {
        Ok(self.history_len(UndoStack::Redo).await? > 0)
    }

    /// Entries on `stack`; zero while undo is disabled
    pub async fn history_len(&self, stack: UndoStack) -> Result<usize, DataSpaceError> {
        if !self.config.undo.enabled {
            return Ok(0);
        }
        Ok(UndoLog::len(self.gateway()?, stack).await?)
    }
}

/// Read access to the script registry, see [`DataSpace::script`]
pub struct ScriptHandle<'a> {
    space: &'a DataSpace,
}

impl ScriptHandle<'_> {
    /// Scripts matching `filter` in registration order
    pub async fn list(&self, filter: &ScriptFilter) -> Result<Vec<Script>, DataSpaceError> {
        match &self.space.gateway {
            Some(gateway) => Ok(ScriptRegistry::list(gateway, filter).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Script>, DataSpaceError> {
        match &self.space.gateway {
            Some(gateway) => Ok(ScriptRegistry::get(gateway, id).await?),
            None => Ok(None),
        }
    }
}

/// A `tb_*` table name that exists
async fn require_table(
    exec: &dyn SqlExecutor,
    table_name: &str,
) -> Result<Identifier, DataSpaceError> {
    let table = Identifier::new(table_name)
        .map_err(|_| DataSpaceError::not_found("Table", table_name))?;
    if table_id_from_name(table.as_str()).is_none() || !PhysicalTables::exists(exec, &table).await? {
        return Err(DataSpaceError::not_found("Table", table_name));
    }
    Ok(table)
}
