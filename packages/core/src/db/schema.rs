//! Metadata Tables
//!
//! All tables owned by the data space use the `ds__` prefix; user tables are
//! `tb_<id>` and can never collide with them. Creation is idempotent
//! (`CREATE TABLE IF NOT EXISTS`), so opening an existing file is safe.

use crate::db::error::DatabaseError;
use libsql::Connection;

pub const TREE_TABLE: &str = "ds__tree";
pub const COLUMNS_TABLE: &str = "ds__columns";
pub const VIEWS_TABLE: &str = "ds__views";
pub const SCRIPTS_TABLE: &str = "ds__scripts";
pub const DOCS_TABLE: &str = "ds__docs";
pub const UNDO_LOG_TABLE: &str = "ds__undo_log";

/// Prefix of every physical user table
pub const USER_TABLE_PREFIX: &str = "tb_";

const SCHEMA: &[(&str, &str)] = &[
    (
        TREE_TABLE,
        "CREATE TABLE IF NOT EXISTS ds__tree (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('table', 'doc', 'script', 'action')),
            parent_id TEXT,
            position REAL NOT NULL DEFAULT 0,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            is_full_width INTEGER NOT NULL DEFAULT 0,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            icon TEXT,
            cover TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        COLUMNS_TABLE,
        "CREATE TABLE IF NOT EXISTS ds__columns (
            table_name TEXT NOT NULL,
            table_column_name TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            property TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (table_name, table_column_name)
        )",
    ),
    (
        VIEWS_TABLE,
        "CREATE TABLE IF NOT EXISTS ds__views (
            id TEXT PRIMARY KEY NOT NULL,
            table_id TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'grid',
            query TEXT NOT NULL,
            order_map TEXT NOT NULL DEFAULT '{}',
            hidden_fields TEXT NOT NULL DEFAULT '[]',
            position REAL NOT NULL DEFAULT 0
        )",
    ),
    (
        SCRIPTS_TABLE,
        "CREATE TABLE IF NOT EXISTS ds__scripts (
            id TEXT PRIMARY KEY NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('prompt', 'action')),
            name TEXT NOT NULL,
            description TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            code TEXT,
            params TEXT NOT NULL DEFAULT '[]',
            nodes TEXT NOT NULL DEFAULT '[]',
            seq INTEGER NOT NULL
        )",
    ),
    (
        DOCS_TABLE,
        "CREATE TABLE IF NOT EXISTS ds__docs (
            id TEXT PRIMARY KEY NOT NULL,
            content TEXT NOT NULL DEFAULT ''
        )",
    ),
    (
        UNDO_LOG_TABLE,
        "CREATE TABLE IF NOT EXISTS ds__undo_log (
            tx_id TEXT PRIMARY KEY NOT NULL,
            label TEXT NOT NULL,
            stack TEXT NOT NULL CHECK (stack IN ('undo', 'redo')),
            ordinal INTEGER NOT NULL,
            forward TEXT NOT NULL,
            inverse TEXT NOT NULL,
            committed_at TEXT NOT NULL
        )",
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_tree_parent_position",
        "CREATE INDEX IF NOT EXISTS idx_tree_parent_position ON ds__tree(parent_id, position)",
    ),
    (
        "idx_views_table",
        "CREATE INDEX IF NOT EXISTS idx_views_table ON ds__views(table_id, position)",
    ),
    (
        "idx_undo_stack",
        "CREATE INDEX IF NOT EXISTS idx_undo_stack ON ds__undo_log(stack, ordinal)",
    ),
];

/// Create the metadata tables and their indexes
pub(crate) async fn initialize_schema(conn: &Connection) -> Result<(), DatabaseError> {
    for (table, ddl) in SCHEMA {
        conn.execute(ddl, ()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create {} table: {}", table, e))
        })?;
    }

    for (index, ddl) in INDEXES {
        conn.execute(ddl, ()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create index '{}': {}",
                index, e
            ))
        })?;
    }

    Ok(())
}
