//! Catalog (Tree Registry)
//!
//! One `ds__tree` row per content node. Rows are read through any
//! [`SqlExecutor`] and written inside a transaction; every write is journaled
//! with a before-image of the row.

use crate::db::schema::TREE_TABLE;
use crate::db::{DatabaseError, SqlExecutor, SqlRow, Statement, Transaction};
use crate::models::{timestamp_now, Node, NodeType, NodeUpdate};
use crate::services::snapshot::{apply_restoring, RowKey};
use crate::services::DataSpaceError;
use chrono::NaiveDate;
use std::collections::HashSet;

pub struct Catalog;

impl Catalog {
    fn node_from_row(row: &SqlRow) -> Result<Node, DatabaseError> {
        let type_text = row.text("type")?;
        let node_type = type_text
            .parse::<NodeType>()
            .map_err(|_| DatabaseError::row_decode("type", "node type"))?;

        Ok(Node {
            id: row.text("id")?,
            name: row.text("name")?,
            node_type,
            parent_id: row.opt_text("parent_id")?,
            position: row.real("position")?,
            is_pinned: row.boolean("is_pinned")?,
            is_full_width: row.boolean("is_full_width")?,
            is_deleted: row.boolean("is_deleted")?,
            icon: row.opt_text("icon")?,
            cover: row.opt_text("cover")?,
            created_at: row.text("created_at")?,
            updated_at: row.text("updated_at")?,
        })
    }

    fn key(id: &str) -> RowKey {
        RowKey::new(TREE_TABLE).eq("id", id)
    }

    /// Nodes ordered by `(parent_id, position)`, roots first
    pub async fn list(
        exec: &dyn SqlExecutor,
        include_deleted: bool,
    ) -> Result<Vec<Node>, DatabaseError> {
        let stmt = if include_deleted {
            Statement::text("SELECT * FROM ds__tree ORDER BY parent_id IS NOT NULL, parent_id, position, created_at")?
        } else {
            Statement::text("SELECT * FROM ds__tree WHERE is_deleted = 0 ORDER BY parent_id IS NOT NULL, parent_id, position, created_at")?
        };
        exec.query(&stmt).await?.iter().map(Self::node_from_row).collect()
    }

    /// Any node with this id, deleted or not
    pub async fn get(exec: &dyn SqlExecutor, id: &str) -> Result<Option<Node>, DatabaseError> {
        let stmt = Statement::with_params("SELECT * FROM ds__tree WHERE id = ?", vec![id.into()])?;
        exec.query_optional(&stmt)
            .await?
            .map(|row| Self::node_from_row(&row))
            .transpose()
    }

    pub async fn require(exec: &dyn SqlExecutor, id: &str) -> Result<Node, DataSpaceError> {
        Self::get(exec, id)
            .await?
            .ok_or_else(|| DataSpaceError::node_not_found(id))
    }

    /// Live (not soft-deleted) node of the given type
    pub async fn require_live(
        exec: &dyn SqlExecutor,
        id: &str,
        node_type: NodeType,
    ) -> Result<Node, DataSpaceError> {
        match Self::get(exec, id).await? {
            Some(node) if !node.is_deleted && node.node_type == node_type => Ok(node),
            _ => Err(DataSpaceError::not_found(type_label(node_type), id)),
        }
    }

    /// Direct children, soft-deleted ones included
    pub async fn children(exec: &dyn SqlExecutor, id: &str) -> Result<Vec<Node>, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT * FROM ds__tree WHERE parent_id = ? ORDER BY position",
            vec![id.into()],
        )?;
        exec.query(&stmt).await?.iter().map(Self::node_from_row).collect()
    }

    async fn next_position(
        exec: &dyn SqlExecutor,
        parent_id: Option<&str>,
    ) -> Result<f64, DatabaseError> {
        let stmt = match parent_id {
            Some(parent) => Statement::with_params(
                "SELECT COALESCE(MAX(position), 0) + 1 AS next FROM ds__tree WHERE parent_id = ?",
                vec![parent.into()],
            )?,
            None => Statement::text(
                "SELECT COALESCE(MAX(position), 0) + 1 AS next FROM ds__tree WHERE parent_id IS NULL",
            )?,
        };
        match exec.query_optional(&stmt).await? {
            Some(row) => row.real("next"),
            None => Ok(1.0),
        }
    }

    async fn check_parent(exec: &dyn SqlExecutor, parent_id: Option<&str>) -> Result<(), DataSpaceError> {
        if let Some(parent) = parent_id {
            match Self::get(exec, parent).await? {
                Some(node) if !node.is_deleted => {}
                _ => return Err(DataSpaceError::node_not_found(parent)),
            }
        }
        Ok(())
    }

    /// Fail if `id` is `parent_id` or one of its ancestors
    async fn check_no_cycle(
        exec: &dyn SqlExecutor,
        id: &str,
        parent_id: &str,
    ) -> Result<(), DataSpaceError> {
        let mut seen = HashSet::new();
        let mut current = Some(parent_id.to_string());
        while let Some(ancestor) = current {
            if ancestor == id {
                return Err(DataSpaceError::conflict(format!(
                    "node '{id}' cannot move under its own descendant '{parent_id}'"
                )));
            }
            if !seen.insert(ancestor.clone()) {
                break;
            }
            current = Self::get(exec, &ancestor).await?.and_then(|n| n.parent_id);
        }
        Ok(())
    }

    /// Register `node`, placing it after its last sibling.
    ///
    /// An existing row with the same id is a conflict.
    pub async fn insert(tx: &mut Transaction<'_>, node: &Node) -> Result<Node, DataSpaceError> {
        if Self::get(&*tx, &node.id).await?.is_some() {
            return Err(DataSpaceError::conflict(format!(
                "node id '{}' already exists",
                node.id
            )));
        }
        Self::check_parent(&*tx, node.parent_id.as_deref()).await?;

        let mut node = node.clone();
        node.position = Self::next_position(&*tx, node.parent_id.as_deref()).await?;

        let insert = Statement::with_params(
            "INSERT INTO ds__tree (id, name, type, parent_id, position, is_pinned, is_full_width, \
             is_deleted, icon, cover, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                node.id.as_str().into(),
                node.name.as_str().into(),
                node.node_type.as_str().into(),
                node.parent_id.clone().into(),
                node.position.into(),
                node.is_pinned.into(),
                node.is_full_width.into(),
                node.is_deleted.into(),
                node.icon.clone().into(),
                node.cover.clone().into(),
                node.created_at.as_str().into(),
                node.updated_at.as_str().into(),
            ],
        )?;
        tx.apply(insert, vec![Self::key(&node.id).delete()?]).await?;
        Ok(node)
    }

    /// Write every mutable column of `node` back
    async fn write(tx: &mut Transaction<'_>, node: &Node) -> Result<(), DataSpaceError> {
        let update = Statement::with_params(
            "UPDATE ds__tree SET name = ?, parent_id = ?, position = ?, is_pinned = ?, \
             is_full_width = ?, is_deleted = ?, icon = ?, cover = ?, updated_at = ? WHERE id = ?",
            vec![
                node.name.as_str().into(),
                node.parent_id.clone().into(),
                node.position.into(),
                node.is_pinned.into(),
                node.is_full_width.into(),
                node.is_deleted.into(),
                node.icon.clone().into(),
                node.cover.clone().into(),
                node.updated_at.as_str().into(),
                node.id.as_str().into(),
            ],
        )?;
        apply_restoring(tx, &Self::key(&node.id), update).await?;
        Ok(())
    }

    pub async fn update(
        tx: &mut Transaction<'_>,
        id: &str,
        patch: &NodeUpdate,
    ) -> Result<Node, DataSpaceError> {
        let mut node = Self::require(&*tx, id).await?;
        if patch.is_empty() {
            return Ok(node);
        }
        if let Some(Some(parent)) = &patch.parent_id {
            if parent == id {
                return Err(DataSpaceError::conflict("a node cannot be its own parent"));
            }
            Self::check_parent(&*tx, Some(parent)).await?;
            Self::check_no_cycle(&*tx, id, parent).await?;
        }
        patch.apply_to(&mut node);
        node.updated_at = timestamp_now();
        Self::write(tx, &node).await?;
        Ok(node)
    }

    /// Soft delete or restore a node.
    ///
    /// A node with live children cannot be deleted, and a node cannot be
    /// restored under a parent that is gone: live nodes always hang off live
    /// parents.
    pub async fn set_deleted(
        tx: &mut Transaction<'_>,
        id: &str,
        deleted: bool,
    ) -> Result<Node, DataSpaceError> {
        let mut node = Self::require(&*tx, id).await?;
        if node.is_deleted == deleted {
            return Ok(node);
        }
        if deleted {
            let live = Self::children(&*tx, id)
                .await?
                .into_iter()
                .filter(|c| !c.is_deleted)
                .count();
            if live > 0 {
                return Err(DataSpaceError::conflict(format!(
                    "node '{id}' still has {live} live child node(s)"
                )));
            }
        } else if let Some(parent) = node.parent_id.as_deref() {
            match Self::get(&*tx, parent).await? {
                Some(p) if !p.is_deleted => {}
                _ => {
                    return Err(DataSpaceError::conflict(format!(
                        "parent '{parent}' of node '{id}' is deleted"
                    )))
                }
            }
        }
        node.is_deleted = deleted;
        node.updated_at = timestamp_now();
        Self::write(tx, &node).await?;
        Ok(node)
    }

    /// Remove the catalog row itself
    pub async fn remove(tx: &mut Transaction<'_>, id: &str) -> Result<(), DataSpaceError> {
        let key = Self::key(id);
        if apply_restoring(tx, &key, key.delete()?).await? == 0 {
            return Err(DataSpaceError::node_not_found(id));
        }
        Ok(())
    }

    /// Live documents whose id is an ISO date, newest first.
    ///
    /// The GLOB admits ids such as `2024-13-45`; paging runs after those are
    /// dropped so a page is never short.
    pub async fn list_day_docs(
        exec: &dyn SqlExecutor,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Node>, DatabaseError> {
        let stmt = Statement::text(
            "SELECT * FROM ds__tree WHERE type = 'doc' AND is_deleted = 0 \
             AND id GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]' \
             ORDER BY id DESC",
        )?;
        let mut nodes = Vec::new();
        for row in exec.query(&stmt).await? {
            let node = Self::node_from_row(&row)?;
            if NaiveDate::parse_from_str(&node.id, "%Y-%m-%d").is_ok() {
                nodes.push(node);
            }
        }
        Ok(nodes
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

pub(crate) fn type_label(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Table => "Table",
        NodeType::Doc => "Document",
        NodeType::Script => "Script",
        NodeType::Action => "Action",
    }
}
