//! Catalog Node Data Structures
//!
//! Every piece of content in a data space (table, document, script, action) is
//! registered as one [`Node`] in the catalog. The node carries hierarchy,
//! ordering and display flags; the content itself lives elsewhere:
//!
//! - `table` nodes own a physical table named `tb_<id>`
//! - `doc` nodes own one content row in the document store
//! - `script` and `action` nodes own one row in the script registry
//!
//! # Examples
//!
//! ```rust
//! use dataspace_core::models::{new_node_id, physical_table_name, NodeType};
//!
//! let id = new_node_id();
//! assert_eq!(id.len(), 32);
//! assert_eq!(physical_table_name(&id).unwrap().as_str(), format!("tb_{id}"));
//! assert_eq!("table".parse::<NodeType>().unwrap(), NodeType::Table);
//! ```

use crate::db::Identifier;
use crate::models::ValidationError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of content a catalog node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Table,
    Doc,
    Script,
    Action,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Table => "table",
            NodeType::Doc => "doc",
            NodeType::Script => "script",
            NodeType::Action => "action",
        }
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(NodeType::Table),
            "doc" => Ok(NodeType::Doc),
            "script" => Ok(NodeType::Script),
            "action" => Ok(NodeType::Action),
            other => Err(ValidationError::InvalidNodeType(other.to_string())),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry
///
/// Timestamps are RFC 3339 UTC strings. `position` orders siblings under the
/// same `parent_id` (ascending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub parent_id: Option<String>,
    pub position: f64,
    pub is_pinned: bool,
    pub is_full_width: bool,
    pub is_deleted: bool,
    pub icon: Option<String>,
    pub cover: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Node {
    /// A fresh, not yet persisted node
    pub fn new(node_type: NodeType, name: impl Into<String>, parent_id: Option<String>) -> Self {
        Self::new_with_id(new_node_id(), node_type, name, parent_id)
    }

    /// Same as [`Node::new`] with a caller-chosen id (daily documents use the date)
    pub fn new_with_id(
        id: impl Into<String>,
        node_type: NodeType,
        name: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            parent_id,
            position: 0.0,
            is_pinned: false,
            is_full_width: false,
            is_deleted: false,
            icon: None,
            cover: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Physical table backing a `table` node
    pub fn table_name(&self) -> Result<Identifier, ValidationError> {
        if self.node_type != NodeType::Table {
            return Err(ValidationError::InvalidNodeType(format!(
                "{} is a {}, not a table",
                self.id, self.node_type
            )));
        }
        physical_table_name(&self.id)
    }
}

/// 32 lowercase hex characters from a v4 UUID
pub fn new_node_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `tb_<id>` for a table node id
pub fn physical_table_name(id: &str) -> Result<Identifier, ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::InvalidId(id.to_string()));
    }
    Identifier::new(format!("tb_{id}")).map_err(|_| ValidationError::InvalidId(id.to_string()))
}

/// Inverse of [`physical_table_name`]
pub fn table_id_from_name(table_name: &str) -> Option<&str> {
    table_name.strip_prefix("tb_").filter(|id| !id.is_empty())
}

pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Custom deserializer for double-Option fields
///
/// - Missing field → None (don't update)
/// - null → Some(None) (set to NULL)
/// - "value" → Some(Some("value")) (set to value)
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial catalog update
///
/// `parent_id`, `icon` and `cover` use the double-`Option` pattern:
/// `None` leaves the field alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent_id: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_full_width: Option<bool>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub icon: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub cover: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.is_pinned = Some(pinned);
        self
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.parent_id.is_none()
            && self.position.is_none()
            && self.is_pinned.is_none()
            && self.is_full_width.is_none()
            && self.icon.is_none()
            && self.cover.is_none()
    }

    /// Apply the patch to an in-memory node
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            node.parent_id = parent_id.clone();
        }
        if let Some(position) = self.position {
            node.position = position;
        }
        if let Some(pinned) = self.is_pinned {
            node.is_pinned = pinned;
        }
        if let Some(full_width) = self.is_full_width {
            node.is_full_width = full_width;
        }
        if let Some(icon) = &self.icon {
            node.icon = icon.clone();
        }
        if let Some(cover) = &self.cover {
            node.cover = cover.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ids_are_table_safe() {
        let id = new_node_id();
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(physical_table_name(&id).is_ok());
        assert_eq!(table_id_from_name(&format!("tb_{id}")), Some(id.as_str()));
    }

    #[test]
    fn test_physical_table_name_rejects_unsafe_ids() {
        assert!(physical_table_name("").is_err());
        assert!(physical_table_name("x\"; DROP TABLE ds__tree; --").is_err());
    }

    #[test]
    fn test_table_name_only_for_tables() {
        let doc = Node::new(NodeType::Doc, "Notes", None);
        assert!(doc.table_name().is_err());
        let table = Node::new(NodeType::Table, "Tasks", None);
        assert_eq!(table.table_name().unwrap().as_str(), format!("tb_{}", table.id));
    }

    #[test]
    fn test_node_update_double_option() {
        let patch: NodeUpdate = serde_json::from_str(r#"{"parentId": null}"#).unwrap();
        assert_eq!(patch.parent_id, Some(None));
        assert!(patch.icon.is_none());

        let empty: NodeUpdate = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_node_update_apply() {
        let mut node = Node::new(NodeType::Table, "Tasks", Some("folder".to_string()));
        NodeUpdate::new()
            .with_parent(None)
            .with_position(2.5)
            .with_pinned(true)
            .apply_to(&mut node);
        assert_eq!(node.parent_id, None);
        assert_eq!(node.position, 2.5);
        assert!(node.is_pinned);
    }
}
