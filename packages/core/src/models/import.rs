//! Bulk table import
//!
//! A table described by its columns plus rows of values in column order, as
//! produced by a CSV reader.

use serde::{Deserialize, Serialize};

use crate::models::FieldType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportColumn {
    /// Display name
    pub name: String,
    #[serde(rename = "type", default = "default_import_type")]
    pub field_type: FieldType,
}

fn default_import_type() -> FieldType {
    FieldType::Text
}

impl ImportColumn {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableImport {
    /// Node id to use; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// A `title` column maps onto the table's built-in title column, every
    /// other column gets a generated `cl_` name
    pub columns: Vec<ImportColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableImport {
    pub fn new(name: impl Into<String>, columns: Vec<ImportColumn>) -> Self {
        Self {
            id: None,
            name: name.into(),
            parent_id: None,
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<serde_json::Value>>) -> Self {
        self.rows = rows;
        self
    }

    /// Index of the column stored in the built-in `title` column
    pub fn title_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.field_type == FieldType::Title)
    }
}
