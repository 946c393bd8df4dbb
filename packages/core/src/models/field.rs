//! Field (UI Column) Metadata
//!
//! A physical column of a user table carries display metadata in
//! `ds__columns`: a display name, a [`FieldType`] and a JSON `property` blob
//! holding type configuration such as select options.

use crate::models::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical column every user table is created with
pub const ROW_ID_COLUMN: &str = "_id";
/// Title column every user table is created with
pub const TITLE_COLUMN: &str = "title";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Title,
    Text,
    Number,
    Select,
    MultiSelect,
    Checkbox,
    Date,
    File,
    Url,
    RowId,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Title => "title",
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi-select",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::File => "file",
            FieldType::Url => "url",
            FieldType::RowId => "row-id",
        }
    }

    /// Column affinity used when the field is added to a physical table
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Number => "REAL",
            FieldType::Checkbox => "INTEGER",
            _ => "TEXT",
        }
    }

    /// Whether `property` holds a list of select options
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::MultiSelect)
    }

    /// Initial `property` for a freshly added field
    pub fn default_property(&self) -> serde_json::Value {
        if self.has_options() {
            serde_json::json!({ "options": [] })
        } else {
            serde_json::json!({})
        }
    }
}

impl FromStr for FieldType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(FieldType::Title),
            "text" => Ok(FieldType::Text),
            "number" => Ok(FieldType::Number),
            "select" => Ok(FieldType::Select),
            "multi-select" => Ok(FieldType::MultiSelect),
            "checkbox" => Ok(FieldType::Checkbox),
            "date" => Ok(FieldType::Date),
            "file" => Ok(FieldType::File),
            "url" => Ok(FieldType::Url),
            "row-id" => Ok(FieldType::RowId),
            other => Err(ValidationError::InvalidFieldType(other.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field metadata joined with a physical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiColumn {
    pub table_name: String,
    pub table_column_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub property: serde_json::Value,
}

impl UiColumn {
    pub fn new(
        table_name: impl Into<String>,
        column: impl Into<String>,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            table_column_name: column.into(),
            name: name.into(),
            field_type,
            property: field_type.default_property(),
        }
    }

    /// Field synthesized for a physical column that has no metadata row
    pub fn synthesized(table_name: impl Into<String>, column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            table_name: table_name.into(),
            name: column.clone(),
            table_column_name: column,
            field_type: FieldType::Text,
            property: serde_json::json!({}),
        }
    }

    pub fn select_options(&self) -> Vec<SelectOption> {
        self.property
            .get("options")
            .cloned()
            .and_then(|options| serde_json::from_value(options).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl SelectOption {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: id[..8].to_string(),
            name: name.into(),
            color: color.into(),
        }
    }
}
