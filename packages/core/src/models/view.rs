//! Saved Views
//!
//! A view is a named saved query over one table plus display state
//! (field order and hidden fields). The query is stored as SQL text and edited
//! through [`SelectStatement`](crate::models::SelectStatement).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::models::ValidationError;

/// Name given to views created without one
pub const DEFAULT_VIEW_NAME: &str = "New View";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    #[default]
    Grid,
    Gallery,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Grid => "grid",
            ViewType::Gallery => "gallery",
        }
    }
}

impl FromStr for ViewType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid" => Ok(ViewType::Grid),
            "gallery" => Ok(ViewType::Gallery),
            other => Err(ValidationError::invalid_argument(format!(
                "unknown view type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: String,
    pub table_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub view_type: ViewType,
    pub query: String,
    /// Raw column name → display position
    pub order_map: BTreeMap<String, i64>,
    /// Raw column names hidden in this view
    pub hidden_fields: Vec<String>,
    pub position: f64,
}

/// Partial view update; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub view_type: Option<ViewType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_map: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
}

impl ViewPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_order_map(mut self, order_map: BTreeMap<String, i64>) -> Self {
        self.order_map = Some(order_map);
        self
    }

    pub fn with_hidden_fields(mut self, hidden: Vec<String>) -> Self {
        self.hidden_fields = Some(hidden);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.view_type.is_none()
            && self.query.is_none()
            && self.order_map.is_none()
            && self.hidden_fields.is_none()
            && self.position.is_none()
    }

    /// Merge into `view`. Hidden fields are stored as a set, first occurrence wins.
    pub fn apply_to(&self, view: &mut View) {
        if let Some(name) = &self.name {
            view.name = name.clone();
        }
        if let Some(view_type) = self.view_type {
            view.view_type = view_type;
        }
        if let Some(query) = &self.query {
            view.query = query.clone();
        }
        if let Some(order_map) = &self.order_map {
            view.order_map = order_map.clone();
        }
        if let Some(hidden) = &self.hidden_fields {
            let mut deduped: Vec<String> = Vec::with_capacity(hidden.len());
            for field in hidden {
                if !deduped.contains(field) {
                    deduped.push(field.clone());
                }
            }
            view.hidden_fields = deduped;
        }
        if let Some(position) = self.position {
            view.position = position;
        }
    }
}
