//! Scripts: Prompts and Actions
//!
//! A script is either a saved prompt (`code` holds the prompt text) or an
//! action: a parameter list plus a strictly linear list of built-in calls.
//!
//! ```json
//! {
//!   "name": "todo",
//!   "params": [{ "name": "content", "type": "string" }],
//!   "nodes": [{
//!     "name": "addRow",
//!     "params": [
//!       { "name": "tableName", "value": "tb_f1ab6a737f5a4c059aeb106f8ea5a79d" },
//!       { "name": "data", "value": { "title": "{{content}}" } }
//!     ]
//!   }]
//! }
//! ```

use crate::db::Identifier;
use crate::models::{ArgTemplate, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Prompt,
    Action,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::Prompt => "prompt",
            ScriptType::Action => "action",
        }
    }
}

impl FromStr for ScriptType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(ScriptType::Prompt),
            "action" => Ok(ScriptType::Action),
            other => Err(ValidationError::invalid_argument(format!(
                "unknown script type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: String,
    #[serde(rename = "type")]
    pub script_type: ScriptType,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub code: Option<String>,
    pub params: Vec<ActionParam>,
    pub nodes: Vec<ActionCall>,
}

impl Script {
    pub fn prompt(id: impl Into<String>, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script_type: ScriptType::Prompt,
            name: name.into(),
            description: None,
            enabled: true,
            code: Some(code.into()),
            params: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn action_definition(&self) -> Option<ActionDefinition> {
        (self.script_type == ScriptType::Action).then(|| ActionDefinition {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            description: self.description.clone(),
            params: self.params.clone(),
            nodes: self.nodes.clone(),
        })
    }
}

/// Exact-match filter for `script().list`; `None` matches anything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptFilter {
    #[serde(rename = "type")]
    pub script_type: Option<ScriptType>,
    pub enabled: Option<bool>,
}

impl ScriptFilter {
    pub fn prompts() -> Self {
        Self {
            script_type: Some(ScriptType::Prompt),
            enabled: None,
        }
    }

    pub fn actions() -> Self {
        Self {
            script_type: Some(ScriptType::Action),
            enabled: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn matches(&self, script: &Script) -> bool {
        self.script_type.map_or(true, |t| t == script.script_type)
            && self.enabled.map_or(true, |e| e == script.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParam {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
}

fn default_param_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArgument {
    pub name: String,
    pub value: ArgTemplate,
}

/// One step of an action: a built-in name and its templated arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub params: Vec<CallArgument>,
}

impl ActionCall {
    /// Resolve `{{param}}` holes against the run arguments and decode the
    /// built-in call.
    pub fn bind(
        &self,
        values: &HashMap<String, serde_json::Value>,
    ) -> Result<BuiltinCall, ValidationError> {
        let mut args = HashMap::with_capacity(self.params.len());
        for arg in &self.params {
            args.insert(arg.name.clone(), arg.value.resolve(values)?);
        }
        BuiltinCall::decode(&self.name, args)
    }
}

/// Action definition as submitted to `add_action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<ActionParam>,
    pub nodes: Vec<ActionCall>,
}

impl ActionDefinition {
    /// Structural checks done before an action is persisted: a name, unique
    /// parameter names, known built-ins and no holes naming undeclared
    /// parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        for (idx, param) in self.params.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(ValidationError::MissingField("params.name".to_string()));
            }
            if self.params[..idx].iter().any(|p| p.name == param.name) {
                return Err(ValidationError::invalid_argument(format!(
                    "duplicate parameter '{}'",
                    param.name
                )));
            }
        }
        for call in &self.nodes {
            BuiltinCall::check_name(&call.name)?;
            for arg in &call.params {
                if let Some(hole) = arg
                    .value
                    .holes()
                    .into_iter()
                    .find(|h| !self.params.iter().any(|p| &p.name == h))
                {
                    return Err(ValidationError::UnknownParameter(hole));
                }
            }
        }
        Ok(())
    }
}

/// Built-in operations an action step can invoke
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinCall {
    /// Insert one row; `data` maps raw column names to values
    AddRow {
        table_name: Identifier,
        data: serde_json::Map<String, serde_json::Value>,
    },
}

impl BuiltinCall {
    pub const ADD_ROW: &'static str = "addRow";

    pub fn check_name(name: &str) -> Result<(), ValidationError> {
        match name {
            Self::ADD_ROW => Ok(()),
            other => Err(ValidationError::UnknownBuiltin(other.to_string())),
        }
    }

    fn decode(
        name: &str,
        mut args: HashMap<String, serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        Self::check_name(name)?;

        let table_name = match args.remove("tableName") {
            Some(serde_json::Value::String(s)) => Identifier::new(s)?,
            Some(_) => {
                return Err(ValidationError::invalid_argument(
                    "addRow tableName must be a string",
                ))
            }
            None => return Err(ValidationError::MissingField("tableName".to_string())),
        };
        let data = match args.remove("data") {
            Some(serde_json::Value::Object(map)) => map,
            Some(_) => {
                return Err(ValidationError::invalid_argument(
                    "addRow data must be an object",
                ))
            }
            None => serde_json::Map::new(),
        };
        if let Some(extra) = args.keys().next() {
            return Err(ValidationError::UnknownParameter(extra.clone()));
        }

        Ok(BuiltinCall::AddRow { table_name, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo_action() -> ActionDefinition {
        serde_json::from_value(json!({
            "name": "todo",
            "params": [{"name": "content", "type": "string"}],
            "nodes": [{
                "name": "addRow",
                "params": [
                    {"name": "tableName", "value": "tb_f1ab"},
                    {"name": "data", "value": {"title": "{{content}}"}}
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_definition_validates() {
        assert!(todo_action().validate().is_ok());

        let mut unknown = todo_action();
        unknown.nodes[0].name = "sendMail".to_string();
        assert_eq!(
            unknown.validate().unwrap_err(),
            ValidationError::UnknownBuiltin("sendMail".to_string())
        );

        let mut undeclared = todo_action();
        undeclared.params.clear();
        assert_eq!(
            undeclared.validate().unwrap_err(),
            ValidationError::UnknownParameter("content".to_string())
        );
    }

    #[test]
    fn test_bind_add_row() {
        let action = todo_action();
        let values = HashMap::from([("content".to_string(), json!("buy milk"))]);
        let call = action.nodes[0].bind(&values).unwrap();
        let BuiltinCall::AddRow { table_name, data } = call;
        assert_eq!(table_name.as_str(), "tb_f1ab");
        assert_eq!(data.get("title"), Some(&json!("buy milk")));
    }

    #[test]
    fn test_bind_rejects_bad_table_name() {
        let mut action = todo_action();
        action.nodes[0].params[0].value = ArgTemplate::new(json!("{{content}}"));
        let values = HashMap::from([("content".to_string(), json!("x; DROP TABLE y"))]);
        assert!(matches!(
            action.nodes[0].bind(&values),
            Err(ValidationError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_filter_matching() {
        let mut prompt = Script::prompt("p1", "Summarize", "Summarize this");
        assert!(ScriptFilter::prompts().enabled(true).matches(&prompt));
        assert!(!ScriptFilter::actions().matches(&prompt));
        prompt.enabled = false;
        assert!(!ScriptFilter::prompts().enabled(true).matches(&prompt));
        assert!(ScriptFilter::default().matches(&prompt));
    }
}
