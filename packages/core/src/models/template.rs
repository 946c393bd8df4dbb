//! Action Argument Templates
//!
//! Action calls store their arguments as JSON in which strings may carry
//! `{{param}}` holes. An [`ArgTemplate`] resolves the holes against the values
//! supplied when the action runs.
//!
//! Resolution is a single pass: a substituted value is data and is never
//! scanned for holes again. A string that is exactly one hole takes the
//! argument's JSON value as is (so numbers stay numbers); a hole embedded in
//! longer text is replaced by the value's text form.

use crate::models::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static HOLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgTemplate(serde_json::Value);

impl ArgTemplate {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Every hole name used anywhere in the template
    pub fn holes(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_holes(&self.0, &mut names);
        names
    }

    pub fn resolve(
        &self,
        args: &HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ValidationError> {
        resolve_value(&self.0, args)
    }
}

fn collect_holes(value: &serde_json::Value, names: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            for caps in HOLE_RE.captures_iter(s) {
                let name = caps[1].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_holes(v, names)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_holes(v, names)),
        _ => {}
    }
}

fn resolve_value(
    value: &serde_json::Value,
    args: &HashMap<String, serde_json::Value>,
) -> Result<serde_json::Value, ValidationError> {
    match value {
        serde_json::Value::String(s) => resolve_string(s, args),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, args))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, args)?)))
            .collect::<Result<serde_json::Map<_, _>, ValidationError>>()
            .map(serde_json::Value::Object),
        other => Ok(other.clone()),
    }
}

fn lookup<'a>(
    name: &str,
    args: &'a HashMap<String, serde_json::Value>,
) -> Result<&'a serde_json::Value, ValidationError> {
    args.get(name)
        .ok_or_else(|| ValidationError::UnknownParameter(name.to_string()))
}

fn resolve_string(
    text: &str,
    args: &HashMap<String, serde_json::Value>,
) -> Result<serde_json::Value, ValidationError> {
    if let Some(caps) = HOLE_RE.captures(text) {
        if caps.get(0).is_some_and(|m| m.as_str() == text) {
            return lookup(&caps[1], args).cloned();
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in HOLE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        match lookup(&caps[1], args)? {
            serde_json::Value::String(s) => out.push_str(s),
            serde_json::Value::Null => {}
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(serde_json::Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_whole_hole_keeps_json_type() {
        let t = ArgTemplate::new(json!({"n": "{{count}}", "title": "{{ content }}"}));
        let resolved = t
            .resolve(&args(&[("count", json!(3)), ("content", json!("buy milk"))]))
            .unwrap();
        assert_eq!(resolved, json!({"n": 3, "title": "buy milk"}));
    }

    #[test]
    fn test_embedded_hole_is_text() {
        let t = ArgTemplate::new(json!(["Task: {{content}} ({{n}})"]));
        let resolved = t
            .resolve(&args(&[("content", json!("x")), ("n", json!(2))]))
            .unwrap();
        assert_eq!(resolved, json!(["Task: x (2)"]));
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let t = ArgTemplate::new(json!("{{a}} and {{b}}"));
        let resolved = t
            .resolve(&args(&[("a", json!("{{b}}")), ("b", json!("B"))]))
            .unwrap();
        assert_eq!(resolved, json!("{{b}} and B"));
    }

    #[test]
    fn test_unknown_hole_is_rejected() {
        let t = ArgTemplate::new(json!({"title": "{{missing}}"}));
        assert_eq!(
            t.resolve(&HashMap::new()).unwrap_err(),
            ValidationError::UnknownParameter("missing".to_string())
        );
    }

    #[test]
    fn test_holes_listed_once() {
        let t = ArgTemplate::new(json!({"a": "{{x}}", "b": ["{{x}} {{y}}"]}));
        let mut holes = t.holes();
        holes.sort();
        assert_eq!(holes, vec!["x", "y"]);
    }
}
