//! Configuration for an open data space

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest undo history kept; each entry holds full before-images
const MAX_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSpaceConfig {
    /// Database file, or `:memory:` for a private in-memory database
    pub db_path: PathBuf,

    /// How long a statement waits on a locked database file
    pub busy_timeout_ms: u64,

    pub undo: UndoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// When false no undo log is written and undo/redo are unavailable
    pub enabled: bool,

    /// Number of undo entries kept; older ones are trimmed on commit
    pub history_limit: usize,
}

impl Default for DataSpaceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("dataspace.db"),
            busy_timeout_ms: 5_000,
            undo: UndoConfig::default(),
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_limit: 100,
        }
    }
}

impl DataSpaceConfig {
    /// Default configuration for the database at `db_path`
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> Self {
        Self::new(crate::db::MEMORY_PATH)
    }

    pub fn without_undo(mut self) -> Self {
        self.undo.enabled = false;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| format!("invalid config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DATASPACE_DB_PATH`, `DATASPACE_UNDO` and `DATASPACE_UNDO_LIMIT`
    pub fn with_env_overrides(self) -> Result<Self, String> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DATASPACE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(flag) = lookup("DATASPACE_UNDO") {
            self.undo.enabled = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => return Err(format!("DATASPACE_UNDO: expected a boolean, got '{other}'")),
            };
        }
        if let Some(limit) = lookup("DATASPACE_UNDO_LIMIT") {
            self.undo.history_limit = limit
                .trim()
                .parse()
                .map_err(|_| format!("DATASPACE_UNDO_LIMIT: expected a number, got '{limit}'"))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.db_path.as_os_str().is_empty() {
            return Err("db_path cannot be empty".to_string());
        }

        if self.undo.history_limit == 0 {
            return Err("undo.history_limit must be greater than 0".to_string());
        }

        if self.undo.history_limit > MAX_HISTORY_LIMIT {
            return Err(format!(
                "undo.history_limit cannot exceed {}",
                MAX_HISTORY_LIMIT
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DataSpaceConfig::default();
        assert_eq!(config.db_path, PathBuf::from("dataspace.db"));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.undo.enabled);
        assert_eq!(config.undo.history_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DataSpaceConfig::in_memory();
        assert!(config.validate().is_ok());

        config.undo.history_limit = 0;
        assert!(config.validate().is_err());

        config.undo.history_limit = MAX_HISTORY_LIMIT + 1;
        assert!(config.validate().is_err());

        config.undo.history_limit = 10;
        config.db_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: DataSpaceConfig =
            serde_json::from_str(r#"{"db_path": "/tmp/x.db", "undo": {"enabled": false}}"#)
                .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert!(!config.undo.enabled);
        assert_eq!(config.undo.history_limit, 100);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataspace.json");
        std::fs::write(&path, r#"{"busy_timeout_ms": 250}"#).unwrap();

        let config = DataSpaceConfig::from_json_file(&path).unwrap();
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));

        std::fs::write(&path, r#"{"undo": {"history_limit": 0}}"#).unwrap();
        assert!(DataSpaceConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATASPACE_DB_PATH", ":memory:"),
            ("DATASPACE_UNDO", "off"),
            ("DATASPACE_UNDO_LIMIT", "7"),
        ]
        .into_iter()
        .collect();

        let config = DataSpaceConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.db_path, PathBuf::from(":memory:"));
        assert!(!config.undo.enabled);
        assert_eq!(config.undo.history_limit, 7);

        let bad = DataSpaceConfig::default()
            .with_overrides(|k| (k == "DATASPACE_UNDO").then(|| "maybe".to_string()));
        assert!(bad.is_err());
    }
}
