//! Action/Script Registry
//!
//! Prompts and actions stored in `ds__scripts`, listed in registration order.
//! Every script also has a catalog node (type `script` or `action`) with the
//! same id; this module only owns the registry row.

use crate::db::schema::SCRIPTS_TABLE;
use crate::db::{DatabaseError, SqlExecutor, SqlRow, Statement, Transaction};
use crate::models::{Script, ScriptFilter, ScriptType};
use crate::services::snapshot::{apply_restoring, RowKey};
use crate::services::DataSpaceError;

pub struct ScriptRegistry;

impl ScriptRegistry {
    fn key(id: &str) -> RowKey {
        RowKey::new(SCRIPTS_TABLE).eq("id", id)
    }

    fn script_from_row(row: &SqlRow) -> Result<Script, DatabaseError> {
        let script_type = row
            .text("type")?
            .parse::<ScriptType>()
            .map_err(|_| DatabaseError::row_decode("type", "script type"))?;
        Ok(Script {
            id: row.text("id")?,
            script_type,
            name: row.text("name")?,
            description: row.opt_text("description")?,
            enabled: row.boolean("enabled")?,
            code: row.opt_text("code")?,
            params: serde_json::from_str(&row.text("params")?)?,
            nodes: serde_json::from_str(&row.text("nodes")?)?,
        })
    }

    pub async fn get(exec: &dyn SqlExecutor, id: &str) -> Result<Option<Script>, DatabaseError> {
        let stmt =
            Statement::with_params("SELECT * FROM ds__scripts WHERE id = ?", vec![id.into()])?;
        exec.query_optional(&stmt)
            .await?
            .map(|row| Self::script_from_row(&row))
            .transpose()
    }

    pub async fn require(exec: &dyn SqlExecutor, id: &str) -> Result<Script, DataSpaceError> {
        Self::get(exec, id)
            .await?
            .ok_or_else(|| DataSpaceError::script_not_found(id))
    }

    /// Scripts matching `filter`, oldest registration first
    pub async fn list(
        exec: &dyn SqlExecutor,
        filter: &ScriptFilter,
    ) -> Result<Vec<Script>, DatabaseError> {
        let stmt = match (filter.script_type, filter.enabled) {
            (Some(t), Some(e)) => Statement::with_params(
                "SELECT * FROM ds__scripts WHERE type = ? AND enabled = ? ORDER BY seq",
                vec![t.as_str().into(), e.into()],
            )?,
            (Some(t), None) => Statement::with_params(
                "SELECT * FROM ds__scripts WHERE type = ? ORDER BY seq",
                vec![t.as_str().into()],
            )?,
            (None, Some(e)) => Statement::with_params(
                "SELECT * FROM ds__scripts WHERE enabled = ? ORDER BY seq",
                vec![e.into()],
            )?,
            (None, None) => Statement::text("SELECT * FROM ds__scripts ORDER BY seq")?,
        };
        exec.query(&stmt)
            .await?
            .iter()
            .map(Self::script_from_row)
            .collect()
    }

    pub async fn insert(tx: &mut Transaction<'_>, script: &Script) -> Result<(), DataSpaceError> {
        if Self::get(&*tx, &script.id).await?.is_some() {
            return Err(DataSpaceError::conflict(format!(
                "script id '{}' already exists",
                script.id
            )));
        }
        let next = Statement::text("SELECT COALESCE(MAX(seq), 0) + 1 AS next FROM ds__scripts")?;
        let seq = match tx.query_optional(&next).await? {
            Some(row) => row.integer("next")?,
            None => 1,
        };

        let insert = Statement::with_params(
            "INSERT INTO ds__scripts (id, type, name, description, enabled, code, params, nodes, seq) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                script.id.as_str().into(),
                script.script_type.as_str().into(),
                script.name.as_str().into(),
                script.description.clone().into(),
                script.enabled.into(),
                script.code.clone().into(),
                serde_json::to_string(&script.params)?.into(),
                serde_json::to_string(&script.nodes)?.into(),
                seq.into(),
            ],
        )?;
        tx.apply(insert, vec![Self::key(&script.id).delete()?])
            .await?;
        Ok(())
    }

    pub async fn update_code(
        tx: &mut Transaction<'_>,
        id: &str,
        code: &str,
    ) -> Result<Script, DataSpaceError> {
        let mut script = Self::require(&*tx, id).await?;
        if script.code.as_deref() == Some(code) {
            return Ok(script);
        }
        let update = Statement::with_params(
            "UPDATE ds__scripts SET code = ? WHERE id = ?",
            vec![code.into(), id.into()],
        )?;
        apply_restoring(tx, &Self::key(id), update).await?;
        script.code = Some(code.to_string());
        Ok(script)
    }

    pub async fn set_enabled(
        tx: &mut Transaction<'_>,
        id: &str,
        enabled: bool,
    ) -> Result<Script, DataSpaceError> {
        let mut script = Self::require(&*tx, id).await?;
        if script.enabled == enabled {
            return Ok(script);
        }
        let update = Statement::with_params(
            "UPDATE ds__scripts SET enabled = ? WHERE id = ?",
            vec![enabled.into(), id.into()],
        )?;
        apply_restoring(tx, &Self::key(id), update).await?;
        script.enabled = enabled;
        Ok(script)
    }

    /// Keep the registry name in step with the catalog node
    pub async fn rename(tx: &mut Transaction<'_>, id: &str, name: &str) -> Result<(), DatabaseError> {
        let update = Statement::with_params(
            "UPDATE ds__scripts SET name = ? WHERE id = ?",
            vec![name.into(), id.into()],
        )?;
        apply_restoring(tx, &Self::key(id), update).await?;
        Ok(())
    }

    pub async fn delete(tx: &mut Transaction<'_>, id: &str) -> Result<bool, DatabaseError> {
        let key = Self::key(id);
        Ok(apply_restoring(tx, &key, key.delete()?).await? > 0)
    }
}
