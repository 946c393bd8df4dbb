//! Document Store
//!
//! Markdown bodies keyed by doc node id in `ds__docs`. The catalog row is
//! managed separately; deleting content leaves the node in place.

use crate::db::schema::DOCS_TABLE;
use crate::db::{DatabaseError, SqlExecutor, Statement, Transaction};
use crate::services::snapshot::{apply_restoring, RowKey};

pub struct DocumentStore;

impl DocumentStore {
    fn key(id: &str) -> RowKey {
        RowKey::new(DOCS_TABLE).eq("id", id)
    }

    pub async fn get(exec: &dyn SqlExecutor, id: &str) -> Result<Option<String>, DatabaseError> {
        let stmt = Statement::with_params("SELECT content FROM ds__docs WHERE id = ?", vec![id.into()])?;
        match exec.query_optional(&stmt).await? {
            Some(row) => Ok(Some(row.opt_text("content")?.unwrap_or_default())),
            None => Ok(None),
        }
    }

    pub async fn upsert(
        tx: &mut Transaction<'_>,
        id: &str,
        content: &str,
    ) -> Result<(), DatabaseError> {
        let upsert = Statement::with_params(
            "INSERT INTO ds__docs (id, content) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET content = excluded.content",
            vec![id.into(), content.into()],
        )?;
        apply_restoring(tx, &Self::key(id), upsert).await?;
        Ok(())
    }

    /// Remove the content row; returns whether one existed
    pub async fn delete(tx: &mut Transaction<'_>, id: &str) -> Result<bool, DatabaseError> {
        let key = Self::key(id);
        Ok(apply_restoring(tx, &key, key.delete()?).await? > 0)
    }
}
