//! Undo/Redo Log
//!
//! Each committed mutating operation leaves one entry in `ds__undo_log`: its
//! forward statements and the statements reverting them, both as JSON. The
//! log is written inside the operation's own transaction, so an entry exists
//! exactly when the change it describes does.
//!
//! Entries sit on one of two stacks ordered by `ordinal`. Recording a new
//! operation clears the redo stack; undo and redo move the top entry across.

use crate::db::{DatabaseError, Journal, SqlExecutor, SqlRow, Statement, Transaction};
use crate::models::{new_node_id, timestamp_now};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoStack {
    Undo,
    Redo,
}

impl UndoStack {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoStack::Undo => "undo",
            UndoStack::Redo => "redo",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            UndoStack::Undo => UndoStack::Redo,
            UndoStack::Redo => UndoStack::Undo,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UndoEntry {
    pub tx_id: String,
    pub label: String,
    pub forward: Vec<Statement>,
    pub inverse: Vec<Statement>,
    pub committed_at: String,
}

pub struct UndoLog;

impl UndoLog {
    fn entry_from_row(row: &SqlRow) -> Result<UndoEntry, DatabaseError> {
        Ok(UndoEntry {
            tx_id: row.text("tx_id")?,
            label: row.text("label")?,
            forward: serde_json::from_str(&row.text("forward")?)?,
            inverse: serde_json::from_str(&row.text("inverse")?)?,
            committed_at: row.text("committed_at")?,
        })
    }

    async fn next_ordinal(exec: &dyn SqlExecutor, stack: UndoStack) -> Result<i64, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT COALESCE(MAX(ordinal), 0) + 1 AS next FROM ds__undo_log WHERE stack = ?",
            vec![stack.as_str().into()],
        )?;
        match exec.query_optional(&stmt).await? {
            Some(row) => row.integer("next"),
            None => Ok(1),
        }
    }

    /// Push `journal` onto the undo stack, clear redo and keep at most `limit`
    /// undo entries. The log itself is not journaled.
    pub async fn record(
        tx: &Transaction<'_>,
        label: &str,
        journal: &Journal,
        limit: usize,
    ) -> Result<String, DatabaseError> {
        tx.execute(&Statement::text(
            "DELETE FROM ds__undo_log WHERE stack = 'redo'",
        )?)
        .await?;

        let tx_id = new_node_id();
        let ordinal = Self::next_ordinal(tx, UndoStack::Undo).await?;
        let insert = Statement::with_params(
            "INSERT INTO ds__undo_log (tx_id, label, stack, ordinal, forward, inverse, committed_at) \
             VALUES (?, ?, 'undo', ?, ?, ?, ?)",
            vec![
                tx_id.as_str().into(),
                label.into(),
                ordinal.into(),
                serde_json::to_string(&journal.forward)?.into(),
                serde_json::to_string(&journal.inverse)?.into(),
                timestamp_now().into(),
            ],
        )?;
        tx.execute(&insert).await?;

        let trim = Statement::with_params(
            "DELETE FROM ds__undo_log WHERE stack = 'undo' AND ordinal <= ?",
            vec![(ordinal - limit as i64).into()],
        )?;
        let trimmed = tx.execute(&trim).await?;
        if trimmed > 0 {
            tracing::debug!("Trimmed {} undo entries beyond limit {}", trimmed, limit);
        }
        Ok(tx_id)
    }

    /// Most recent entry of `stack`
    pub async fn top(
        exec: &dyn SqlExecutor,
        stack: UndoStack,
    ) -> Result<Option<UndoEntry>, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT * FROM ds__undo_log WHERE stack = ? ORDER BY ordinal DESC LIMIT 1",
            vec![stack.as_str().into()],
        )?;
        exec.query_optional(&stmt)
            .await?
            .map(|row| Self::entry_from_row(&row))
            .transpose()
    }

    /// Put the entry on top of `stack`
    pub async fn move_to(
        tx: &Transaction<'_>,
        tx_id: &str,
        stack: UndoStack,
    ) -> Result<(), DatabaseError> {
        let ordinal = Self::next_ordinal(tx, stack).await?;
        let update = Statement::with_params(
            "UPDATE ds__undo_log SET stack = ?, ordinal = ? WHERE tx_id = ?",
            vec![stack.as_str().into(), ordinal.into(), tx_id.into()],
        )?;
        tx.execute(&update).await?;
        Ok(())
    }

    pub async fn len(exec: &dyn SqlExecutor, stack: UndoStack) -> Result<usize, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT COUNT(*) AS n FROM ds__undo_log WHERE stack = ?",
            vec![stack.as_str().into()],
        )?;
        match exec.query_optional(&stmt).await? {
            Some(row) => Ok(row.integer("n")?.max(0) as usize),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqlGateway, MEMORY_PATH};
    use std::time::Duration;

    fn journal(n: usize) -> Journal {
        let stmt = Statement::text("DELETE FROM ds__docs").expect("static statement");
        Journal {
            forward: vec![stmt.clone(); n],
            inverse: vec![stmt; n],
        }
    }

    #[tokio::test]
    async fn test_record_trims_to_limit() {
        let gateway = SqlGateway::open(MEMORY_PATH, Duration::from_secs(1))
            .await
            .unwrap();
        for i in 0..5 {
            let tx = gateway.begin().await.unwrap();
            let result = UndoLog::record(&tx, &format!("op {i}"), &journal(1), 3).await;
            tx.finish(result).await.unwrap();
        }

        assert_eq!(UndoLog::len(&gateway, UndoStack::Undo).await.unwrap(), 3);
        let top = UndoLog::top(&gateway, UndoStack::Undo).await.unwrap().unwrap();
        assert_eq!(top.label, "op 4");
        assert_eq!(top.forward.len(), 1);
    }

    #[tokio::test]
    async fn test_record_clears_redo() {
        let gateway = SqlGateway::open(MEMORY_PATH, Duration::from_secs(1))
            .await
            .unwrap();
        let tx = gateway.begin().await.unwrap();
        let id = UndoLog::record(&tx, "first", &journal(2), 10).await.unwrap();
        UndoLog::move_to(&tx, &id, UndoStack::Redo).await.unwrap();
        tx.finish(Ok::<_, DatabaseError>(())).await.unwrap();
        assert_eq!(UndoLog::len(&gateway, UndoStack::Redo).await.unwrap(), 1);

        let tx = gateway.begin().await.unwrap();
        let result = UndoLog::record(&tx, "second", &journal(1), 10).await;
        tx.finish(result).await.unwrap();
        assert_eq!(UndoLog::len(&gateway, UndoStack::Redo).await.unwrap(), 0);
        assert_eq!(UndoLog::len(&gateway, UndoStack::Undo).await.unwrap(), 1);
    }
}
