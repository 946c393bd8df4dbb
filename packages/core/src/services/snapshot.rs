//! Before-images for journaled mutations
//!
//! A mutation is journaled together with statements that put the touched rows
//! (or the whole table) back exactly as they were, so undo is a replay of
//! plain statements.

use crate::db::{
    DatabaseError, Identifier, SqlExecutor, SqlValue, Statement, StatementBuilder, Transaction,
};

/// Rows of one table selected by column equality
#[derive(Debug, Clone)]
pub(crate) struct RowKey {
    table: Identifier,
    conditions: Vec<(Identifier, SqlValue)>,
}

impl RowKey {
    /// `table` and column names are crate constants or validated identifiers
    pub(crate) fn new(table: &str) -> Self {
        Self {
            table: Identifier::from_engine(table),
            conditions: Vec::new(),
        }
    }

    pub(crate) fn eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions
            .push((Identifier::from_engine(column), value.into()));
        self
    }

    fn filtered(&self, builder: StatementBuilder) -> StatementBuilder {
        let mut builder = builder.ident(&self.table);
        for (idx, (column, value)) in self.conditions.iter().enumerate() {
            builder = builder
                .sql(if idx == 0 { " WHERE " } else { " AND " })
                .ident(column)
                .sql(" = ")
                .bind(value.clone());
        }
        builder
    }

    pub(crate) fn select(&self) -> Result<Statement, DatabaseError> {
        Ok(self
            .filtered(Statement::builder().sql("SELECT * FROM "))
            .build()?)
    }

    pub(crate) fn delete(&self) -> Result<Statement, DatabaseError> {
        Ok(self
            .filtered(Statement::builder().sql("DELETE FROM "))
            .build()?)
    }
}

/// Run `forward` and journal the statements restoring the rows under `key`
pub(crate) async fn apply_restoring(
    tx: &mut Transaction<'_>,
    key: &RowKey,
    forward: Statement,
) -> Result<u64, DatabaseError> {
    let before = tx.query(&key.select()?).await?;
    let mut inverse = Vec::with_capacity(before.len() + 1);
    inverse.push(key.delete()?);
    for row in &before {
        inverse.push(Statement::insert_row(&key.table, row)?);
    }
    tx.apply(forward, inverse).await
}

/// Statements recreating `table` with its rows (and rowids), or `None` when
/// the table does not exist
pub(crate) async fn table_image(
    exec: &dyn SqlExecutor,
    table: &Identifier,
) -> Result<Option<Vec<Statement>>, DatabaseError> {
    let ddl = Statement::with_params(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
        vec![table.as_str().into()],
    )?;
    let Some(row) = exec.query_optional(&ddl).await? else {
        return Ok(None);
    };

    let mut image = vec![Statement::from_engine(row.text("sql")?)];
    let select = Statement::builder()
        .sql("SELECT rowid, * FROM ")
        .ident(table)
        .build()?;
    for row in exec.query(&select).await? {
        image.push(Statement::insert_row(table, &row)?);
    }
    Ok(Some(image))
}
