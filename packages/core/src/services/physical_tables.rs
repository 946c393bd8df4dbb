//! Physical User Tables
//!
//! DDL and row writes for `tb_<id>` tables. Like the other components this is
//! stateless: callers pass the transaction, and every change is journaled with
//! the statements that revert it.

use crate::db::{DatabaseError, Identifier, SqlExecutor, SqlRow, SqlValue, Statement, Transaction};
use crate::models::{FieldType, ROW_ID_COLUMN, TITLE_COLUMN};
use crate::services::snapshot::table_image;
use crate::services::DataSpaceError;

/// Engine-reported column of a physical table
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalColumn {
    pub name: String,
    pub declared_type: String,
}

pub struct PhysicalTables;

impl PhysicalTables {
    pub async fn exists(exec: &dyn SqlExecutor, table: &Identifier) -> Result<bool, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT 1 AS present FROM sqlite_master WHERE type = 'table' AND name = ?",
            vec![table.as_str().into()],
        )?;
        Ok(exec.query_optional(&stmt).await?.is_some())
    }

    /// Names of all `tb_*` tables, sorted
    pub async fn list(exec: &dyn SqlExecutor) -> Result<Vec<Identifier>, DatabaseError> {
        let stmt = Statement::text(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name GLOB 'tb_*' ORDER BY name",
        )?;
        exec.query(&stmt)
            .await?
            .iter()
            .map(|row| Ok(Identifier::from_engine(row.text("name")?)))
            .collect()
    }

    /// Columns in declaration order; empty when the table does not exist
    pub async fn columns(
        exec: &dyn SqlExecutor,
        table: &Identifier,
    ) -> Result<Vec<PhysicalColumn>, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT name, type FROM pragma_table_info(?) ORDER BY cid",
            vec![table.as_str().into()],
        )?;
        exec.query(&stmt)
            .await?
            .iter()
            .map(|row| {
                Ok(PhysicalColumn {
                    name: row.text("name")?,
                    declared_type: row.opt_text("type")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// `CREATE TABLE tb_<id> (_id TEXT PRIMARY KEY NOT NULL, title TEXT)`
    pub async fn create(tx: &mut Transaction<'_>, table: &Identifier) -> Result<(), DatabaseError> {
        let row_id = Identifier::from_engine(ROW_ID_COLUMN);
        let title = Identifier::from_engine(TITLE_COLUMN);
        let create = Statement::builder()
            .sql("CREATE TABLE ")
            .ident(table)
            .sql(" (")
            .ident(&row_id)
            .sql(" TEXT PRIMARY KEY NOT NULL, ")
            .ident(&title)
            .sql(" TEXT)")
            .build()?;
        tx.apply(create, vec![Self::drop_statement(table)?]).await?;
        Ok(())
    }

    /// Create `target` with the columns of `source` and copy its rows
    pub async fn copy(
        tx: &mut Transaction<'_>,
        source: &Identifier,
        target: &Identifier,
    ) -> Result<(), DataSpaceError> {
        let columns = Self::columns(&*tx, source).await?;
        if columns.is_empty() {
            return Err(DataSpaceError::not_found("Table", source.as_str()));
        }

        let mut create = Statement::builder().sql("CREATE TABLE ").ident(target).sql(" (");
        for (idx, column) in columns.iter().enumerate() {
            if idx > 0 {
                create = create.sql(", ");
            }
            create = create
                .ident(&Identifier::from_engine(column.name.as_str()))
                .sql(" ")
                .sql(affinity(&column.declared_type));
            if column.name == ROW_ID_COLUMN {
                create = create.sql(" PRIMARY KEY NOT NULL");
            }
        }
        tx.apply(create.sql(")").build()?, vec![Self::drop_statement(target)?])
            .await?;

        let names: Vec<Identifier> = columns
            .iter()
            .map(|c| Identifier::from_engine(c.name.as_str()))
            .collect();
        let copy_rows = Statement::builder()
            .sql("INSERT INTO ")
            .ident(target)
            .sql(" (rowid, ")
            .idents(&names)
            .sql(") SELECT rowid, ")
            .idents(&names)
            .sql(" FROM ")
            .ident(source)
            .build()?;
        // dropping the table reverts the copied rows too
        tx.apply(copy_rows, Vec::new()).await?;
        Ok(())
    }

    /// Drop `table`, journaling its definition and rows
    pub async fn drop(tx: &mut Transaction<'_>, table: &Identifier) -> Result<(), DataSpaceError> {
        let image = table_image(&*tx, table)
            .await?
            .ok_or_else(|| DataSpaceError::not_found("Table", table.as_str()))?;
        tx.apply(Self::drop_statement(table)?, image).await?;
        Ok(())
    }

    pub async fn add_column(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &Identifier,
        field_type: FieldType,
    ) -> Result<(), DatabaseError> {
        let add = Statement::builder()
            .sql("ALTER TABLE ")
            .ident(table)
            .sql(" ADD COLUMN ")
            .ident(column)
            .sql(" ")
            .sql(field_type.sql_type())
            .build()?;
        let revert = Statement::builder()
            .sql("ALTER TABLE ")
            .ident(table)
            .sql(" DROP COLUMN ")
            .ident(column)
            .build()?;
        tx.apply(add, vec![revert]).await?;
        Ok(())
    }

    /// Drop one column; the inverse rebuilds the table with its former values
    pub async fn drop_column(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &Identifier,
    ) -> Result<(), DataSpaceError> {
        let image = table_image(&*tx, table)
            .await?
            .ok_or_else(|| DataSpaceError::not_found("Table", table.as_str()))?;
        let drop_column = Statement::builder()
            .sql("ALTER TABLE ")
            .ident(table)
            .sql(" DROP COLUMN ")
            .ident(column)
            .build()?;

        let mut inverse = Vec::with_capacity(image.len() + 1);
        inverse.push(Self::drop_statement(table)?);
        inverse.extend(image);
        tx.apply(drop_column, inverse).await?;
        Ok(())
    }

    /// Insert one row with the next rowid so a redo reproduces it exactly.
    /// Returns the rowid.
    pub async fn insert_row(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        columns: &[Identifier],
        values: Vec<SqlValue>,
    ) -> Result<i64, DatabaseError> {
        let next = Statement::builder()
            .sql("SELECT COALESCE(MAX(rowid), 0) + 1 AS next FROM ")
            .ident(table)
            .build()?;
        let rowid = match tx.query_optional(&next).await? {
            Some(row) => row.integer("next")?,
            None => 1,
        };

        let insert = Statement::builder()
            .sql("INSERT INTO ")
            .ident(table)
            .sql(" (rowid, ")
            .idents(columns)
            .sql(") VALUES (")
            .bind(rowid)
            .sql(", ")
            .bind_all(values)
            .sql(")")
            .build()?;
        let revert = Statement::builder()
            .sql("DELETE FROM ")
            .ident(table)
            .sql(" WHERE rowid = ")
            .bind(rowid)
            .build()?;
        tx.apply(insert, vec![revert]).await?;
        Ok(rowid)
    }

    /// Rows of a stored view query
    pub async fn select(exec: &dyn SqlExecutor, query: &str) -> Result<Vec<SqlRow>, DatabaseError> {
        exec.query(&Statement::from_engine(query.to_string())).await
    }

    fn drop_statement(table: &Identifier) -> Result<Statement, DatabaseError> {
        Ok(Statement::builder()
            .sql("DROP TABLE ")
            .ident(table)
            .build()?)
    }
}

/// Column affinity from a declared type, following SQLite's affinity rules
fn affinity(declared: &str) -> &'static str {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        "INTEGER"
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        "TEXT"
    } else if upper.contains("BLOB") || upper.is_empty() {
        "BLOB"
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        "REAL"
    } else {
        "NUMERIC"
    }
}
