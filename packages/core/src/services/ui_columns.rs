//! Schema Introspector (UI Columns)
//!
//! Joins engine-reported columns of every `tb_*` table with `ds__columns`.
//! Drift is tolerated in both directions: a physical column without metadata
//! gets a synthesized `text` field, metadata without a physical column is
//! skipped. Writes here only ever touch `ds__columns`; DDL belongs to
//! [`PhysicalTables`](crate::services::PhysicalTables).

use crate::db::schema::COLUMNS_TABLE;
use crate::db::{DatabaseError, Identifier, SqlExecutor, SqlRow, Statement, Transaction};
use crate::models::{FieldType, SelectOption, UiColumn};
use crate::services::snapshot::{apply_restoring, RowKey};
use crate::services::{DataSpaceError, PhysicalTables};

pub struct SchemaIntrospector;

impl SchemaIntrospector {
    fn key(table: &Identifier, column: &str) -> RowKey {
        RowKey::new(COLUMNS_TABLE)
            .eq("table_name", table.as_str())
            .eq("table_column_name", column)
    }

    fn column_from_row(table: &Identifier, row: &SqlRow) -> Result<UiColumn, DatabaseError> {
        let raw = row.text("column_name")?;
        let Some(name) = row.opt_text("display_name")? else {
            return Ok(UiColumn::synthesized(table.as_str(), raw));
        };

        let type_text = row.opt_text("field_type")?.unwrap_or_default();
        let field_type = type_text.parse::<FieldType>().unwrap_or_else(|_| {
            tracing::warn!(
                "Unknown field type '{}' for {}.{}, treating as text",
                type_text,
                table,
                raw
            );
            FieldType::Text
        });
        let property = row
            .opt_text("property")?
            .and_then(|p| serde_json::from_str(&p).ok())
            .unwrap_or_else(|| serde_json::json!({}));

        Ok(UiColumn {
            table_name: table.as_str().to_string(),
            table_column_name: raw,
            name,
            field_type,
            property,
        })
    }

    /// Fields of one physical table in column order; empty if the table is missing
    pub async fn list_for_table(
        exec: &dyn SqlExecutor,
        table: &Identifier,
    ) -> Result<Vec<UiColumn>, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT p.name AS column_name, c.name AS display_name, c.type AS field_type, \
             c.property AS property \
             FROM pragma_table_info(?) AS p \
             LEFT JOIN ds__columns AS c ON c.table_name = ? AND c.table_column_name = p.name \
             ORDER BY p.cid",
            vec![table.as_str().into(), table.as_str().into()],
        )?;
        exec.query(&stmt)
            .await?
            .iter()
            .map(|row| Self::column_from_row(table, row))
            .collect()
    }

    pub async fn list_all(exec: &dyn SqlExecutor) -> Result<Vec<UiColumn>, DatabaseError> {
        let mut all = Vec::new();
        for table in PhysicalTables::list(exec).await? {
            all.extend(Self::list_for_table(exec, &table).await?);
        }
        Ok(all)
    }

    /// Field for a physical column, synthesized if it has no metadata
    pub async fn get(
        exec: &dyn SqlExecutor,
        table: &Identifier,
        column: &str,
    ) -> Result<Option<UiColumn>, DatabaseError> {
        Ok(Self::list_for_table(exec, table)
            .await?
            .into_iter()
            .find(|c| c.table_column_name == column))
    }

    async fn require(
        exec: &dyn SqlExecutor,
        table: &Identifier,
        column: &str,
    ) -> Result<UiColumn, DataSpaceError> {
        Self::get(exec, table, column)
            .await?
            .ok_or_else(|| DataSpaceError::not_found("Column", format!("{table}.{column}")))
    }

    /// Insert or replace the metadata row of `column`
    pub async fn upsert(tx: &mut Transaction<'_>, column: &UiColumn) -> Result<(), DatabaseError> {
        let table = Identifier::from_engine(column.table_name.as_str());
        let upsert = Statement::with_params(
            "INSERT INTO ds__columns (table_name, table_column_name, name, type, property) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(table_name, table_column_name) DO UPDATE SET \
             name = excluded.name, type = excluded.type, property = excluded.property",
            vec![
                column.table_name.as_str().into(),
                column.table_column_name.as_str().into(),
                column.name.as_str().into(),
                column.field_type.as_str().into(),
                serde_json::to_string(&column.property)?.into(),
            ],
        )?;
        apply_restoring(tx, &Self::key(&table, &column.table_column_name), upsert).await?;
        Ok(())
    }

    pub async fn update_name(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &str,
        name: &str,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut field = Self::require(&*tx, table, column).await?;
        field.name = name.to_string();
        Self::upsert(tx, &field).await?;
        Ok(field)
    }

    pub async fn update_property(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &str,
        property: serde_json::Value,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut field = Self::require(&*tx, table, column).await?;
        field.property = property;
        Self::upsert(tx, &field).await?;
        Ok(field)
    }

    pub async fn add_select_option(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &str,
        option: SelectOption,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut field = Self::require(&*tx, table, column).await?;
        if !field.field_type.has_options() {
            return Err(DataSpaceError::conflict(format!(
                "{} field '{}' has no options",
                field.field_type, column
            )));
        }
        let mut options = field.select_options();
        if options.iter().any(|o| o.id == option.id || o.name == option.name) {
            return Ok(field);
        }
        options.push(option);
        set_options(&mut field, options)?;
        Self::upsert(tx, &field).await?;
        Ok(field)
    }

    pub async fn remove_select_option(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &str,
        option_id: &str,
    ) -> Result<UiColumn, DataSpaceError> {
        let mut field = Self::require(&*tx, table, column).await?;
        let mut options = field.select_options();
        let before = options.len();
        options.retain(|o| o.id != option_id);
        if options.len() == before {
            return Ok(field);
        }
        set_options(&mut field, options)?;
        Self::upsert(tx, &field).await?;
        Ok(field)
    }

    pub async fn delete_column(
        tx: &mut Transaction<'_>,
        table: &Identifier,
        column: &str,
    ) -> Result<(), DatabaseError> {
        let key = Self::key(table, column);
        apply_restoring(tx, &key, key.delete()?).await?;
        Ok(())
    }

    pub async fn delete_for_table(
        tx: &mut Transaction<'_>,
        table: &Identifier,
    ) -> Result<(), DatabaseError> {
        let key = RowKey::new(COLUMNS_TABLE).eq("table_name", table.as_str());
        apply_restoring(tx, &key, key.delete()?).await?;
        Ok(())
    }

    /// Copy the metadata rows of `source` onto `target`
    pub async fn copy_for_table(
        tx: &mut Transaction<'_>,
        source: &Identifier,
        target: &Identifier,
    ) -> Result<(), DatabaseError> {
        for mut field in Self::list_for_table(&*tx, source).await? {
            field.table_name = target.as_str().to_string();
            Self::upsert(tx, &field).await?;
        }
        Ok(())
    }
}

fn set_options(field: &mut UiColumn, options: Vec<SelectOption>) -> Result<(), DataSpaceError> {
    let options = serde_json::to_value(options)?;
    match field.property.as_object_mut() {
        Some(map) => {
            map.insert("options".to_string(), options);
        }
        None => field.property = serde_json::json!({ "options": options }),
    }
    Ok(())
}
