//! View Manager
//!
//! Saved views live in `ds__views`. Sorting and filtering edits go through
//! [`SelectStatement`]: parse the stored text, change a clause, serialize,
//! persist. An edit that leaves the query unchanged writes nothing.

use crate::db::schema::VIEWS_TABLE;
use crate::db::{DatabaseError, Identifier, SqlExecutor, SqlRow, Statement, Transaction};
use crate::models::{
    new_node_id, physical_table_name, SelectStatement, SortDirection, ValidationError, View,
    ViewPatch, ViewType, DEFAULT_VIEW_NAME,
};
use crate::services::snapshot::{apply_restoring, RowKey};
use crate::services::DataSpaceError;

pub struct ViewManager;

impl ViewManager {
    fn key(id: &str) -> RowKey {
        RowKey::new(VIEWS_TABLE).eq("id", id)
    }

    fn view_from_row(row: &SqlRow) -> Result<View, DatabaseError> {
        let view_type = row
            .text("type")?
            .parse::<ViewType>()
            .map_err(|_| DatabaseError::row_decode("type", "view type"))?;
        Ok(View {
            id: row.text("id")?,
            table_id: row.text("table_id")?,
            name: row.text("name")?,
            view_type,
            query: row.text("query")?,
            order_map: serde_json::from_str(&row.text("order_map")?)?,
            hidden_fields: serde_json::from_str(&row.text("hidden_fields")?)?,
            position: row.real("position")?,
        })
    }

    pub async fn get(exec: &dyn SqlExecutor, id: &str) -> Result<Option<View>, DatabaseError> {
        let stmt = Statement::with_params("SELECT * FROM ds__views WHERE id = ?", vec![id.into()])?;
        exec.query_optional(&stmt)
            .await?
            .map(|row| Self::view_from_row(&row))
            .transpose()
    }

    pub async fn require(exec: &dyn SqlExecutor, id: &str) -> Result<View, DataSpaceError> {
        Self::get(exec, id)
            .await?
            .ok_or_else(|| DataSpaceError::view_not_found(id))
    }

    pub async fn list(exec: &dyn SqlExecutor, table_id: &str) -> Result<Vec<View>, DatabaseError> {
        let stmt = Statement::with_params(
            "SELECT * FROM ds__views WHERE table_id = ? ORDER BY position, id",
            vec![table_id.into()],
        )?;
        exec.query(&stmt).await?.iter().map(Self::view_from_row).collect()
    }

    /// Persist a new `SELECT * FROM tb_<id>` view after the table's last view
    pub async fn create_default(
        tx: &mut Transaction<'_>,
        table_id: &str,
        name: Option<&str>,
    ) -> Result<View, DataSpaceError> {
        let table = physical_table_name(table_id)?;
        let next = Statement::with_params(
            "SELECT COALESCE(MAX(position), 0) + 1 AS next FROM ds__views WHERE table_id = ?",
            vec![table_id.into()],
        )?;
        let position = match tx.query_optional(&next).await? {
            Some(row) => row.real("next")?,
            None => 1.0,
        };

        let view = View {
            id: new_node_id(),
            table_id: table_id.to_string(),
            name: name.unwrap_or(DEFAULT_VIEW_NAME).to_string(),
            view_type: ViewType::Grid,
            query: SelectStatement::select_all(&table)?.to_string(),
            order_map: Default::default(),
            hidden_fields: Vec::new(),
            position,
        };

        let insert = Statement::with_params(
            "INSERT INTO ds__views (id, table_id, name, type, query, order_map, hidden_fields, position) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                view.id.as_str().into(),
                view.table_id.as_str().into(),
                view.name.as_str().into(),
                view.view_type.as_str().into(),
                view.query.as_str().into(),
                serde_json::to_string(&view.order_map)?.into(),
                serde_json::to_string(&view.hidden_fields)?.into(),
                view.position.into(),
            ],
        )?;
        tx.apply(insert, vec![Self::key(&view.id).delete()?]).await?;
        Ok(view)
    }

    async fn write(tx: &mut Transaction<'_>, view: &View) -> Result<(), DataSpaceError> {
        let update = Statement::with_params(
            "UPDATE ds__views SET name = ?, type = ?, query = ?, order_map = ?, hidden_fields = ?, \
             position = ? WHERE id = ?",
            vec![
                view.name.as_str().into(),
                view.view_type.as_str().into(),
                view.query.as_str().into(),
                serde_json::to_string(&view.order_map)?.into(),
                serde_json::to_string(&view.hidden_fields)?.into(),
                view.position.into(),
                view.id.as_str().into(),
            ],
        )?;
        apply_restoring(tx, &Self::key(&view.id), update).await?;
        Ok(())
    }

    /// Parse `sql` as a query of `view`: it must read the view's own table
    pub fn checked_query(view: &View, sql: &str) -> Result<SelectStatement, DataSpaceError> {
        let query = SelectStatement::parse(sql)?;
        let table = physical_table_name(&view.table_id)?;
        if !query.source().eq_ignore_ascii_case(table.as_str()) {
            return Err(ValidationError::invalid_query(format!(
                "view query must read {table}, not {}",
                query.source()
            ))
            .into());
        }
        Ok(query)
    }

    /// Merge `patch` into the stored view. A new query must parse and read the
    /// view's table.
    pub async fn update(
        tx: &mut Transaction<'_>,
        id: &str,
        patch: &ViewPatch,
    ) -> Result<View, DataSpaceError> {
        let mut view = Self::require(&*tx, id).await?;
        if let Some(query) = &patch.query {
            Self::checked_query(&view, query)?;
        }
        let before = view.clone();
        patch.apply_to(&mut view);
        if view != before {
            Self::write(tx, &view).await?;
        }
        Ok(view)
    }

    /// Parse, edit and persist the view's query if the edit changed it
    async fn edit_query<F>(
        tx: &mut Transaction<'_>,
        id: &str,
        edit: F,
    ) -> Result<View, DataSpaceError>
    where
        F: FnOnce(&mut SelectStatement) -> Result<bool, DataSpaceError>,
    {
        let mut view = Self::require(&*tx, id).await?;
        let mut query = Self::checked_query(&view, &view.query)?;
        if edit(&mut query)? {
            view.query = query.to_string();
            Self::write(tx, &view).await?;
        }
        Ok(view)
    }

    pub async fn add_sort(
        tx: &mut Transaction<'_>,
        id: &str,
        column: &Identifier,
        direction: SortDirection,
    ) -> Result<View, DataSpaceError> {
        Self::edit_query(tx, id, |q| Ok(q.sort_by(column.as_str(), direction)?)).await
    }

    pub async fn remove_sort(
        tx: &mut Transaction<'_>,
        id: &str,
        column: &Identifier,
    ) -> Result<View, DataSpaceError> {
        Self::edit_query(tx, id, |q| Ok(q.remove_sort(column.as_str()))).await
    }

    pub async fn set_filter(
        tx: &mut Transaction<'_>,
        id: &str,
        filter: Option<&str>,
    ) -> Result<View, DataSpaceError> {
        Self::edit_query(tx, id, |q| {
            let before = q.filter();
            q.set_filter(filter)?;
            Ok(q.filter() != before)
        })
        .await
    }

    /// Delete a view; the last view of a table cannot be deleted
    pub async fn delete(tx: &mut Transaction<'_>, id: &str) -> Result<(), DataSpaceError> {
        let view = Self::require(&*tx, id).await?;
        let count = Statement::with_params(
            "SELECT COUNT(*) AS n FROM ds__views WHERE table_id = ?",
            vec![view.table_id.as_str().into()],
        )?;
        let remaining = match tx.query_optional(&count).await? {
            Some(row) => row.integer("n")?,
            None => 0,
        };
        if remaining <= 1 {
            return Err(DataSpaceError::conflict(format!(
                "view '{}' is the only view of table '{}'",
                id, view.table_id
            )));
        }
        let key = Self::key(id);
        apply_restoring(tx, &key, key.delete()?).await?;
        Ok(())
    }

    pub async fn delete_for_table(tx: &mut Transaction<'_>, table_id: &str) -> Result<(), DatabaseError> {
        let key = RowKey::new(VIEWS_TABLE).eq("table_id", table_id);
        apply_restoring(tx, &key, key.delete()?).await?;
        Ok(())
    }
}
