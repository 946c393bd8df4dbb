//! Integration tests for saved views
//!
//! Tests cover:
//! - Sorting through structured query edits
//! - Filters and the rows a view produces
//! - View updates and deletion rules
//! - A view only ever reads its own table

use anyhow::Result;
use dataspace_core::{
    DataSpace, DataSpaceConfig, DataSpaceError, FieldType, SortDirection, UndoStack,
    ValidationError, ViewPatch,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tempfile::TempDir;

/// Test helper: Create a test environment
async fn create_test_env() -> Result<(DataSpace, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = DataSpaceConfig::new(temp_dir.path().join("test.db"));
    let space = DataSpace::open(config).await?;
    Ok((space, temp_dir))
}

fn row(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_add_sort_appends_then_flips() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let view = space.create_default_view(&table_id).await?;
    assert_eq!(view.query, format!("SELECT * FROM tb_{table_id}"));
    assert_eq!(space.list_views(&table_id).await?.len(), 2);

    let sorted = space.add_sort(&view.id, "title", SortDirection::Asc).await?;
    assert!(sorted.query.ends_with("ORDER BY title ASC"));

    let history = space.history_len(UndoStack::Undo).await?;
    let again = space.add_sort(&view.id, "title", SortDirection::Asc).await?;
    assert_eq!(again.query, sorted.query);
    assert_eq!(space.history_len(UndoStack::Undo).await?, history);

    let flipped = space.add_sort(&view.id, "title", SortDirection::Desc).await?;
    assert!(flipped.query.ends_with("ORDER BY title DESC"));
    assert!(!flipped.query.contains("ASC"));
    assert_eq!(space.get_view(&view.id).await?, flipped);
    Ok(())
}

#[tokio::test]
async fn test_sorts_accumulate_and_remove() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let priority = space
        .add_column(&table_id, "Priority", FieldType::Number)
        .await?;
    let view = space.list_views(&table_id).await?.remove(0);

    space
        .add_sort(&view.id, &priority.table_column_name, SortDirection::Desc)
        .await?;
    let both = space.add_sort(&view.id, "title", SortDirection::Asc).await?;
    assert!(both.query.ends_with(&format!(
        "ORDER BY {} DESC, title ASC",
        priority.table_column_name
    )));

    let removed = space
        .remove_sort(&view.id, &priority.table_column_name)
        .await?;
    assert!(removed.query.ends_with("ORDER BY title ASC"));
    Ok(())
}

#[tokio::test]
async fn test_sort_rejects_bad_column_names() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let view = space.list_views(&table_id).await?.remove(0);

    let err = space
        .add_sort(&view.id, "title; DROP TABLE ds__tree", SortDirection::Asc)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DataSpaceError::Validation(ValidationError::InvalidIdentifier(_))
    ));
    assert_eq!(space.get_view(&view.id).await?, view);
    Ok(())
}

#[tokio::test]
async fn test_view_rows_follow_filter_and_sort() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    for title in ["pay rent", "buy milk", "call mom", "buy bread"] {
        space.add_row(&table_id, row(json!({ "title": title }))).await?;
    }
    let view = space.list_views(&table_id).await?.remove(0);
    assert_eq!(space.view_rows(&view.id).await?.len(), 4);

    space
        .set_filter(&view.id, Some("title LIKE 'buy%'"))
        .await?;
    let filtered = space.add_sort(&view.id, "title", SortDirection::Asc).await?;
    assert_eq!(
        filtered.query,
        format!("SELECT * FROM tb_{table_id} WHERE title LIKE 'buy%' ORDER BY title ASC")
    );

    let titles: Vec<String> = space
        .view_rows(&view.id)
        .await?
        .iter()
        .map(|r| r.text("title"))
        .collect::<Result<_, _>>()?;
    assert_eq!(titles, vec!["buy bread", "buy milk"]);

    let cleared = space.set_filter(&view.id, None).await?;
    assert_eq!(
        cleared.query,
        format!("SELECT * FROM tb_{table_id} ORDER BY title ASC")
    );
    assert_eq!(space.view_rows(&view.id).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_update_view_round_trip() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let view = space.list_views(&table_id).await?.remove(0);

    let mut order = BTreeMap::new();
    order.insert("title".to_string(), 0);
    order.insert("_id".to_string(), 1);
    let patch = ViewPatch::new()
        .with_name("Board")
        .with_order_map(order.clone())
        .with_hidden_fields(vec!["_id".to_string()]);
    let updated = space.update_view(&view.id, &patch).await?;

    assert_eq!(updated.name, "Board");
    assert_eq!(updated.order_map, order);
    assert_eq!(updated.hidden_fields, vec!["_id".to_string()]);
    assert_eq!(updated.query, view.query);
    assert_eq!(space.get_view(&view.id).await?, updated);
    Ok(())
}

#[tokio::test]
async fn test_update_view_rejects_invalid_query() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let view = space.list_views(&table_id).await?.remove(0);

    let patch = ViewPatch::new().with_query(format!("DELETE FROM tb_{table_id}"));
    let err = space.update_view(&view.id, &patch).await.unwrap_err();
    assert!(matches!(err, DataSpaceError::Validation(_)));
    assert_eq!(space.get_view(&view.id).await?, view);
    Ok(())
}

#[tokio::test]
async fn test_update_view_rejects_foreign_source() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let other_id = space.create_table("Secrets", None).await?;
    let view = space.list_views(&table_id).await?.remove(0);

    for query in [
        "SELECT * FROM ds__undo_log".to_string(),
        "SELECT * FROM sqlite_master".to_string(),
        format!("SELECT * FROM tb_{other_id}"),
    ] {
        let patch = ViewPatch::new().with_query(query.clone());
        let err = space.update_view(&view.id, &patch).await.unwrap_err();
        assert!(
            matches!(
                err,
                DataSpaceError::Validation(ValidationError::InvalidQuery(_))
            ),
            "{query}: {err}"
        );
    }
    assert_eq!(space.get_view(&view.id).await?, view);

    let own = ViewPatch::new().with_query(format!("SELECT title FROM tb_{table_id} LIMIT 5"));
    let updated = space.update_view(&view.id, &own).await?;
    assert_eq!(updated.query, format!("SELECT title FROM tb_{table_id} LIMIT 5"));
    Ok(())
}

#[tokio::test]
async fn test_last_view_cannot_be_deleted() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let first = space.list_views(&table_id).await?.remove(0);
    let second = space.create_default_view(&table_id).await?;

    space.del_view(&first.id).await?;
    let err = space.del_view(&second.id).await.unwrap_err();
    assert!(matches!(err, DataSpaceError::Conflict(_)));

    let views = space.list_views(&table_id).await?;
    assert_eq!(views, vec![second]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_view_is_not_found() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    assert!(space.get_view("missing").await.unwrap_err().is_not_found());
    assert!(space
        .add_sort("missing", "title", SortDirection::Asc)
        .await
        .unwrap_err()
        .is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_drop_column_removes_its_sort() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let table_id = space.create_table("Tasks", None).await?;
    let due = space.add_column(&table_id, "Due", FieldType::Date).await?;
    let view = space.list_views(&table_id).await?.remove(0);
    space
        .add_sort(&view.id, &due.table_column_name, SortDirection::Asc)
        .await?;

    space
        .drop_column(&table_id, &due.table_column_name)
        .await?;

    let view = space.get_view(&view.id).await?;
    assert_eq!(view.query, format!("SELECT * FROM tb_{table_id}"));
    assert!(space.view_rows(&view.id).await?.is_empty());
    Ok(())
}
