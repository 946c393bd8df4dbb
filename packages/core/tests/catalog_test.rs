//! Integration tests for catalog operations
//!
//! Tests cover:
//! - Node creation, ordering and renaming
//! - Soft delete, restore and purge per node type
//! - Atomicity of table creation on id collisions
//! - Tree integrity: no live child under a deleted parent, no cycles
//! - Table duplication and daily documents

use anyhow::Result;
use dataspace_core::{
    DataSpace, DataSpaceConfig, DataSpaceError, FieldType, FreeformSql, ImportColumn, NodeType,
    NodeUpdate, ScriptFilter, TableImport, UndoStack,
};
use serde_json::{json, Map, Value};
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

async fn physical_table_exists(space: &DataSpace, name: &str) -> Result<bool> {
    let rows = space
        .execute_sql(
            FreeformSql::new("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name),
        )
        .await?
        .rows;
    Ok(!rows.is_empty())
}

#[tokio::test]
async fn test_create_table_sets_up_storage() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let id = space.create_table("Tasks", None).await?;
    let table_name = format!("tb_{id}");
    assert!(physical_table_exists(&space, &table_name).await?);

    let node = space.get_node(&id).await?.expect("node exists");
    assert_eq!(node.node_type, NodeType::Table);
    assert_eq!(node.name, "Tasks");
    assert!(!node.is_deleted);

    let columns = space.list_ui_columns(&table_name).await?;
    let summary: Vec<_> = columns
        .iter()
        .map(|c| (c.table_column_name.as_str(), c.field_type))
        .collect();
    assert_eq!(summary, vec![("_id", FieldType::RowId), ("title", FieldType::Title)]);

    let views = space.list_views(&id).await?;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].query, format!("SELECT * FROM {table_name}"));
    Ok(())
}

#[tokio::test]
async fn test_nodes_are_ordered_by_parent_then_position() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let a = space.create_doc("A", None).await?;
    let b = space.create_table("B", None).await?;
    let child = space.create_doc("Child", Some(&a)).await?;

    let ids: Vec<_> = space
        .list_all_nodes()
        .await?
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec![a.clone(), b, child.clone()]);

    let child = space.get_node(&child).await?.expect("child exists");
    assert_eq!(child.parent_id.as_deref(), Some(a.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_create_under_missing_parent_fails() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let err = space.create_doc("Orphan", Some("nope")).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(space.list_all_nodes().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_soft_delete_and_restore() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let id = space.create_table("Tasks", None).await?;
    space.delete_node(&id).await?;

    assert!(space.list_all_nodes().await?.is_empty());
    let all = space.list_all_nodes_including_deleted().await?;
    assert_eq!(all.len(), 1);
    assert!(all[0].is_deleted);
    assert!(physical_table_exists(&space, &format!("tb_{id}")).await?);

    let restored = space.restore_node(&id).await?;
    assert!(!restored.is_deleted);
    assert_eq!(space.list_all_nodes().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unknown_node_is_not_found() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    assert!(space.delete_node("missing").await.unwrap_err().is_not_found());
    assert!(space.rename_node("missing", "x").await.unwrap_err().is_not_found());
    assert!(space.purge_node("missing").await.unwrap_err().is_not_found());
    assert_eq!(space.get_node("missing").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_rename_and_update_node() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let folder = space.create_doc("Folder", None).await?;
    let id = space.create_table("Tasks", None).await?;

    let renamed = space.rename_node(&id, "Chores").await?;
    assert_eq!(renamed.name, "Chores");

    let patch = NodeUpdate::new()
        .with_parent(Some(folder.clone()))
        .with_pinned(true)
        .with_icon(Some("check".to_string()));
    let updated = space.update_node(&id, &patch).await?;
    assert_eq!(updated.parent_id.as_deref(), Some(folder.as_str()));
    assert!(updated.is_pinned);
    assert_eq!(updated.icon.as_deref(), Some("check"));
    assert_eq!(space.get_node(&id).await?, Some(updated));
    Ok(())
}

#[tokio::test]
async fn test_rename_keeps_script_name_in_step() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let id = space.add_prompt("Summarize", "Summarize the table").await?;
    space.rename_node(&id, "Digest").await?;

    let script = space.script().get(&id).await?.expect("script exists");
    assert_eq!(script.name, "Digest");
    Ok(())
}

#[tokio::test]
async fn test_purge_table_removes_everything() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let id = space.create_table("Tasks", None).await?;
    let table_name = format!("tb_{id}");
    space.add_column(&id, "Priority", FieldType::Number).await?;
    space.add_row(&id, row(json!({"title": "a"}))).await?;

    space.purge_node(&id).await?;

    assert_eq!(space.get_node(&id).await?, None);
    assert!(!physical_table_exists(&space, &table_name).await?);
    assert!(space.list_views(&id).await?.is_empty());
    assert!(space
        .list_all_ui_columns()
        .await?
        .iter()
        .all(|c| c.table_name != table_name));
    Ok(())
}

#[tokio::test]
async fn test_purge_doc_and_script() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    space
        .create_or_update_doc_with_markdown("notes", "# Notes")
        .await?;
    let prompt = space.add_prompt("Summarize", "...").await?;

    space.purge_node("notes").await?;
    space.purge_node(&prompt).await?;

    assert_eq!(space.get_doc("notes").await?, None);
    assert_eq!(space.script().get(&prompt).await?, None);
    assert!(space.list_all_nodes_including_deleted().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_purge_with_children_conflicts() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let parent = space.create_doc("Parent", None).await?;
    space.create_doc("Child", Some(&parent)).await?;

    let err = space.purge_node(&parent).await.unwrap_err();
    assert!(matches!(err, DataSpaceError::Conflict(_)));
    assert_eq!(space.list_all_nodes().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_soft_delete_with_live_children_conflicts() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let parent = space.create_doc("Parent", None).await?;
    let child = space.create_doc("Child", Some(&parent)).await?;
    let recorded = space.history_len(UndoStack::Undo).await?;

    let err = space.delete_node(&parent).await.unwrap_err();
    assert!(matches!(err, DataSpaceError::Conflict(_)));
    assert_eq!(space.list_all_nodes().await?.len(), 2);
    assert_eq!(space.history_len(UndoStack::Undo).await?, recorded);

    // children first, then the parent
    space.delete_node(&child).await?;
    space.delete_node(&parent).await?;
    assert!(space.list_all_nodes().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_restore_under_deleted_parent_conflicts() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let parent = space.create_doc("Parent", None).await?;
    let child = space.create_doc("Child", Some(&parent)).await?;
    space.delete_node(&child).await?;
    space.delete_node(&parent).await?;

    let err = space.restore_node(&child).await.unwrap_err();
    assert!(matches!(err, DataSpaceError::Conflict(_)));
    assert!(space.list_all_nodes().await?.is_empty());

    space.restore_node(&parent).await?;
    space.restore_node(&child).await?;
    assert_eq!(space.list_all_nodes().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_move_under_own_descendant_conflicts() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let a = space.create_doc("A", None).await?;
    let b = space.create_doc("B", Some(&a)).await?;
    let c = space.create_doc("C", Some(&b)).await?;

    for target in [&b, &c] {
        let patch = NodeUpdate::new().with_parent(Some(target.clone()));
        let err = space.update_node(&a, &patch).await.unwrap_err();
        assert!(matches!(err, DataSpaceError::Conflict(_)), "{target}");
    }
    let node = space.get_node(&a).await?.unwrap();
    assert_eq!(node.parent_id, None);

    // moving a leaf elsewhere is fine
    let patch = NodeUpdate::new().with_parent(Some(a.clone()));
    let moved = space.update_node(&c, &patch).await?;
    assert_eq!(moved.parent_id.as_deref(), Some(a.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_delete_table_rejects_other_types() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let doc = space.create_doc("Doc", None).await?;
    assert!(space.delete_table(&doc).await.is_err());
    assert!(space.get_node(&doc).await?.is_some());

    let table = space.create_table("Tasks", None).await?;
    space.delete_table(&table).await?;
    assert_eq!(space.get_node(&table).await?, None);
    assert!(!physical_table_exists(&space, &format!("tb_{table}")).await?);
    Ok(())
}

#[tokio::test]
async fn test_table_creation_is_atomic_on_id_collision() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let doc = space.create_doc("Existing", None).await?;
    let nodes_before = space.list_all_nodes().await?;
    let undo_before = space.history_len(UndoStack::Undo).await?;

    let import = TableImport::new(
        "Clash",
        vec![ImportColumn::new("Name", FieldType::Title)],
    )
    .with_id(doc.clone())
    .with_rows(vec![vec![json!("row")]]);
    let err = space.import_table(import, |_| {}).await.unwrap_err();

    assert!(matches!(err, DataSpaceError::Conflict(_)));
    assert!(!physical_table_exists(&space, &format!("tb_{doc}")).await?);
    assert_eq!(space.list_all_nodes().await?, nodes_before);
    assert_eq!(space.history_len(UndoStack::Undo).await?, undo_before);
    Ok(())
}

#[tokio::test]
async fn test_import_table_with_rows() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let import = TableImport::new(
        "Contacts",
        vec![
            ImportColumn::new("Name", FieldType::Title),
            ImportColumn::new("Age", FieldType::Number),
        ],
    )
    .with_rows(vec![vec![json!("Ada"), json!(36)], vec![json!("Alan")]]);

    let mut seen = Vec::new();
    let id = space.import_table(import, |p| seen.push(p)).await?;
    assert_eq!(seen, vec![50, 100]);

    let table_name = format!("tb_{id}");
    let columns = space.list_ui_columns(&table_name).await?;
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["_id", "Name", "Age"]);

    let view = &space.list_views(&id).await?[0];
    let rows = space.view_rows(&view.id).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].text("title")?, "Ada");
    assert_eq!(rows[0].integer(&columns[2].table_column_name)?, 36);
    Ok(())
}

#[tokio::test]
async fn test_import_rejects_rows_wider_than_columns() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let import = TableImport::new("Narrow", vec![ImportColumn::new("Name", FieldType::Title)])
        .with_rows(vec![vec![json!("a"), json!("b")]]);
    let err = space.import_table(import, |_| {}).await.unwrap_err();

    assert!(matches!(err, DataSpaceError::Validation(_)));
    assert!(space.list_all_nodes().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_table_copies_rows_and_fields() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let id = space.create_table("Tasks", None).await?;
    space.add_column(&id, "Priority", FieldType::Number).await?;
    space.add_row(&id, row(json!({"title": "a"}))).await?;
    space.add_row(&id, row(json!({"title": "b"}))).await?;

    let copy = space.duplicate_table(&id, "Tasks copy").await?;
    assert_ne!(copy, id);

    let node = space.get_node(&copy).await?.expect("copy exists");
    assert_eq!(node.name, "Tasks copy");

    let original: Vec<_> = space
        .list_ui_columns(&format!("tb_{id}"))
        .await?
        .into_iter()
        .map(|c| (c.table_column_name, c.name, c.field_type))
        .collect();
    let copied: Vec<_> = space
        .list_ui_columns(&format!("tb_{copy}"))
        .await?
        .into_iter()
        .map(|c| (c.table_column_name, c.name, c.field_type))
        .collect();
    assert_eq!(original, copied);

    let views = space.list_views(&copy).await?;
    assert_eq!(views.len(), 1);
    assert_eq!(space.view_rows(&views[0].id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_list_day_docs_newest_first() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    space
        .create_or_update_doc_with_markdown("2024-01-02", "# Tuesday")
        .await?;
    space
        .create_or_update_doc_with_markdown("2024-01-03", "# Wednesday")
        .await?;
    space
        .create_or_update_doc_with_markdown("notes", "# Notes")
        .await?;

    let ids: Vec<_> = space
        .list_day_docs(10, 0)
        .await?
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec!["2024-01-03", "2024-01-02"]);

    let page: Vec<_> = space
        .list_day_docs(1, 1)
        .await?
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(page, vec!["2024-01-02"]);
    Ok(())
}

#[tokio::test]
async fn test_day_doc_pages_skip_invalid_dates() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    // sorts ahead of every real date but is not one
    space
        .create_or_update_doc_with_markdown("2024-13-45", "# Not a day")
        .await?;
    for id in ["2024-01-01", "2024-01-02", "2024-01-03"] {
        space
            .create_or_update_doc_with_markdown(id, "# Day")
            .await?;
    }

    let first: Vec<_> = space
        .list_day_docs(2, 0)
        .await?
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(first, vec!["2024-01-03", "2024-01-02"]);

    let second: Vec<_> = space
        .list_day_docs(2, 2)
        .await?
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(second, vec!["2024-01-01"]);
    Ok(())
}

#[tokio::test]
async fn test_generic_create_node_registers_scripts() -> Result<()> {
    let (space, _temp) = create_test_env().await?;

    let action = space.create_node(NodeType::Action, "Empty", None).await?;
    let prompt = space.create_node(NodeType::Script, "Blank", None).await?;

    let actions = space.script().list(&ScriptFilter::actions()).await?;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].id, action);
    assert!(actions[0].nodes.is_empty());

    let prompts = space.script().list(&ScriptFilter::prompts()).await?;
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].id, prompt);
    Ok(())
}
