//! Development CLI for a local data space
//!
//! # Usage
//!
//! ```bash
//! # Print the node tree and fields
//! cargo run --bin dataspace-dev -- tree
//!
//! # Run one statement
//! cargo run --bin dataspace-dev -- sql "SELECT * FROM ds__tree"
//!
//! # Run every ```sql block of a markdown file
//! cargo run --bin dataspace-dev -- run-md answer.md
//!
//! # Undo / redo the newest change
//! cargo run --bin dataspace-dev -- undo
//! ```
//!
//! # Environment Variables
//!
//! - `DATASPACE_CONFIG`: JSON config file (defaults apply otherwise)
//! - `DATASPACE_DB_PATH`, `DATASPACE_UNDO`, `DATASPACE_UNDO_LIMIT`: overrides
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;

use anyhow::{anyhow, bail, Context};
use dataspace_core::{extract_code_blocks, DataSpace, DataSpaceConfig, FreeformSql, SqlOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match env::var("DATASPACE_CONFIG") {
        Ok(path) => DataSpaceConfig::from_json_file(&path).map_err(|e| anyhow!(e))?,
        Err(_) => DataSpaceConfig::default(),
    }
    .with_env_overrides()
    .map_err(|e| anyhow!(e))?;

    tracing::info!("Database: {}", config.db_path.display());
    let space = DataSpace::open(config).await?;

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("tree") | None => print_tree(&space).await?,
        Some("sql") => {
            let sql = args.get(1).context("usage: sql <statement>")?;
            print_outcome(&space.execute_sql(FreeformSql::new(sql.as_str())).await?);
        }
        Some("run-md") => {
            let path = args.get(1).context("usage: run-md <file.md>")?;
            let markdown = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {path}"))?;
            for block in extract_code_blocks(&markdown) {
                match space.run_code_block(&block).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => tracing::warn!("Skipped {} block: {}", block.lang, e),
                }
            }
        }
        Some("undo") => println!("undone: {}", space.undo().await?),
        Some("redo") => println!("redone: {}", space.redo().await?),
        Some(other) => bail!("unknown command '{other}' (expected tree, sql, run-md, undo, redo)"),
    }

    Ok(())
}

async fn print_tree(space: &DataSpace) -> anyhow::Result<()> {
    let nodes = space.list_all_nodes().await?;
    let columns = space.list_all_ui_columns().await?;
    for node in &nodes {
        let depth = if node.parent_id.is_some() { "  " } else { "" };
        println!("{depth}{} [{}] {}", node.name, node.node_type, node.id);
        if let Ok(table) = node.table_name() {
            for column in columns.iter().filter(|c| c.table_name == table.as_str()) {
                println!(
                    "{depth}    {} ({}, {})",
                    column.name, column.table_column_name, column.field_type
                );
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &SqlOutcome) {
    if outcome.rows.is_empty() {
        println!("{:?}: {} row(s) affected", outcome.kind, outcome.rows_affected);
        return;
    }
    for row in &outcome.rows {
        println!("{}", row.to_json());
    }
}
