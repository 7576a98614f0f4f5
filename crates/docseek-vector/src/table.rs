//! LanceDB connection and table helpers.
use anyhow::{Context, Result};
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection};
use std::sync::Arc;
use tracing::info;

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.with_context(|| format!("Failed to open LanceDB at {uri}"))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    info!(table = name, "created LanceDB table");
    Ok(())
}
