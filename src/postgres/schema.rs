// ABOUTME: Catalog lookups used by preflight validation
// ABOUTME: Finds tables and schemas and estimates table size

use anyhow::{Context, Result};
use tokio_postgres::Client;

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub row_count_estimate: i64,
    pub total_bytes: i64,
}

/// Look up one ordinary or partitioned table
pub async fn find_table(client: &Client, schema: &str, table: &str) -> Result<Option<TableInfo>> {
    let row = client
        .query_opt(
            "SELECT
                n.nspname,
                c.relname,
                GREATEST(c.reltuples, 0)::bigint AS row_count,
                pg_catalog.pg_total_relation_size(c.oid) AS total_bytes
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname = $1
               AND c.relname = $2
               AND c.relkind IN ('r', 'p')",
            &[&schema, &table],
        )
        .await
        .with_context(|| format!("Failed to look up table {}.{}", schema, table))?;

    Ok(row.map(|row| TableInfo {
        schema: row.get(0),
        name: row.get(1),
        row_count_estimate: row.get(2),
        total_bytes: row.get(3),
    }))
}

pub async fn schema_exists(client: &Client, schema: &str) -> Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
            &[&schema],
        )
        .await
        .with_context(|| format!("Failed to look up schema {}", schema))?;
    Ok(row.get(0))
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
