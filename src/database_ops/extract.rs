//! Paginated extraction of whole source tables.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::SourceTable;

/// Read `table` in windows of `page_size` rows (ordered by id) until a short
/// or empty page, and return every row in order.
pub async fn fetch_all(source: &dyn SourceTable, table: &str, page_size: usize) -> Result<Vec<Value>> {
    let page_size = page_size.max(1);
    let mut all_rows = Vec::new();
    let mut offset = 0usize;
    loop {
        let batch = source
            .fetch_page(table, offset, page_size)
            .await
            .with_context(|| format!("fetching {table} rows {offset}..{}", offset + page_size))?;
        let fetched = batch.len();
        debug!(target = "extract", table, offset, fetched, "page fetched");
        if fetched == 0 {
            break;
        }
        all_rows.extend(batch);
        if fetched < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(all_rows)
}

/// Decode raw rows into `T`. Rows that do not fit are logged and dropped;
/// returns the decoded rows and how many were rejected.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> (Vec<T>, usize) {
    let mut out = Vec::with_capacity(rows.len());
    let mut rejected = 0usize;
    for row in rows {
        let id = row.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<T>(row) {
            Ok(v) => out.push(v),
            Err(e) => {
                rejected += 1;
                warn!(target = "extract", table, id = %id, error = %e, "source row rejected");
            }
        }
    }
    (out, rejected)
}
