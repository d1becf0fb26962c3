use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::debug;

use super::{build_http, truncate_for_log, with_auth};
use crate::config::BackendConfig;
use crate::database_ops::{DestinationStore, Filter, SourceTable};

/// PostgREST client for one Supabase project.
///
/// Endpoints used:
/// - GET    /rest/v1/{table}?select=..&order=..&offset=..&limit=..
/// - POST   /rest/v1/{table}            (Prefer: return=representation)
/// - PATCH  /rest/v1/{table}?id=eq.{id}
/// - DELETE /rest/v1/{table}?{col}={op}.{value}
#[derive(Debug, Clone)]
pub struct SupabaseRest {
    base_url: String,
    api_key: String,
    http: Client,
    select_page_size: usize,
}

impl SupabaseRest {
    pub fn new(backend: &BackendConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            api_key: backend.api_key.clone(),
            http: build_http(timeout)?,
            select_page_size: 1000,
        })
    }

    pub fn with_select_page_size(mut self, size: usize) -> Self {
        self.select_page_size = size.max(1);
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn send(
        &self,
        method: Method,
        table: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        prefer: Option<&str>,
    ) -> Result<Response> {
        let url = self.table_url(table);
        let mut req = with_auth(self.http.request(method.clone(), &url), &self.api_key)
            .header("Accept", "application/json")
            .query(query);
        if let Some(p) = prefer {
            req = req.header("Prefer", p);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("{method} {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
            return Err(anyhow!("{method} {table} failed: {status} body={body}"));
        }
        Ok(resp)
    }

    async fn get_rows(&self, table: &str, query: Vec<(String, String)>) -> Result<Vec<Value>> {
        let resp = self.send(Method::GET, table, &query, None, None).await?;
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("decoding {table} rows"))?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(anyhow!(
                "expected an array of {table} rows, got {}",
                truncate_for_log(other.to_string(), 200)
            )),
        }
    }
}

fn page_query(select: &str, order: &str, offset: usize, limit: usize) -> Vec<(String, String)> {
    vec![
        ("select".to_string(), select.to_string()),
        ("order".to_string(), order.to_string()),
        ("offset".to_string(), offset.to_string()),
        ("limit".to_string(), limit.to_string()),
    ]
}

/// Order by every selected column so offset paging is stable even on
/// junction tables without an `id`.
fn order_clause(columns: &str) -> String {
    let cols: Vec<&str> = columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != "*")
        .collect();
    if cols.is_empty() {
        "id.asc".to_string()
    } else {
        cols.iter()
            .map(|c| format!("{c}.asc"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl SourceTable for SupabaseRest {
    async fn fetch_page(&self, table: &str, offset: usize, limit: usize) -> Result<Vec<Value>> {
        self.get_rows(table, page_query("*", "id.asc", offset, limit))
            .await
    }
}

#[async_trait]
impl DestinationStore for SupabaseRest {
    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let resp = self
            .send(Method::POST, table, &[], Some(&row), Some("return=representation"))
            .await?;
        let body: Value = resp.json().await?;
        let row = match body {
            Value::Array(rows) => rows.into_iter().next(),
            obj @ Value::Object(_) => Some(obj),
            _ => None,
        };
        row.ok_or_else(|| anyhow!("insert into {table} returned no row"))
    }

    async fn update_by_id(&self, table: &str, id: &str, patch: Value) -> Result<()> {
        let query = vec![("id".to_string(), format!("eq.{id}"))];
        self.send(Method::PATCH, table, &query, Some(&patch), None)
            .await?;
        Ok(())
    }

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<()> {
        let query = vec![(filter.column().to_string(), filter.operator_value())];
        self.send(Method::DELETE, table, &query, None, None).await?;
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        columns: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Value>> {
        let order = order_clause(columns);
        let mut all_rows = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut query = page_query(columns, &order, offset, self.select_page_size);
            if let Some(f) = filter {
                query.push((f.column().to_string(), f.operator_value()));
            }
            let batch = self.get_rows(table, query).await?;
            let fetched = batch.len();
            all_rows.extend(batch);
            if fetched < self.select_page_size {
                break;
            }
            offset += self.select_page_size;
        }
        debug!(target = "supabase", table, rows = all_rows.len(), "select complete");
        Ok(all_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_clause_covers_selected_columns() {
        assert_eq!(order_clause("*"), "id.asc");
        assert_eq!(order_clause("id, name"), "id.asc,name.asc");
        assert_eq!(
            order_clause("category_id,specialty_id"),
            "category_id.asc,specialty_id.asc"
        );
    }

    #[test]
    fn client_strips_trailing_slash() {
        let rest = SupabaseRest::new(
            &BackendConfig {
                base_url: "https://abc.supabase.co/".into(),
                api_key: "k".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(rest.table_url("product"), "https://abc.supabase.co/rest/v1/product");
    }

    #[test]
    fn page_query_shape() {
        let q = page_query("*", "id.asc", 2000, 1000);
        assert_eq!(q[2], ("offset".to_string(), "2000".to_string()));
        assert_eq!(q[3], ("limit".to_string(), "1000".to_string()));
    }
}
