//! Store interfaces the migration engine talks to, plus their Supabase and
//! in-memory implementations.
//!
//! Rows travel as loosely-typed `serde_json::Value` objects; the engine only
//! needs column-name access and an ascending `id` to page over.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

pub mod extract;
pub mod memory;
pub mod reset;
pub mod supabase;

/// Column comparison used for filtered selects and deletes.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn neq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Neq(column.to_string(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Neq(c, _) => c,
        }
    }

    /// PostgREST operator form, e.g. `eq.42`.
    pub fn operator_value(&self) -> String {
        match self {
            Filter::Eq(_, v) => format!("eq.{}", value_as_text(v)),
            Filter::Neq(_, v) => format!("neq.{}", value_as_text(v)),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        let cell = row.get(self.column()).map(value_as_text);
        match self {
            Filter::Eq(_, v) => cell.as_deref() == Some(value_as_text(v).as_str()),
            Filter::Neq(_, v) => cell.as_deref() != Some(value_as_text(v).as_str()),
        }
    }
}

/// Render a scalar the way PostgREST expects it in a query string.
pub fn value_as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// The `id` column of a returned row as text (UUIDs and integers alike).
pub fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read side of the old project.
#[async_trait]
pub trait SourceTable: Send + Sync {
    /// One window of `table`, ordered by primary key ascending.
    async fn fetch_page(&self, table: &str, offset: usize, limit: usize) -> Result<Vec<Value>>;
}

/// Write side of the new project.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Insert one row and return it as stored (with its generated `id`).
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    async fn update_by_id(&self, table: &str, id: &str, patch: Value) -> Result<()>;

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<()>;

    /// All rows of `table` matching `filter`, restricted to `columns`
    /// (comma separated, PostgREST style).
    async fn select(&self, table: &str, columns: &str, filter: Option<&Filter>)
        -> Result<Vec<Value>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_type: String,
    /// Max-age in seconds.
    pub cache_control: String,
    pub upsert: bool,
}

/// One entry of a bucket listing. Folders carry no object id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub is_folder: bool,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Direct children of `prefix` ("" for the bucket root).
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageEntry>>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;
}
