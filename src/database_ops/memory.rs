//! In-process stores. They back `--dry-run` (nothing leaves the machine
//! except image downloads) and every engine test.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use super::{
    row_id, value_as_text, DestinationStore, Filter, ObjectStorage, SourceTable, StorageEntry,
    UploadOptions,
};

#[derive(Debug, Clone)]
struct RejectRule {
    table: String,
    column: String,
    value: Value,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    page_requests: Mutex<HashMap<String, usize>>,
    reject_rules: Mutex<Vec<RejectRule>>,
    broken_tables: Mutex<BTreeSet<String>>,
}

fn guard<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("memory store lock poisoned"))
}

fn compare_ids(a: &Value, b: &Value) -> Ordering {
    match (a.get("id"), b.get("id")) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&y.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_as_text(x).cmp(&value_as_text(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a row in place as-is (no id generation, no rules).
    pub fn seed(&self, table: &str, row: Value) {
        if let Ok(mut tables) = guard(&self.tables) {
            tables.entry(table.to_string()).or_default().push(row);
        }
    }

    /// Snapshot of a table's rows in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        guard(&self.tables)
            .ok()
            .and_then(|t| t.get(table).cloned())
            .unwrap_or_default()
    }

    /// Number of `fetch_page` calls made against `table`.
    pub fn page_requests(&self, table: &str) -> usize {
        guard(&self.page_requests)
            .ok()
            .and_then(|p| p.get(table).copied())
            .unwrap_or(0)
    }

    /// Make inserts into `table` fail when `column` equals `value`, the way a
    /// constraint violation would.
    pub fn reject_inserts(&self, table: &str, column: &str, value: impl Into<Value>) {
        if let Ok(mut rules) = guard(&self.reject_rules) {
            rules.push(RejectRule {
                table: table.to_string(),
                column: column.to_string(),
                value: value.into(),
            });
        }
    }

    /// Make every operation on `table` fail.
    pub fn break_table(&self, table: &str) {
        if let Ok(mut broken) = guard(&self.broken_tables) {
            broken.insert(table.to_string());
        }
    }

    fn check_table(&self, table: &str) -> Result<()> {
        if guard(&self.broken_tables)?.contains(table) {
            bail!("relation \"{table}\" is unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl SourceTable for MemoryStore {
    async fn fetch_page(&self, table: &str, offset: usize, limit: usize) -> Result<Vec<Value>> {
        self.check_table(table)?;
        *guard(&self.page_requests)?
            .entry(table.to_string())
            .or_default() += 1;
        let mut rows = self.rows(table);
        rows.sort_by(compare_ids);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.check_table(table)?;
        let Value::Object(mut obj) = row else {
            bail!("insert into {table}: row must be a JSON object");
        };
        for rule in guard(&self.reject_rules)?.iter() {
            if rule.table == table
                && obj.get(&rule.column).map(value_as_text) == Some(value_as_text(&rule.value))
            {
                bail!(
                    "insert into {table} rejected: {} = {}",
                    rule.column,
                    value_as_text(&rule.value)
                );
            }
        }
        if !obj.contains_key("id") {
            obj.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        let stored = Value::Object(obj);
        guard(&self.tables)?
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_by_id(&self, table: &str, id: &str, patch: Value) -> Result<()> {
        self.check_table(table)?;
        let Value::Object(patch) = patch else {
            bail!("update {table}: patch must be a JSON object");
        };
        let mut tables = guard(&self.tables)?;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut() {
                if row_id(row).as_deref() == Some(id) {
                    if let Value::Object(obj) = row {
                        for (k, v) in &patch {
                            obj.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<()> {
        self.check_table(table)?;
        if let Some(rows) = guard(&self.tables)?.get_mut(table) {
            rows.retain(|r| !filter.matches(r));
        }
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        columns: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Value>> {
        self.check_table(table)?;
        let wanted: Vec<&str> = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        let all = wanted.is_empty() || wanted.contains(&"*");
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .map(|r| {
                if all {
                    return r;
                }
                let projected: Map<String, Value> = wanted
                    .iter()
                    .map(|c| (c.to_string(), r.get(*c).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(projected)
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
    pub cache_control: String,
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    reject_uploads: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        guard(&self.objects)
            .ok()?
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths stored in `bucket`, sorted.
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        guard(&self.objects)
            .map(|o| {
                o.keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_reject_uploads(&self, reject: bool) {
        if let Ok(mut flag) = guard(&self.reject_uploads) {
            *flag = reject;
        }
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<()> {
        if *guard(&self.reject_uploads)? {
            bail!("upload to {bucket}/{path} refused");
        }
        let mut objects = guard(&self.objects)?;
        let key = (bucket.to_string(), path.to_string());
        if objects.contains_key(&key) && !options.upsert {
            bail!("object {bucket}/{path} already exists");
        }
        objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: options.content_type.clone(),
                cache_control: options.cache_control.clone(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageEntry>> {
        let prefix = prefix.trim_matches('/');
        let objects = guard(&self.objects)?;
        let mut seen: BTreeMap<String, bool> = BTreeMap::new();
        for (b, path) in objects.keys() {
            if b != bucket {
                continue;
            }
            let rest = if prefix.is_empty() {
                path.as_str()
            } else {
                match path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(r) => r,
                    None => continue,
                }
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    seen.insert(folder.to_string(), true);
                }
                None => {
                    seen.entry(rest.to_string()).or_insert(false);
                }
            }
        }
        Ok(seen
            .into_iter()
            .map(|(name, is_folder)| StorageEntry { name, is_folder })
            .collect())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let mut objects = guard(&self.objects)?;
        for p in paths {
            objects.remove(&(bucket.to_string(), p.clone()));
        }
        Ok(())
    }
}
