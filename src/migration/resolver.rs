//! Case-insensitive name resolution against a destination snapshot.
//!
//! The snapshot is read once when a phase starts and only appended to
//! afterwards, so each distinct name costs at most one insert per run and
//! lookups never go back to the network.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::database_ops::{row_id, value_as_text, DestinationStore};

/// Comparison key for names: trimmed and lower-cased, on both the incoming
/// name and the destination snapshot.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Mapped(String),
    Created(String),
}

impl Resolution {
    pub fn id(&self) -> &str {
        match self {
            Resolution::Mapped(id) | Resolution::Created(id) => id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

#[derive(Debug, Clone)]
struct Known {
    key: String,
    id: String,
}

/// Snapshot-plus-append resolver for one named entity table.
#[derive(Debug, Clone)]
pub struct NameResolver {
    table: String,
    known: Vec<Known>,
    pub created: usize,
    pub mapped: usize,
}

impl NameResolver {
    /// Start from an explicit snapshot (no destination read).
    pub fn with_snapshot(table: &str, rows: &[Value]) -> Self {
        let known = rows
            .iter()
            .filter_map(|r| {
                let id = row_id(r)?;
                let name = r.get("name").filter(|v| !v.is_null()).map(value_as_text)?;
                Some(Known { key: name_key(&name), id })
            })
            .collect();
        Self {
            table: table.to_string(),
            known,
            created: 0,
            mapped: 0,
        }
    }

    /// Read the current `id, name` snapshot of `table`.
    pub async fn load(dest: &dyn DestinationStore, table: &str) -> Result<Self> {
        let rows = dest
            .select(table, "id,name", None)
            .await
            .with_context(|| format!("load {table} snapshot"))?;
        debug!(target = "migration", table, existing = rows.len(), "name snapshot loaded");
        Ok(Self::with_snapshot(table, &rows))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Existing id for `name`, if any. First match wins.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let key = name_key(name);
        self.known
            .iter()
            .find(|k| k.key == key)
            .map(|k| k.id.as_str())
    }

    /// Map `name` to a destination id, inserting `{name, ..defaults}` on a
    /// miss. Blank names resolve to `None` without touching anything.
    pub async fn resolve(
        &mut self,
        dest: &dyn DestinationStore,
        name: &str,
        defaults: Map<String, Value>,
    ) -> Result<Option<Resolution>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(id) = self.lookup(name) {
            let id = id.to_string();
            self.mapped += 1;
            return Ok(Some(Resolution::Mapped(id)));
        }
        let mut row = defaults;
        row.insert("name".into(), Value::String(name.to_string()));
        let stored = dest
            .insert(&self.table, Value::Object(row))
            .await
            .with_context(|| format!("insert {} \"{name}\"", self.table))?;
        let id = row_id(&stored)
            .ok_or_else(|| anyhow!("insert {} \"{name}\": no id returned", self.table))?;
        self.known.push(Known {
            key: name_key(name),
            id: id.clone(),
        });
        self.created += 1;
        Ok(Some(Resolution::Created(id)))
    }
}

/// Existing `(parent, child)` pairs of an association table; new links are
/// written once and remembered.
#[derive(Debug, Clone)]
pub struct LinkSet {
    table: String,
    parent_column: String,
    child_column: String,
    pairs: HashSet<(String, String)>,
}

impl LinkSet {
    pub fn empty(table: &str, parent_column: &str, child_column: &str) -> Self {
        Self {
            table: table.to_string(),
            parent_column: parent_column.to_string(),
            child_column: child_column.to_string(),
            pairs: HashSet::new(),
        }
    }

    pub async fn load(
        dest: &dyn DestinationStore,
        table: &str,
        parent_column: &str,
        child_column: &str,
    ) -> Result<Self> {
        let mut set = Self::empty(table, parent_column, child_column);
        let columns = format!("{parent_column},{child_column}");
        let rows = dest
            .select(table, &columns, None)
            .await
            .with_context(|| format!("load {table} links"))?;
        for r in &rows {
            let (Some(p), Some(c)) = (r.get(parent_column), r.get(child_column)) else {
                continue;
            };
            if p.is_null() || c.is_null() {
                continue;
            }
            set.pairs.insert((value_as_text(p), value_as_text(c)));
        }
        Ok(set)
    }

    pub fn contains(&self, parent: &str, child: &str) -> bool {
        self.pairs.contains(&(parent.to_string(), child.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Insert the link unless already present. `Ok(true)` when written.
    pub async fn link(
        &mut self,
        dest: &dyn DestinationStore,
        parent: &str,
        child: &str,
    ) -> Result<bool> {
        if self.contains(parent, child) {
            return Ok(false);
        }
        let mut row = Map::new();
        row.insert(self.parent_column.clone(), Value::String(parent.to_string()));
        row.insert(self.child_column.clone(), Value::String(child.to_string()));
        dest.insert(&self.table, Value::Object(row))
            .await
            .with_context(|| format!("link {} {parent} -> {child}", self.table))?;
        self.pairs.insert((parent.to_string(), child.to_string()));
        Ok(true)
    }
}
