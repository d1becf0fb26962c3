//! Destructive reset of the new project before a run.
//!
//! Steps run in foreign-key order and each one is independently fallible:
//! a failed step is logged and recorded, and the remaining steps still run.

use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use super::{row_id, value_as_text, DestinationStore, Filter, ObjectStorage};

/// Matches no real row; `neq` against it selects the whole table.
pub const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Rows hanging off products, emptied first.
pub const DEPENDENT_TABLES: [&str; 7] = [
    "product_variant_filters_junction",
    "product_variants",
    "product_documents",
    "cart_items",
    "product_images",
    "product_specialties",
    "product_categories",
];

/// Category association tables, keyed by `category_id` rather than `id`.
pub const CATEGORY_LINK_TABLES: [&str; 2] = ["category_specialties", "category_it_types"];

const REMOVE_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    /// Delete every row of `table` (`key <> nil`).
    EmptyTable { table: &'static str, key: &'static str },
    /// Delete products one by one, keeping those referenced by orders.
    Products,
    /// Remove every object of a storage bucket, folders included.
    EmptyBucket(String),
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupStep::EmptyTable { table, .. } => write!(f, "table:{table}"),
            CleanupStep::Products => f.write_str("table:products"),
            CleanupStep::EmptyBucket(bucket) => write!(f, "bucket:{bucket}"),
        }
    }
}

/// Junctions, products, category links, categories, brands, then storage.
pub fn reset_plan(buckets: &[&str]) -> Vec<CleanupStep> {
    let mut plan: Vec<CleanupStep> = DEPENDENT_TABLES
        .iter()
        .map(|&table| CleanupStep::EmptyTable { table, key: "id" })
        .collect();
    plan.push(CleanupStep::Products);
    plan.extend(
        CATEGORY_LINK_TABLES
            .iter()
            .map(|&table| CleanupStep::EmptyTable { table, key: "category_id" }),
    );
    plan.push(CleanupStep::EmptyTable { table: "categories", key: "id" });
    plan.push(CleanupStep::EmptyTable { table: "brands", key: "id" });
    plan.extend(buckets.iter().map(|b| CleanupStep::EmptyBucket(b.to_string())));
    plan
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedStep {
    pub step: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub completed: Vec<String>,
    pub failed: Vec<FailedStep>,
    pub products_deleted: usize,
    pub products_kept: usize,
    pub objects_removed: usize,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Execute `plan` in order. Never fails as a whole.
pub async fn run_reset(
    dest: &dyn DestinationStore,
    storage: &dyn ObjectStorage,
    plan: &[CleanupStep],
) -> ResetReport {
    let mut report = ResetReport::default();
    for step in plan {
        let outcome = match step {
            CleanupStep::EmptyTable { table, key } => dest
                .delete_where(table, &Filter::neq(key, NIL_UUID))
                .await
                .with_context(|| format!("empty {table}")),
            CleanupStep::Products => delete_products(dest, &mut report).await,
            CleanupStep::EmptyBucket(bucket) => match empty_bucket(storage, bucket).await {
                Ok(n) => {
                    report.objects_removed += n;
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        match outcome {
            Ok(()) => {
                info!(target = "reset", step = %step, "cleanup step done");
                report.completed.push(step.to_string());
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target = "reset", step = %step, error = %error, "cleanup step failed");
                report.failed.push(FailedStep {
                    step: step.to_string(),
                    error,
                });
            }
        }
    }
    report
}

/// Product ids still referenced by orders. An unreadable table counts as
/// "no references".
async fn ordered_product_ids(dest: &dyn DestinationStore) -> HashSet<String> {
    match dest.select("order_items", "product_id", None).await {
        Ok(rows) => rows
            .iter()
            .filter_map(|r| r.get("product_id"))
            .filter(|v| !v.is_null())
            .map(value_as_text)
            .collect(),
        Err(e) => {
            warn!(target = "reset", error = %e, "order_items unreadable; no products protected");
            HashSet::new()
        }
    }
}

async fn delete_products(dest: &dyn DestinationStore, report: &mut ResetReport) -> Result<()> {
    let protected = ordered_product_ids(dest).await;
    let rows = dest
        .select("products", "id", None)
        .await
        .context("list products")?;
    let mut failures = 0usize;
    for id in rows.iter().filter_map(row_id) {
        if protected.contains(&id) {
            report.products_kept += 1;
            continue;
        }
        match dest.delete_where("products", &Filter::eq("id", id.as_str())).await {
            Ok(()) => report.products_deleted += 1,
            Err(e) => {
                failures += 1;
                warn!(target = "reset", product_id = %id, error = %e, "product delete failed");
            }
        }
    }
    if report.products_kept > 0 {
        info!(target = "reset", kept = report.products_kept, "products referenced by orders kept");
    }
    if failures > 0 {
        bail!("{failures} product(s) could not be deleted");
    }
    Ok(())
}

/// Every file path below `prefix`, depth first.
async fn collect_files(
    storage: &dyn ObjectStorage,
    bucket: &str,
    prefix: String,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![prefix];
    while let Some(dir) = pending.pop() {
        let entries = storage
            .list(bucket, &dir)
            .await
            .with_context(|| format!("list {bucket}/{dir}"))?;
        for entry in entries {
            let path = if dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{dir}/{}", entry.name)
            };
            if entry.is_folder {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    Ok(files)
}

async fn empty_bucket(storage: &dyn ObjectStorage, bucket: &str) -> Result<usize> {
    let files = collect_files(storage, bucket, String::new()).await?;
    for batch in files.chunks(REMOVE_BATCH) {
        storage
            .remove(bucket, batch)
            .await
            .with_context(|| format!("remove {} objects from {bucket}", batch.len()))?;
    }
    Ok(files.len())
}
