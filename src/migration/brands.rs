use anyhow::Result;
use itertools::Itertools;
use serde_json::Map;
use tracing::{info, warn};

use super::context::MigrationContext;
use super::model::SourceProduct;
use super::resolver::{name_key, NameResolver};
use crate::database_ops::DestinationStore;

pub const BRANDS_TABLE: &str = "brands";

/// Distinct trimmed brand names, sorted.
pub fn distinct_brands(products: &[SourceProduct]) -> Vec<String> {
    products
        .iter()
        .filter_map(|p| p.brand.as_deref())
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .sorted()
        .dedup()
        .collect()
}

/// Resolve every brand mentioned by a product and fill `brand_map`.
pub async fn migrate_brands(
    ctx: &mut MigrationContext,
    dest: &dyn DestinationStore,
    products: &[SourceProduct],
) -> Result<()> {
    let mut brands = NameResolver::load(dest, BRANDS_TABLE).await?;
    for name in distinct_brands(products) {
        match brands.resolve(dest, &name, Map::new()).await {
            Ok(Some(resolution)) => {
                if resolution.was_created() {
                    ctx.stats.brands_created += 1;
                } else {
                    ctx.stats.brands_mapped += 1;
                }
                ctx.map_brand(name_key(&name), resolution.id().to_string());
            }
            Ok(None) => {}
            Err(e) => {
                ctx.stats.brands_failed += 1;
                warn!(target = "migration", brand = %name, error = %e, "brand not migrated");
            }
        }
    }
    info!(
        target = "migration",
        created = ctx.stats.brands_created,
        mapped = ctx.stats.brands_mapped,
        "brands done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use serde_json::json;

    fn products(brands: &[Option<&str>]) -> Vec<SourceProduct> {
        brands
            .iter()
            .enumerate()
            .map(|(i, b)| serde_json::from_value(json!({"id": i, "brand": b})).unwrap())
            .collect()
    }

    #[test]
    fn distinct_names_are_trimmed_and_sorted() {
        let ps = products(&[Some(" Philips"), Some("Dell"), None, Some("  "), Some("Dell ")]);
        assert_eq!(distinct_brands(&ps), vec!["Dell", "Philips"]);
    }

    #[tokio::test]
    async fn brand_map_is_keyed_by_lowercase_name() {
        let dest = MemoryStore::new();
        dest.seed("brands", json!({"id": "b-hp", "name": "HP"}));
        let ps = products(&[Some("hp"), Some("Dell"), Some("DELL")]);
        let mut ctx = MigrationContext::new();
        migrate_brands(&mut ctx, &dest, &ps).await.unwrap();

        assert_eq!(ctx.brand_map.get("hp").map(String::as_str), Some("b-hp"));
        assert!(ctx.brand_map.contains_key("dell"));
        assert_eq!(ctx.stats.brands_created, 1);
        assert_eq!(ctx.stats.brands_mapped, 2);
        assert_eq!(dest.rows("brands").len(), 2);
    }

    #[tokio::test]
    async fn failed_brand_insert_is_counted() {
        let dest = MemoryStore::new();
        dest.reject_inserts("brands", "name", "Acme");
        let ps = products(&[Some("Acme"), Some("Zeiss")]);
        let mut ctx = MigrationContext::new();
        migrate_brands(&mut ctx, &dest, &ps).await.unwrap();
        assert_eq!(ctx.stats.brands_failed, 1);
        assert_eq!(ctx.stats.brands_created, 1);
        assert!(!ctx.brand_map.contains_key("acme"));
    }
}
