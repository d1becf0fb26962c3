use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use super::context::MigrationContext;
use super::model::{SourcePricing, SourceProduct, TargetProduct};
use super::rehost::AssetRehoster;
use super::specialties::SpecialtyLinker;
use super::transform::{build_target, processing_order, resolve_pricing, GroupIndex};
use crate::database_ops::{row_id, DestinationStore};

pub const PRODUCTS_TABLE: &str = "products";
pub const PRODUCT_IMAGES_TABLE: &str = "product_images";
pub const PRODUCT_CATEGORIES_TABLE: &str = "product_categories";

async fn insert_product(dest: &dyn DestinationStore, target: &TargetProduct) -> Result<String> {
    let row = serde_json::to_value(target).context("encode product row")?;
    let stored = dest.insert(PRODUCTS_TABLE, row).await?;
    row_id(&stored).ok_or_else(|| anyhow!("insert returned no id"))
}

/// Migrate every product. Parents go first so children can point at them;
/// a failed product is recorded and the run moves on.
pub async fn migrate_products(
    ctx: &mut MigrationContext,
    dest: &dyn DestinationStore,
    rehoster: &AssetRehoster,
    bucket: &str,
    products: Vec<SourceProduct>,
    pricing: Vec<SourcePricing>,
) -> Result<()> {
    ctx.load_pricing(pricing);
    let mut specialties = SpecialtyLinker::load(dest, "product_specialties", "product_id").await?;

    let plan = processing_order(products);
    for id in &plan.duplicates {
        warn!(target = "migration", source_id = %id, "duplicate source product skipped");
    }
    ctx.stats.products_duplicates += plan.duplicates.len();
    let groups = GroupIndex::build(&plan.products);
    debug!(target = "migration", products = plan.products.len(), groups = groups.len(), "product plan ready");

    for product in &plan.products {
        ctx.stats.products_total += 1;

        let pricing = product
            .pricing
            .as_ref()
            .and_then(|id| ctx.pricing_map.get(id));
        let priced = resolve_pricing(product, pricing);
        let brand_id = product
            .brand_key()
            .and_then(|key| ctx.brand_map.get(&key).cloned());
        let parent_id = groups
            .parent_of(product)
            .and_then(|parent| ctx.product_map.get(parent).cloned());
        let reference = ctx
            .references
            .propose(product.serial_number.as_deref(), &product.id);
        let target = build_target(product, priced, brand_id, parent_id, reference.clone());

        let product_id = match insert_product(dest, &target).await {
            Ok(id) => id,
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target = "migration", source_id = %product.id, name = %target.name, error = %error, "product not migrated");
                ctx.record_failure(product.id.clone(), target.name, error);
                continue;
            }
        };
        if let Some(reference) = &reference {
            ctx.references.commit(reference);
        }
        ctx.product_map.insert(product.id.clone(), product_id.clone());
        ctx.stats.products_migrated += 1;
        debug!(target = "migration", source_id = %product.id, product_id = %product_id, "product migrated");

        if let Some(image) = product.image.as_deref() {
            let prefix = format!("products/{product_id}");
            match rehoster.rehost(image, bucket, &prefix).await {
                Some(url) => {
                    let row = json!({ "product_id": product_id, "image_url": url, "order_index": 0 });
                    match dest.insert(PRODUCT_IMAGES_TABLE, row).await {
                        Ok(_) => ctx.stats.images_uploaded += 1,
                        Err(e) => {
                            ctx.stats.link_failures += 1;
                            warn!(target = "migration", product_id = %product_id, error = %e, "image row not inserted");
                        }
                    }
                }
                None => ctx.stats.images_failed += 1,
            }
        }

        if let Some(category) = &product.category {
            match ctx.category_map.get(category).cloned() {
                Some(category_id) => {
                    let row = json!({ "product_id": product_id, "category_id": category_id });
                    match dest.insert(PRODUCT_CATEGORIES_TABLE, row).await {
                        Ok(_) => ctx.stats.category_links += 1,
                        Err(e) => {
                            ctx.stats.link_failures += 1;
                            warn!(target = "migration", product_id = %product_id, error = %e, "category link failed");
                        }
                    }
                }
                None => ctx.stats.category_links_skipped += 1,
            }
        }

        specialties
            .link_all(dest, &product_id, product.speciality.as_ref(), &mut ctx.stats)
            .await;
    }

    info!(
        target = "migration",
        migrated = ctx.stats.products_migrated,
        total = ctx.stats.products_total,
        errors = ctx.stats.products_errors,
        "products done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::{MemoryStorage, MemoryStore};
    use crate::migration::model::SourceId;
    use crate::migration::rehost::StaticImageFetcher;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn product(v: Value) -> SourceProduct {
        serde_json::from_value(v).unwrap()
    }

    fn rehoster(storage: Arc<MemoryStorage>) -> AssetRehoster {
        let fetcher =
            StaticImageFetcher::new().with_image("https://old.example/p.jpg", None, b"JPEG");
        AssetRehoster::new(Arc::new(fetcher), storage, "3600").with_clock(|| 7)
    }

    fn product_row<'a>(rows: &'a [Value], id: &str) -> &'a Value {
        rows.iter().find(|r| r["id"] == id).unwrap()
    }

    #[tokio::test]
    async fn children_point_at_their_group_parent() {
        let dest = MemoryStore::new();
        let storage = Arc::new(MemoryStorage::new());
        let products = vec![
            product(json!({"id": 1, "name": "Child A", "product_group_uid": "g"})),
            product(json!({"id": 2, "name": "Parent", "product_group_uid": "g", "is_cheapest_in_group": true})),
            product(json!({"id": 3, "name": "Child B", "product_group_uid": "g"})),
        ];
        let mut ctx = MigrationContext::new();
        migrate_products(&mut ctx, &dest, &rehoster(storage), "product-images", products, vec![])
            .await
            .unwrap();

        let parent_id = ctx.product_map[&SourceId::Int(2)].clone();
        let rows = dest.rows("products");
        assert!(product_row(&rows, &parent_id)["parent_product_id"].is_null());
        for child in [1, 3] {
            let id = &ctx.product_map[&SourceId::Int(child)];
            assert_eq!(product_row(&rows, id)["parent_product_id"], parent_id.as_str());
        }
    }

    #[tokio::test]
    async fn second_cheapest_member_is_not_parented() {
        let dest = MemoryStore::new();
        let storage = Arc::new(MemoryStorage::new());
        let products = vec![
            product(json!({"id": 9, "name": "Also cheap", "product_group_uid": "g", "is_cheapest_in_group": true})),
            product(json!({"id": 5, "name": "Cheap", "product_group_uid": "g", "is_cheapest_in_group": true})),
            product(json!({"id": 7, "name": "Plain", "product_group_uid": "g"})),
        ];
        let mut ctx = MigrationContext::new();
        migrate_products(&mut ctx, &dest, &rehoster(storage), "product-images", products, vec![])
            .await
            .unwrap();

        let rows = dest.rows("products");
        let lowest = ctx.product_map[&SourceId::Int(5)].clone();
        let other = &ctx.product_map[&SourceId::Int(9)];
        let plain = &ctx.product_map[&SourceId::Int(7)];
        assert!(product_row(&rows, &lowest)["parent_product_id"].is_null());
        assert!(product_row(&rows, other)["parent_product_id"].is_null());
        assert_eq!(product_row(&rows, plain)["parent_product_id"], lowest.as_str());
    }

    #[tokio::test]
    async fn failed_parent_leaves_children_unparented() {
        let dest = MemoryStore::new();
        dest.reject_inserts("products", "name", "Parent");
        let storage = Arc::new(MemoryStorage::new());
        let products = vec![
            product(json!({"id": 1, "name": "Parent", "product_group_uid": "g", "is_cheapest_in_group": true})),
            product(json!({"id": 2, "name": "Child", "product_group_uid": "g"})),
        ];
        let mut ctx = MigrationContext::new();
        migrate_products(&mut ctx, &dest, &rehoster(storage), "product-images", products, vec![])
            .await
            .unwrap();
        assert_eq!(ctx.stats.products_errors, 1);
        assert_eq!(ctx.stats.products_migrated, 1);
        assert_eq!(ctx.failures[0].source_id, SourceId::Int(1));
        assert!(dest.rows("products")[0]["parent_product_id"].is_null());
    }

    #[tokio::test]
    async fn one_bad_product_does_not_disturb_the_rest() {
        let dest = MemoryStore::new();
        dest.reject_inserts("products", "reference", "BAD");
        let storage = Arc::new(MemoryStorage::new());
        let products = vec![
            product(json!({"id": 1, "serial_number": "SN"})),
            product(json!({"id": 2, "serial_number": "BAD"})),
            product(json!({"id": 3, "serial_number": "SN"})),
            product(json!({"id": 4, "serial_number": "BAD"})),
            product(json!({"id": 5})),
        ];
        let mut ctx = MigrationContext::new();
        migrate_products(&mut ctx, &dest, &rehoster(storage), "product-images", products, vec![])
            .await
            .unwrap();

        assert_eq!(ctx.stats.products_total, 5);
        assert_eq!(ctx.stats.products_migrated, 3);
        assert_eq!(ctx.stats.products_errors, 2);
        assert!(!ctx.references.contains("BAD"));
        let refs: Vec<Value> = dest.rows("products").iter().map(|r| r["reference"].clone()).collect();
        assert_eq!(refs, vec![json!("SN"), json!("SN-3"), Value::Null]);
        let non_null: HashSet<_> = refs.iter().filter(|r| !r.is_null()).collect();
        assert_eq!(non_null.len(), 2);
    }

    #[tokio::test]
    async fn pricing_brand_category_image_and_specialties() {
        let dest = MemoryStore::new();
        let storage = Arc::new(MemoryStorage::new());
        let mut ctx = MigrationContext::new();
        ctx.map_brand("dell".into(), "brand-dell".into());
        ctx.map_category(SourceId::Int(10), "cat-10".into());
        let products = vec![
            product(json!({
                "id": 1,
                "name": "Poste",
                "brand": " DELL ",
                "pricing": 5,
                "category": 10,
                "image": "//old.example/p.jpg",
                "speciality": "[\"Cardiologie\",\"Cardiologie\"]",
                "product_type": "mobilier",
                "filter_color": "Gris"
            })),
            product(json!({"id": 2, "category": 99, "image": "https://old.example/gone.jpg"})),
        ];
        let pricing = vec![serde_json::from_value(json!({"id": 5, "provider_price": 120, "marlon_margin": 18})).unwrap()];
        migrate_products(&mut ctx, &dest, &rehoster(storage.clone()), "product-images", products, pricing)
            .await
            .unwrap();

        let rows = dest.rows("products");
        assert_eq!(rows[0]["purchase_price_ht"], 120.0);
        assert_eq!(rows[0]["marlon_margin_percent"], 18.0);
        assert_eq!(rows[0]["brand_id"], "brand-dell");
        assert_eq!(rows[0]["product_type"], "furniture");
        assert_eq!(rows[0]["variant_data"], json!({"color": "Gris"}));
        assert_eq!(rows[1]["name"], "Produit #2");
        assert_eq!(rows[1]["purchase_price_ht"], 0.0);
        assert_eq!(rows[1]["marlon_margin_percent"], 30.0);
        assert_eq!(rows[1]["product_type"], "medical_equipment");
        assert_eq!(rows[1]["variant_data"], json!({}));

        let first_id = &ctx.product_map[&SourceId::Int(1)];
        let images = dest.rows("product_images");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["product_id"], first_id.as_str());
        assert_eq!(images[0]["order_index"], 0);
        assert_eq!(storage.paths("product-images").len(), 1);
        assert!(storage.paths("product-images")[0].starts_with(&format!("products/{first_id}/7-")));

        assert_eq!(ctx.stats.images_uploaded, 1);
        assert_eq!(ctx.stats.images_failed, 1);
        assert_eq!(ctx.stats.category_links, 1);
        assert_eq!(ctx.stats.category_links_skipped, 1);
        assert_eq!(ctx.stats.specialties_linked, 1);
        assert_eq!(dest.rows("product_categories")[0]["category_id"], "cat-10");
    }

    #[tokio::test]
    async fn duplicate_source_ids_are_counted_not_migrated() {
        let dest = MemoryStore::new();
        let storage = Arc::new(MemoryStorage::new());
        let products = vec![
            product(json!({"id": 1, "name": "A"})),
            product(json!({"id": "1", "name": "B"})),
        ];
        let mut ctx = MigrationContext::new();
        migrate_products(&mut ctx, &dest, &rehoster(storage), "product-images", products, vec![])
            .await
            .unwrap();
        assert_eq!(ctx.stats.products_duplicates, 1);
        assert_eq!(ctx.stats.products_total, 1);
        assert_eq!(dest.rows("products")[0]["name"], "A");
    }
}
