use anyhow::Result;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::context::MigrationContext;
use super::model::SourceCategory;
use super::rehost::AssetRehoster;
use super::resolver::{NameResolver, Resolution};
use super::specialties::SpecialtyLinker;
use crate::database_ops::DestinationStore;
use crate::normalization::{classify_material, slugify};

pub const CATEGORIES_TABLE: &str = "categories";

/// Migrate categories in source order: rehost the image, resolve by name
/// (updating the image of an existing match), then link specialties.
pub async fn migrate_categories(
    ctx: &mut MigrationContext,
    dest: &dyn DestinationStore,
    rehoster: &AssetRehoster,
    bucket: &str,
    categories: &[SourceCategory],
) -> Result<()> {
    let mut resolver = NameResolver::load(dest, CATEGORIES_TABLE).await?;
    let mut specialties = SpecialtyLinker::load(dest, "category_specialties", "category_id").await?;

    for cat in categories {
        let Some(name) = cat.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            debug!(target = "migration", source_id = %cat.id, "category without name skipped");
            continue;
        };

        let image_url = match cat.image.as_deref() {
            Some(image) => {
                let prefix = format!("categories/{}", slugify(name));
                let url = rehoster.rehost(image, bucket, &prefix).await;
                if url.is_some() {
                    ctx.stats.category_images_uploaded += 1;
                } else {
                    ctx.stats.category_images_failed += 1;
                }
                url
            }
            None => None,
        };

        let mut defaults = Map::new();
        defaults.insert("description".into(), json!(cat.product_family));
        defaults.insert("image_url".into(), json!(image_url));
        defaults.insert(
            "product_type".into(),
            Value::String(classify_material(cat.material_type.as_deref()).to_string()),
        );

        let resolution = match resolver.resolve(dest, name, defaults).await {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                ctx.stats.categories_failed += 1;
                warn!(target = "migration", source_id = %cat.id, category = name, error = %e, "category not migrated");
                continue;
            }
        };

        match &resolution {
            Resolution::Created(_) => ctx.stats.categories_created += 1,
            Resolution::Mapped(id) => {
                ctx.stats.categories_mapped += 1;
                if let Some(url) = &image_url {
                    if let Err(e) = dest
                        .update_by_id(CATEGORIES_TABLE, id, json!({ "image_url": url }))
                        .await
                    {
                        ctx.stats.link_failures += 1;
                        warn!(target = "migration", category_id = %id, error = %e, "category image not updated");
                    }
                }
            }
        }

        let category_id = ctx
            .map_category(cat.id.clone(), resolution.id().to_string())
            .to_string();
        debug!(target = "migration", source_id = %cat.id, category_id = %category_id, created = resolution.was_created(), "category resolved");

        specialties
            .link_all(dest, &category_id, cat.speciality.as_ref(), &mut ctx.stats)
            .await;
    }

    info!(
        target = "migration",
        created = ctx.stats.categories_created,
        mapped = ctx.stats.categories_mapped,
        failed = ctx.stats.categories_failed,
        "categories done"
    );
    Ok(())
}
