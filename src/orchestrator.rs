//! One migration run end to end: extract, reset, categories, brands,
//! products.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::database_ops::extract::{decode_rows, fetch_all};
use crate::database_ops::reset::{reset_plan, run_reset};
use crate::database_ops::{DestinationStore, ObjectStorage, SourceTable};
use crate::migration::brands::migrate_brands;
use crate::migration::categories::migrate_categories;
use crate::migration::products::migrate_products;
use crate::migration::{
    AssetRehoster, ImageFetcher, MigrationContext, RunReport, SourceCategory, SourcePricing,
    SourceProduct,
};

pub const SOURCE_PRODUCT_TABLE: &str = "product";
pub const SOURCE_PRICING_TABLE: &str = "pricing";
pub const SOURCE_CATEGORY_TABLE: &str = "category";

/// The collaborators a run talks to.
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn SourceTable>,
    pub destination: Arc<dyn DestinationStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub fetcher: Arc<dyn ImageFetcher>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub skip_clean: bool,
    pub page_size: usize,
    pub product_bucket: String,
    pub category_bucket: String,
    pub cache_control: String,
}

impl RunOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            skip_clean: false,
            page_size: config.page_size,
            product_bucket: config.product_bucket.clone(),
            category_bucket: config.category_bucket.clone(),
            cache_control: config.cache_control.clone(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_clean: false,
            page_size: MigrationConfig::DEFAULT_PAGE_SIZE,
            product_bucket: "product-images".to_string(),
            category_bucket: "category-images".to_string(),
            cache_control: "3600".to_string(),
        }
    }
}

/// Everything read from the old project, decoded.
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub products: Vec<SourceProduct>,
    pub pricing: Vec<SourcePricing>,
    pub categories: Vec<SourceCategory>,
    /// Rows that could not be decoded, all tables together.
    pub rejected: usize,
}

pub async fn fetch_source(source: &dyn SourceTable, page_size: usize) -> Result<SourceSnapshot> {
    let (products, rejected_products) = decode_rows(
        SOURCE_PRODUCT_TABLE,
        fetch_all(source, SOURCE_PRODUCT_TABLE, page_size).await?,
    );
    let (pricing, rejected_pricing) = decode_rows(
        SOURCE_PRICING_TABLE,
        fetch_all(source, SOURCE_PRICING_TABLE, page_size).await?,
    );
    let (categories, rejected_categories) = decode_rows(
        SOURCE_CATEGORY_TABLE,
        fetch_all(source, SOURCE_CATEGORY_TABLE, page_size).await?,
    );
    let snapshot = SourceSnapshot {
        products,
        pricing,
        categories,
        rejected: rejected_products + rejected_pricing + rejected_categories,
    };
    info!(
        target = "migration",
        products = snapshot.products.len(),
        pricing = snapshot.pricing.len(),
        categories = snapshot.categories.len(),
        rejected = snapshot.rejected,
        "source extracted"
    );
    Ok(snapshot)
}

/// Run every phase in order. Only extraction and phase-start snapshot
/// failures are returned as errors; per-record problems end up in the report.
pub async fn run_migration(backends: &Backends, options: &RunOptions) -> Result<RunReport> {
    let mut ctx = MigrationContext::new();

    let snapshot = fetch_source(backends.source.as_ref(), options.page_size)
        .await
        .context("extracting source tables")?;
    ctx.stats.source_rows_rejected = snapshot.rejected;

    if options.skip_clean {
        info!(target = "migration", "reset skipped");
    } else {
        let plan = reset_plan(&[options.product_bucket.as_str(), options.category_bucket.as_str()]);
        let report = run_reset(
            backends.destination.as_ref(),
            backends.storage.as_ref(),
            &plan,
        )
        .await;
        if !report.is_clean() {
            warn!(target = "migration", failed = report.failed.len(), "reset finished with failures");
        }
        ctx.reset_report = Some(report);
    }

    let rehoster = AssetRehoster::new(
        backends.fetcher.clone(),
        backends.storage.clone(),
        options.cache_control.clone(),
    );
    let dest = backends.destination.as_ref();

    migrate_categories(
        &mut ctx,
        dest,
        &rehoster,
        &options.category_bucket,
        &snapshot.categories,
    )
    .await
    .context("category phase")?;

    migrate_brands(&mut ctx, dest, &snapshot.products)
        .await
        .context("brand phase")?;

    migrate_products(
        &mut ctx,
        dest,
        &rehoster,
        &options.product_bucket,
        snapshot.products,
        snapshot.pricing,
    )
    .await
    .context("product phase")?;

    ctx.stats.log_summary();
    Ok(ctx.into_report())
}
