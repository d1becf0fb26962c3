use std::collections::HashMap;

use super::model::{SourceId, SourcePricing};
use super::reference::ReferenceRegistry;
use super::report::{ProductFailure, RunReport, RunStats};
use crate::database_ops::reset::ResetReport;

/// State owned by exactly one run: id mappings, the pricing cache, the
/// reference registry and the counters. Nothing here outlives the run.
#[derive(Debug, Default)]
pub struct MigrationContext {
    pub category_map: HashMap<SourceId, String>,
    /// Keyed by lower-cased brand name.
    pub brand_map: HashMap<String, String>,
    pub product_map: HashMap<SourceId, String>,
    pub pricing_map: HashMap<SourceId, SourcePricing>,
    pub references: ReferenceRegistry,
    pub stats: RunStats,
    pub failures: Vec<ProductFailure>,
    pub reset_report: Option<ResetReport>,
}

impl MigrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the empty state of a fresh run.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record a category mapping; an existing entry is kept.
    pub fn map_category(&mut self, source: SourceId, target: String) -> &str {
        self.category_map.entry(source).or_insert(target)
    }

    pub fn map_brand(&mut self, name_key: String, target: String) -> &str {
        self.brand_map.entry(name_key).or_insert(target)
    }

    pub fn load_pricing(&mut self, records: impl IntoIterator<Item = SourcePricing>) {
        for p in records {
            self.pricing_map.entry(p.id.clone()).or_insert(p);
        }
    }

    pub fn record_failure(&mut self, source_id: SourceId, name: String, error: String) {
        self.stats.products_errors += 1;
        self.failures.push(ProductFailure {
            source_id,
            name,
            error,
        });
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            stats: self.stats,
            failures: self.failures,
            reset: self.reset_report,
        }
    }
}
