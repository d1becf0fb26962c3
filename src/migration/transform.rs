//! Pure product transformation: pricing merge, variant grouping, ordering
//! and the target row itself. No I/O here.

use std::collections::{HashMap, HashSet};

use super::model::{SourceId, SourcePricing, SourceProduct, TargetProduct};
use crate::normalization::{classify_product_type, collect_variant_data};

pub const DEFAULT_MARGIN_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPricing {
    pub purchase_price: f64,
    pub margin_percent: f64,
}

/// Margin from the pricing record (default 30). Purchase price is the first
/// non-null of product price, pricing price, 0.
pub fn resolve_pricing(product: &SourceProduct, pricing: Option<&SourcePricing>) -> ResolvedPricing {
    let margin_percent = pricing
        .and_then(|p| p.marlon_margin)
        .unwrap_or(DEFAULT_MARGIN_PERCENT);
    let purchase_price = product
        .provider_price
        .or_else(|| pricing.and_then(|p| p.provider_price))
        .unwrap_or(0.0);
    ResolvedPricing {
        purchase_price,
        margin_percent,
    }
}

/// Variant groups keyed by `product_group_uid`, with the member each group
/// hangs its children from.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    members: HashMap<String, Vec<SourceId>>,
    parents: HashMap<String, SourceId>,
}

impl GroupIndex {
    /// The parent of a group is its cheapest-flagged member; with several,
    /// the lowest source id. Other flagged members stay top-level.
    pub fn build(products: &[SourceProduct]) -> Self {
        let mut index = GroupIndex::default();
        for p in products {
            let Some(group) = p.group_key() else {
                continue;
            };
            index
                .members
                .entry(group.to_string())
                .or_default()
                .push(p.id.clone());
            if p.is_cheapest_in_group {
                index
                    .parents
                    .entry(group.to_string())
                    .and_modify(|current| {
                        if p.id < *current {
                            *current = p.id.clone();
                        }
                    })
                    .or_insert_with(|| p.id.clone());
            }
        }
        index
    }

    pub fn members(&self, group: &str) -> &[SourceId] {
        self.members.get(group).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn group_parent(&self, group: &str) -> Option<&SourceId> {
        self.parents.get(group)
    }

    /// Source id `product` should hang from, if any. Cheapest-flagged and
    /// ungrouped products have none.
    pub fn parent_of(&self, product: &SourceProduct) -> Option<&SourceId> {
        if product.is_cheapest_in_group {
            return None;
        }
        self.parents.get(product.group_key()?)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Products in processing order, plus the ids dropped as duplicates.
#[derive(Debug, Clone, Default)]
pub struct ProcessingPlan {
    pub products: Vec<SourceProduct>,
    pub duplicates: Vec<SourceId>,
}

/// Keep the first row per source id, then order by
/// `(not cheapest_in_group, source_id)` so every parent precedes its group.
pub fn processing_order(products: Vec<SourceProduct>) -> ProcessingPlan {
    let mut seen = HashSet::new();
    let mut plan = ProcessingPlan::default();
    for p in products {
        if seen.insert(p.id.clone()) {
            plan.products.push(p);
        } else {
            plan.duplicates.push(p.id);
        }
    }
    plan.products
        .sort_by(|a, b| (!a.is_cheapest_in_group, &a.id).cmp(&(!b.is_cheapest_in_group, &b.id)));
    plan
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Assemble the destination row from resolved pieces.
pub fn build_target(
    product: &SourceProduct,
    pricing: ResolvedPricing,
    brand_id: Option<String>,
    parent_product_id: Option<String>,
    reference: Option<String>,
) -> TargetProduct {
    let variant_data = collect_variant_data([
        ("color", product.filter_color.as_ref()),
        ("processor", product.filter_processor.as_ref()),
        ("storage", product.filter_storage.as_ref()),
        ("screenSize", product.filter_screen_size.as_ref()),
        ("product_family", product.product_family.as_ref()),
    ]);
    TargetProduct {
        name: product.display_name(),
        reference,
        description: non_blank(&product.description),
        purchase_price_ht: pricing.purchase_price,
        marlon_margin_percent: pricing.margin_percent,
        supplier_id: None,
        brand_id,
        default_leaser_id: None,
        product_type: classify_product_type(product.product_type.as_deref()),
        serial_number: non_blank(&product.serial_number),
        technical_info: non_blank(&product.technicals_informations),
        variant_data,
        parent_product_id,
        created_at: product.created_at.clone(),
    }
}
