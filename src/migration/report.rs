use std::fmt;

use serde::Serialize;

use super::model::SourceId;
use crate::database_ops::reset::ResetReport;

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub source_rows_rejected: usize,
    pub products_total: usize,
    pub products_migrated: usize,
    pub products_errors: usize,
    pub products_duplicates: usize,
    pub categories_created: usize,
    pub categories_mapped: usize,
    pub categories_failed: usize,
    pub category_images_uploaded: usize,
    pub category_images_failed: usize,
    pub brands_created: usize,
    pub brands_mapped: usize,
    pub brands_failed: usize,
    pub images_uploaded: usize,
    pub images_failed: usize,
    pub category_links: usize,
    pub category_links_skipped: usize,
    pub specialties_created: usize,
    pub specialties_linked: usize,
    pub link_failures: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            target = "migration",
            products_total = self.products_total,
            products_migrated = self.products_migrated,
            products_errors = self.products_errors,
            categories_created = self.categories_created,
            categories_mapped = self.categories_mapped,
            brands_created = self.brands_created,
            brands_mapped = self.brands_mapped,
            images_uploaded = self.images_uploaded,
            images_failed = self.images_failed,
            category_links = self.category_links,
            specialties_linked = self.specialties_linked,
            link_failures = self.link_failures,
            "migration summary"
        );
    }
}

/// A product that could not be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductFailure {
    pub source_id: SourceId,
    pub name: String,
    pub error: String,
}

/// Everything a finished run has to say for itself.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stats: RunStats,
    pub failures: Vec<ProductFailure>,
    pub reset: Option<ResetReport>,
}

impl RunReport {
    pub fn has_partial_failures(&self) -> bool {
        self.stats.products_errors > 0
            || self.stats.images_failed > 0
            || self.stats.link_failures > 0
            || self.reset.as_ref().is_some_and(|r| !r.is_clean())
    }
}

const RULE: &str = "===================================================";

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "{RULE}")?;
        writeln!(f, "MIGRATION SUMMARY")?;
        writeln!(f, "{RULE}")?;
        if let Some(reset) = &self.reset {
            writeln!(
                f,
                "  Reset          : {} steps done, {} failed ({} products deleted, {} kept, {} objects removed)",
                reset.completed.len(),
                reset.failed.len(),
                reset.products_deleted,
                reset.products_kept,
                reset.objects_removed
            )?;
        }
        writeln!(
            f,
            "  Products       : {}/{} migrated ({} errors, {} duplicates skipped)",
            s.products_migrated, s.products_total, s.products_errors, s.products_duplicates
        )?;
        writeln!(
            f,
            "  Categories     : {} created, {} mapped, {} failed",
            s.categories_created, s.categories_mapped, s.categories_failed
        )?;
        writeln!(
            f,
            "  Brands         : {} created, {} mapped, {} failed",
            s.brands_created, s.brands_mapped, s.brands_failed
        )?;
        writeln!(
            f,
            "  Images         : {} uploaded, {} failed (categories: {} uploaded, {} failed)",
            s.images_uploaded, s.images_failed, s.category_images_uploaded, s.category_images_failed
        )?;
        writeln!(
            f,
            "  Category links : {} created, {} skipped",
            s.category_links, s.category_links_skipped
        )?;
        writeln!(
            f,
            "  Specialties    : {} linked, {} created",
            s.specialties_linked, s.specialties_created
        )?;
        if s.source_rows_rejected > 0 {
            writeln!(f, "  Rejected rows  : {} (undecodable source rows)", s.source_rows_rejected)?;
        }
        if s.link_failures > 0 {
            writeln!(f, "  Link failures  : {}", s.link_failures)?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  ! \"{}\" (old #{}): {}",
                failure.name, failure.source_id, failure.error
            )?;
        }
        write!(f, "{RULE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_counts_and_failures() {
        let report = RunReport {
            stats: RunStats {
                products_total: 3,
                products_migrated: 2,
                products_errors: 1,
                brands_created: 1,
                ..RunStats::default()
            },
            failures: vec![ProductFailure {
                source_id: SourceId::Int(7),
                name: "Lit médical".into(),
                error: "duplicate key".into(),
            }],
            reset: None,
        };
        let text = report.to_string();
        assert!(text.contains("2/3 migrated (1 errors"));
        assert!(text.contains("\"Lit médical\" (old #7): duplicate key"));
        assert!(!text.contains("Reset"));
        assert!(report.has_partial_failures());
    }

    #[test]
    fn clean_run_has_no_partial_failures() {
        let report = RunReport {
            reset: Some(ResetReport::default()),
            ..RunReport::default()
        };
        assert!(!report.has_partial_failures());
        assert!(report.to_string().contains("Reset          : 0 steps done"));
    }
}
