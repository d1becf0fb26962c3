use anyhow::Result;
use serde_json::{Map, Value};
use tracing::warn;

use super::report::RunStats;
use super::resolver::{LinkSet, NameResolver};
use crate::database_ops::DestinationStore;
use crate::normalization::specialty_names;

pub const SPECIALTIES_TABLE: &str = "specialties";

/// Resolves specialty names and links them to a parent row through one
/// association table (`category_specialties` or `product_specialties`).
#[derive(Debug, Clone)]
pub struct SpecialtyLinker {
    specialties: NameResolver,
    links: LinkSet,
}

impl SpecialtyLinker {
    pub async fn load(
        dest: &dyn DestinationStore,
        link_table: &str,
        parent_column: &str,
    ) -> Result<Self> {
        Ok(Self {
            specialties: NameResolver::load(dest, SPECIALTIES_TABLE).await?,
            links: LinkSet::load(dest, link_table, parent_column, "specialty_id").await?,
        })
    }

    /// Link every specialty named in `raw` to `parent_id`. Failures are
    /// counted, never returned.
    pub async fn link_all(
        &mut self,
        dest: &dyn DestinationStore,
        parent_id: &str,
        raw: Option<&Value>,
        stats: &mut RunStats,
    ) {
        for name in specialty_names(raw) {
            let resolution = match self.specialties.resolve(dest, &name, Map::new()).await {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    stats.link_failures += 1;
                    warn!(target = "migration", specialty = %name, error = %e, "specialty not resolved");
                    continue;
                }
            };
            if resolution.was_created() {
                stats.specialties_created += 1;
            }
            match self.links.link(dest, parent_id, resolution.id()).await {
                Ok(true) => stats.specialties_linked += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.link_failures += 1;
                    warn!(target = "migration", parent_id, specialty = %name, error = %e, "specialty link failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn repeated_specialties_link_once() {
        let dest = MemoryStore::new();
        dest.seed("specialties", json!({"id": "s-cardio", "name": "Cardiologie"}));
        let mut linker = SpecialtyLinker::load(&dest, "product_specialties", "product_id")
            .await
            .unwrap();
        let mut stats = RunStats::new();
        let raw = json!(["cardiologie", {"name": "Radiologie"}, "CARDIOLOGIE "]);
        linker.link_all(&dest, "p1", Some(&raw), &mut stats).await;
        linker
            .link_all(&dest, "p1", Some(&json!("Radiologie")), &mut stats)
            .await;

        assert_eq!(stats.specialties_linked, 2);
        assert_eq!(stats.specialties_created, 1);
        assert_eq!(dest.rows("specialties").len(), 2);
        let links = dest.rows("product_specialties");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["specialty_id"], "s-cardio");
    }

    #[tokio::test]
    async fn link_failures_are_counted() {
        let dest = MemoryStore::new();
        let mut linker = SpecialtyLinker::load(&dest, "category_specialties", "category_id")
            .await
            .unwrap();
        dest.break_table("category_specialties");
        let mut stats = RunStats::new();
        linker
            .link_all(&dest, "c1", Some(&json!("Urgences")), &mut stats)
            .await;
        assert_eq!(stats.link_failures, 1);
        assert_eq!(stats.specialties_linked, 0);
        assert_eq!(stats.specialties_created, 1);
    }
}
