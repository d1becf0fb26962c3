//! The migration engine: source/target models, run context and the three
//! data phases (categories, brands, products).

pub mod brands;
pub mod categories;
pub mod context;
pub mod model;
pub mod products;
pub mod reference;
pub mod rehost;
pub mod report;
pub mod resolver;
pub mod specialties;
pub mod transform;

pub use context::MigrationContext;
pub use model::{SourceCategory, SourceId, SourcePricing, SourceProduct, TargetProduct};
pub use reference::ReferenceRegistry;
pub use rehost::{AssetRehoster, HttpImageFetcher, ImageFetcher, StaticImageFetcher};
pub use report::{ProductFailure, RunReport, RunStats};
pub use resolver::{LinkSet, NameResolver, Resolution};
