//! Pure helpers that reconcile legacy fields with the stricter target schema.

pub mod product_type;
pub mod slug;
pub mod specialty;
pub mod variant;

pub use product_type::{classify_material, classify_product_type, ProductType};
pub use slug::slugify;
pub use specialty::{specialty_names, SpecialtyPayload};
pub use variant::{collect_variant_data, VariantData, VARIANT_KEYS};
