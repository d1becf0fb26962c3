use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse product taxonomy of the new catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    ItEquipment,
    Furniture,
    MedicalEquipment,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::ItEquipment => "it_equipment",
            ProductType::Furniture => "furniture",
            ProductType::MedicalEquipment => "medical_equipment",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const IT_MARKERS: [&str; 3] = ["it", "info", "computer"];
const FURNITURE_MARKERS: [&str; 3] = ["mobil", "furni", "meuble"];

fn lowered(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_lowercase()
}

/// Map a legacy `product_type` string onto the taxonomy. Substring match,
/// IT markers checked first; anything else (including empty) is medical.
pub fn classify_product_type(raw: Option<&str>) -> ProductType {
    let t = lowered(raw);
    if IT_MARKERS.iter().any(|m| t.contains(m)) {
        ProductType::ItEquipment
    } else if FURNITURE_MARKERS.iter().any(|m| t.contains(m)) {
        ProductType::Furniture
    } else {
        ProductType::MedicalEquipment
    }
}

/// Same idea for a category's `material_type` hint. Categories never used
/// the "computer" wording, so only `it`/`info` count as IT there.
pub fn classify_material(raw: Option<&str>) -> ProductType {
    let t = lowered(raw);
    if t.contains("it") || t.contains("info") {
        ProductType::ItEquipment
    } else if FURNITURE_MARKERS.iter().any(|m| t.contains(m)) {
        ProductType::Furniture
    } else {
        ProductType::MedicalEquipment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_markers() {
        assert_eq!(classify_product_type(Some("IT")), ProductType::ItEquipment);
        assert_eq!(classify_product_type(Some("Informatique")), ProductType::ItEquipment);
        assert_eq!(classify_product_type(Some("  Computer ")), ProductType::ItEquipment);
    }

    #[test]
    fn furniture_markers() {
        assert_eq!(classify_product_type(Some("Mobilier")), ProductType::Furniture);
        assert_eq!(classify_product_type(Some("FURNI")), ProductType::Furniture);
        assert_eq!(classify_product_type(Some("meuble de rangement")), ProductType::Furniture);
    }

    #[test]
    fn everything_else_is_medical() {
        for raw in [None, Some(""), Some("   "), Some("Echographe"), Some("42"), Some("é")] {
            assert_eq!(classify_product_type(raw), ProductType::MedicalEquipment, "{raw:?}");
        }
    }

    #[test]
    fn it_wins_when_both_match() {
        // Both contain "it", and IT is checked first.
        assert_eq!(classify_product_type(Some("mobilite")), ProductType::ItEquipment);
        assert_eq!(classify_product_type(Some("Furniture")), ProductType::ItEquipment);
    }

    #[test]
    fn material_ignores_computer_wording() {
        assert_eq!(classify_material(Some("computer")), ProductType::MedicalEquipment);
        assert_eq!(classify_material(Some("Informatique")), ProductType::ItEquipment);
        assert_eq!(classify_material(Some("Meuble")), ProductType::Furniture);
        assert_eq!(classify_material(None), ProductType::MedicalEquipment);
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ProductType::ItEquipment).unwrap(),
            serde_json::json!("it_equipment")
        );
        assert_eq!(ProductType::MedicalEquipment.to_string(), "medical_equipment");
    }
}
