//! In-flight records: what the old project hands us and what the new one
//! receives. Source fields are decoded leniently because the legacy schema
//! stored numbers as text, booleans as 0/1 and so on.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::normalization::{ProductType, VariantData};

/// Identity assigned by the old project: an integer or a UUID. Numeric text
/// is read as an integer so `"12"` and `12` refer to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum SourceId {
    Int(i64),
    Text(String),
}

impl SourceId {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => Some(
                n.as_i64()
                    .map(SourceId::Int)
                    .unwrap_or_else(|| SourceId::Text(n.to_string())),
            ),
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(
                        s.parse::<i64>()
                            .map(SourceId::Int)
                            .unwrap_or_else(|_| SourceId::Text(s.to_string())),
                    )
                }
            }
            _ => None,
        }
    }
}

impl From<i64> for SourceId {
    fn from(v: i64) -> Self {
        SourceId::Int(v)
    }
}

impl From<&str> for SourceId {
    fn from(v: &str) -> Self {
        SourceId::from_value(&Value::String(v.to_string()))
            .unwrap_or_else(|| SourceId::Text(v.to_string()))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Int(v) => write!(f, "{v}"),
            SourceId::Text(s) => f.write_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        SourceId::from_value(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid source id: {raw}")))
    }
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SourceId>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(SourceId::from_value))
}

/// Text column: blank becomes None; scalars are stringified.
fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Numeric column stored as a number or as text (`"120"`, `"12,5"`).
fn de_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()))
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "t" | "yes" | "on"
        ),
        _ => false,
    })
}

/// Raw JSON column; explicit null is treated as absent.
fn de_opt_raw<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.is_null()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceProduct {
    pub id: SourceId,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub serial_number: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub technicals_informations: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub product_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_raw")]
    pub filter_color: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_raw")]
    pub filter_processor: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_raw")]
    pub filter_storage: Option<Value>,
    #[serde(default, rename = "filter_screenSize", deserialize_with = "de_opt_raw")]
    pub filter_screen_size: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_raw")]
    pub product_family: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub product_group_uid: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_cheapest_in_group: bool,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub pricing: Option<SourceId>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub category: Option<SourceId>,
    #[serde(default, deserialize_with = "de_opt_raw")]
    pub speciality: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub provider_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub created_at: Option<String>,
}

impl SourceProduct {
    /// Grouping key, trimmed; blank means "not grouped".
    pub fn group_key(&self) -> Option<&str> {
        self.product_group_uid
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    /// Brand name as it keys `brand_map`.
    pub fn brand_key(&self) -> Option<String> {
        self.brand
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_lowercase)
    }

    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("Produit #{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePricing {
    pub id: SourceId,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub marlon_margin: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub provider_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCategory {
    pub id: SourceId,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub material_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "de_opt_raw")]
    pub speciality: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub product_family: Option<String>,
}

/// Row written to the new `products` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetProduct {
    pub name: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub purchase_price_ht: f64,
    pub marlon_margin_percent: f64,
    pub supplier_id: Option<String>,
    pub brand_id: Option<String>,
    pub default_leaser_id: Option<String>,
    pub product_type: ProductType,
    pub serial_number: Option<String>,
    pub technical_info: Option<String>,
    pub variant_data: VariantData,
    pub parent_product_id: Option<String>,
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_ids_normalize_numeric_text() {
        let a: SourceId = serde_json::from_value(json!(12)).unwrap();
        let b: SourceId = serde_json::from_value(json!(" 12 ")).unwrap();
        assert_eq!(a, b);
        let u: SourceId = serde_json::from_value(json!("7f1c-uuid")).unwrap();
        assert_eq!(u.to_string(), "7f1c-uuid");
        assert!(serde_json::from_value::<SourceId>(json!("")).is_err());
        assert!(SourceId::Int(2) < SourceId::Int(10));
    }

    #[test]
    fn product_decodes_loose_legacy_row() {
        let p: SourceProduct = serde_json::from_value(json!({
            "id": 5,
            "name": "  ",
            "serial_number": "SN-1",
            "provider_price": "80,5",
            "pricing": "3",
            "category": null,
            "is_cheapest_in_group": 1,
            "filter_screenSize": "27\"",
            "product_group_uid": " g-1 ",
            "brand": " Dell ",
            "speciality": null,
            "unknown_column": {"ignored": true}
        }))
        .unwrap();
        assert_eq!(p.id, SourceId::Int(5));
        assert_eq!(p.name, None);
        assert_eq!(p.display_name(), "Produit #5");
        assert_eq!(p.provider_price, Some(80.5));
        assert_eq!(p.pricing, Some(SourceId::Int(3)));
        assert_eq!(p.category, None);
        assert!(p.is_cheapest_in_group);
        assert_eq!(p.filter_screen_size, Some(json!("27\"")));
        assert_eq!(p.group_key(), Some("g-1"));
        assert_eq!(p.brand_key().as_deref(), Some("dell"));
        assert_eq!(p.speciality, None);
    }

    #[test]
    fn minimal_rows_decode_with_defaults() {
        let p: SourceProduct = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert!(!p.is_cheapest_in_group);
        assert_eq!(p.provider_price, None);
        assert_eq!(p.group_key(), None);

        let pr: SourcePricing =
            serde_json::from_value(json!({"id": 1, "marlon_margin": null, "provider_price": "abc"}))
                .unwrap();
        assert_eq!(pr.marlon_margin, None);
        assert_eq!(pr.provider_price, None);
    }

    #[test]
    fn target_product_serializes_nulls_and_type() {
        let t = TargetProduct {
            name: "X".into(),
            reference: None,
            description: None,
            purchase_price_ht: 0.0,
            marlon_margin_percent: 30.0,
            supplier_id: None,
            brand_id: None,
            default_leaser_id: None,
            product_type: ProductType::Furniture,
            serial_number: None,
            technical_info: None,
            variant_data: VariantData::new(),
            parent_product_id: None,
            created_at: None,
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["product_type"], "furniture");
        assert_eq!(v["variant_data"], json!({}));
        assert!(v["supplier_id"].is_null());
    }
}
