use std::collections::BTreeMap;

use serde_json::Value;

/// Keys allowed in a product's `variant_data`.
pub const VARIANT_KEYS: [&str; 5] = ["color", "processor", "storage", "screenSize", "product_family"];

pub type VariantData = BTreeMap<String, Value>;

/// A filter value worth keeping: not null, not blank, not an empty container.
fn meaningful(v: &Value) -> Option<Value> {
    match v {
        Value::Null => None,
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| Value::String(t.to_string()))
        }
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.clone()),
    }
}

/// Build the variant map from `(key, raw value)` pairs. Unknown keys and
/// absent values are left out; nothing is ever stored as null.
pub fn collect_variant_data<'a, I>(fields: I) -> VariantData
where
    I: IntoIterator<Item = (&'static str, Option<&'a Value>)>,
{
    fields
        .into_iter()
        .filter(|(k, _)| VARIANT_KEYS.contains(k))
        .filter_map(|(k, v)| v.and_then(meaningful).map(|v| (k.to_string(), v)))
        .collect()
}
