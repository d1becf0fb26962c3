//! Legacy `speciality` payloads were loosely typed: a bare name, an object
//! with `name`/`label`, a list of either, and sometimes any of those
//! JSON-encoded as text. Decode once here into plain names.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum SpecialtyPayload {
    RawName(String),
    RawObject(Map<String, Value>),
    RawList(Vec<SpecialtyPayload>),
}

impl SpecialtyPayload {
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Null | Value::Bool(_) => None,
            Value::Number(n) => Some(SpecialtyPayload::RawName(n.to_string())),
            Value::String(s) => Self::from_text(s),
            Value::Object(map) => Some(SpecialtyPayload::RawObject(map.clone())),
            Value::Array(items) => Some(SpecialtyPayload::RawList(
                items.iter().filter_map(Self::from_value).collect(),
            )),
        }
    }

    fn from_text(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        let looks_encoded = trimmed.starts_with('[')
            || trimmed.starts_with('{')
            || trimmed.starts_with('"');
        if looks_encoded {
            if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                return match parsed {
                    // A JSON string literal decodes to a bare name; no second pass.
                    Value::String(inner) => {
                        let inner = inner.trim();
                        (!inner.is_empty()).then(|| SpecialtyPayload::RawName(inner.to_string()))
                    }
                    other => Self::from_value(&other),
                };
            }
        }
        Some(SpecialtyPayload::RawName(trimmed.to_string()))
    }

    /// Trimmed, non-empty names in payload order.
    pub fn names(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        match self {
            SpecialtyPayload::RawName(n) => {
                let n = n.trim();
                if !n.is_empty() {
                    out.push(n.to_string());
                }
            }
            SpecialtyPayload::RawObject(map) => {
                let pick = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                };
                if let Some(n) = pick("name").or_else(|| pick("label")) {
                    out.push(n.to_string());
                }
            }
            SpecialtyPayload::RawList(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
        }
    }
}

/// Names carried by an optional raw payload; empty when absent or unusable.
pub fn specialty_names(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(SpecialtyPayload::from_value)
        .map(|p| p.names())
        .unwrap_or_default()
}
