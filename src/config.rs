//! Run-level configuration: the two Supabase projects plus tuning knobs.

use std::time::Duration;

use thiserror::Error;

use crate::util::env::env_opt;

pub const OLD_URL_KEY: &str = "OLD_SUPABASE_URL";
pub const OLD_KEY_KEY: &str = "OLD_SUPABASE_KEY";
pub const NEW_URL_KEY: &str = "NEW_SUPABASE_URL";
pub const NEW_KEY_KEY: &str = "NEW_SUPABASE_SERVICE_KEY";

pub const REQUIRED_KEYS: [&str; 4] = [OLD_URL_KEY, OLD_KEY_KEY, NEW_URL_KEY, NEW_KEY_KEY];
pub const OPTIONAL_KEYS: [&str; 6] = [
    "MIGRATION_PAGE_SIZE",
    "MIGRATION_HTTP_TIMEOUT_SECS",
    "MIGRATION_IMAGE_TIMEOUT_SECS",
    "PRODUCT_IMAGES_BUCKET",
    "CATEGORY_IMAGES_BUCKET",
    "STORAGE_CACHE_CONTROL",
];

/// Values shipped in the `.env` template. Running against them would hit
/// somebody else's project or nothing at all.
const PLACEHOLDER_MARKERS: [&str; 3] = ["XXXXXXXX", "REMPLACER", "REPLACE_ME"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {key}")]
    Missing { key: &'static str },

    #[error("{key} still holds a placeholder value; fill in the .env file")]
    Placeholder { key: &'static str },

    #[error("{key} must be an http(s) URL, got '{value}'")]
    InvalidUrl { key: &'static str, value: String },
}

/// One Supabase project: base URL (no trailing slash) and the API key used
/// for both PostgREST and Storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source: BackendConfig,
    pub destination: BackendConfig,
    pub page_size: usize,
    pub http_timeout: Duration,
    pub image_timeout: Duration,
    pub product_bucket: String,
    pub category_bucket: String,
    /// Max-age in seconds sent with every uploaded object.
    pub cache_control: String,
}

impl MigrationConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 1000;
    /// PostgREST's default `max-rows`; larger pages come back short and
    /// would end paging early.
    pub const MAX_PAGE_SIZE: usize = 1000;

    /// Build from the process environment (after `.env` loading).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_opt)
    }

    /// Build from an arbitrary key lookup; the environment in production,
    /// a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = BackendConfig {
            base_url: required_url(&lookup, OLD_URL_KEY)?,
            api_key: required(&lookup, OLD_KEY_KEY)?,
        };
        let destination = BackendConfig {
            base_url: required_url(&lookup, NEW_URL_KEY)?,
            api_key: required(&lookup, NEW_KEY_KEY)?,
        };

        let parse_or = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        let text_or = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            source,
            destination,
            page_size: (parse_or("MIGRATION_PAGE_SIZE", Self::DEFAULT_PAGE_SIZE as u64) as usize)
                .min(Self::MAX_PAGE_SIZE),
            http_timeout: Duration::from_secs(parse_or("MIGRATION_HTTP_TIMEOUT_SECS", 30)),
            image_timeout: Duration::from_secs(parse_or("MIGRATION_IMAGE_TIMEOUT_SECS", 30)),
            product_bucket: text_or("PRODUCT_IMAGES_BUCKET", "product-images"),
            category_bucket: text_or("CATEGORY_IMAGES_BUCKET", "category-images"),
            cache_control: text_or("STORAGE_CACHE_CONTROL", "3600"),
        })
    }

    /// Page size override from the CLI; zero keeps the configured value,
    /// anything above `MAX_PAGE_SIZE` is capped.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        if let Some(size) = page_size.filter(|s| *s > 0) {
            self.page_size = size.min(Self::MAX_PAGE_SIZE);
        }
        self
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing { key })?;
    if is_placeholder(&value) {
        return Err(ConfigError::Placeholder { key });
    }
    Ok(value)
}

fn required_url<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = required(lookup, key)?;
    let parsed = url::Url::parse(&value).map_err(|_| ConfigError::InvalidUrl {
        key,
        value: value.clone(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl { key, value });
    }
    Ok(value.trim_end_matches('/').to_string())
}

pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER_MARKERS.iter().any(|m| value.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    fn valid_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            (OLD_URL_KEY, "https://old.supabase.co/"),
            (OLD_KEY_KEY, "old-anon-key"),
            (NEW_URL_KEY, "https://new.supabase.co"),
            (NEW_KEY_KEY, "new-service-key"),
        ]
    }

    #[test]
    fn loads_required_and_defaults() {
        let cfg = MigrationConfig::from_lookup(lookup_from(&valid_pairs())).unwrap();
        assert_eq!(cfg.source.base_url, "https://old.supabase.co");
        assert_eq!(cfg.destination.api_key, "new-service-key");
        assert_eq!(cfg.page_size, 1000);
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.product_bucket, "product-images");
        assert_eq!(cfg.category_bucket, "category-images");
        assert_eq!(cfg.cache_control, "3600");
    }

    #[test]
    fn refuses_placeholder_values() {
        let mut pairs = valid_pairs();
        pairs[0] = (OLD_URL_KEY, "https://XXXXXXXX.supabase.co");
        let err = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Placeholder { key: OLD_URL_KEY });

        let mut pairs = valid_pairs();
        pairs[3] = (NEW_KEY_KEY, "REMPLACER_PAR_LA_CLE");
        let err = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Placeholder { key: NEW_KEY_KEY });
    }

    #[test]
    fn missing_and_blank_values_are_fatal() {
        let pairs: Vec<_> = valid_pairs().into_iter().skip(1).collect();
        let err = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing { key: OLD_URL_KEY });

        let mut pairs = valid_pairs();
        pairs[1] = (OLD_KEY_KEY, "   ");
        let err = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing { key: OLD_KEY_KEY });
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut pairs = valid_pairs();
        pairs[2] = (NEW_URL_KEY, "postgres://db.example.com");
        let err = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { key: NEW_URL_KEY, .. }));
    }

    #[test]
    fn optional_overrides_and_cli_page_size() {
        let mut pairs = valid_pairs();
        pairs.push(("MIGRATION_PAGE_SIZE", "250"));
        pairs.push(("PRODUCT_IMAGES_BUCKET", "catalog"));
        pairs.push(("MIGRATION_IMAGE_TIMEOUT_SECS", "0"));
        let cfg = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(cfg.page_size, 250);
        assert_eq!(cfg.product_bucket, "catalog");
        assert_eq!(cfg.image_timeout, Duration::from_secs(30));

        let cfg = cfg.with_page_size(Some(0)).with_page_size(Some(50));
        assert_eq!(cfg.page_size, 50);
    }

    #[test]
    fn page_size_is_capped_at_the_server_row_limit() {
        let mut pairs = valid_pairs();
        pairs.push(("MIGRATION_PAGE_SIZE", "5000"));
        let cfg = MigrationConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(cfg.page_size, MigrationConfig::MAX_PAGE_SIZE);

        let cfg = cfg.with_page_size(Some(250)).with_page_size(Some(2000));
        assert_eq!(cfg.page_size, 1000);
    }
}
