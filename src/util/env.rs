//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in the binary (or rely on lazy Once).
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Load `.env` exactly once. The working directory wins; the crate root is
/// tried as a fallback so `cargo run` from elsewhere still picks it up.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Mask credentials before they reach a log line. Base URLs are kept so an
/// operator can tell which projects a run points at.
pub fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    let val_trim = val.trim();
    if val_trim.is_empty() {
        return String::new();
    }
    if k.contains("KEY") || k.contains("SECRET") || k.contains("TOKEN") || k.contains("PASSWORD")
    {
        let tail: String = val_trim
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return if val_trim.chars().count() > 12 {
            format!("***{tail}")
        } else {
            "***".to_string()
        };
    }

    // Strip userinfo in case a URL embeds credentials.
    if let Ok(mut u) = url::Url::parse(val_trim) {
        if !u.username().is_empty() || u.password().is_some() {
            let _ = u.set_username("***");
            let _ = u.set_password(None);
            return u.to_string();
        }
    }
    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = required
        .iter()
        .chain(also_log.iter())
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_keys_but_keeps_tail() {
        let out = redact_value("NEW_SUPABASE_SERVICE_KEY", "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.abcd");
        assert_eq!(out, "***abcd");
        assert_eq!(redact_value("OLD_SUPABASE_KEY", "short"), "***");
    }

    #[test]
    fn keeps_plain_urls_and_masks_userinfo() {
        assert_eq!(
            redact_value("OLD_SUPABASE_URL", "https://abc.supabase.co"),
            "https://abc.supabase.co"
        );
        let masked = redact_value("NEW_SUPABASE_URL", "https://user:pw@abc.supabase.co/");
        assert!(!masked.contains("pw"));
        assert!(masked.contains("abc.supabase.co"));
    }

    #[test]
    fn empty_values_stay_empty() {
        assert_eq!(redact_value("OLD_SUPABASE_KEY", "   "), "");
    }

    #[test]
    fn preflight_fails_on_missing_required_key() {
        let key = "CATALOG_MIGRATE_NEVER_SET_KEY";
        let err = preflight_check("test", &[key], &[]).unwrap_err();
        assert!(err.to_string().contains(key));
        assert!(preflight_check("test", &[], &[key]).is_ok());
    }
}
