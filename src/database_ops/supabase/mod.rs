//! Supabase HTTP clients: PostgREST for tables, Storage for objects.

use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, RequestBuilder};

pub mod rest;
pub mod storage;

pub use rest::SupabaseRest;
pub use storage::SupabaseStorage;

const USER_AGENT: &str = concat!("catalog-migrate/", env!("CARGO_PKG_VERSION"));

pub(crate) fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

pub(crate) fn build_http(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Both Supabase APIs want the key twice: as `apikey` and as a bearer token.
pub(crate) fn with_auth(req: RequestBuilder, api_key: &str) -> RequestBuilder {
    req.header("apikey", api_key)
        .header("Authorization", format!("Bearer {api_key}"))
}
