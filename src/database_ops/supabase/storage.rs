use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{build_http, truncate_for_log, with_auth};
use crate::config::BackendConfig;
use crate::database_ops::{ObjectStorage, StorageEntry, UploadOptions};

/// Supabase Storage client.
///
/// - POST   /storage/v1/object/{bucket}/{path}      upload (x-upsert)
/// - POST   /storage/v1/object/list/{bucket}         list one level
/// - DELETE /storage/v1/object/{bucket}              remove {"prefixes": [...]}
/// - public objects live at /storage/v1/object/public/{bucket}/{path}
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base_url: String,
    api_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    id: Option<String>,
}

/// Percent-encode each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl SupabaseStorage {
    pub fn new(backend: &BackendConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            api_key: backend.api_key.clone(),
            http: build_http(timeout)?,
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_path(path)
        )
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<()> {
        let url = self.object_url(bucket, path);
        let resp = with_auth(self.http.post(&url), &self.api_key)
            .header("Content-Type", options.content_type.as_str())
            .header("cache-control", format!("max-age={}", options.cache_control))
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("upload {bucket}/{path}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 1000);
            return Err(anyhow!("upload {bucket}/{path} failed: {status} body={body}"));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            urlencoding::encode(bucket),
            encode_path(path)
        )
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageEntry>> {
        const LIST_LIMIT: usize = 1000;
        let url = format!(
            "{}/storage/v1/object/list/{}",
            self.base_url,
            urlencoding::encode(bucket)
        );
        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let body = json!({
                "prefix": prefix.trim_matches('/'),
                "limit": LIST_LIMIT,
                "offset": offset,
                "sortBy": {"column": "name", "order": "asc"},
            });
            let resp = with_auth(self.http.post(&url), &self.api_key)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("list {bucket}/{prefix}"))?;
            let status = resp.status();
            if !status.is_success() {
                let body = truncate_for_log(resp.text().await.unwrap_or_default(), 1000);
                return Err(anyhow!("list {bucket}/{prefix} failed: {status} body={body}"));
            }
            let page: Vec<ListedObject> = resp.json().await?;
            let fetched = page.len();
            out.extend(page.into_iter().map(|o| StorageEntry {
                is_folder: o.id.is_none(),
                name: o.name,
            }));
            if fetched < LIST_LIMIT {
                break;
            }
            offset += LIST_LIMIT;
        }
        Ok(out)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/storage/v1/object/{}",
            self.base_url,
            urlencoding::encode(bucket)
        );
        let resp = with_auth(self.http.delete(&url), &self.api_key)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .with_context(|| format!("remove {} objects from {bucket}", paths.len()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 1000);
            return Err(anyhow!("remove from {bucket} failed: {status} body={body}"));
        }
        Ok(())
    }
}
