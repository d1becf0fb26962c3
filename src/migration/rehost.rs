//! Image rehosting: download from the old location, upload into a bucket
//! of the new project, hand back the public URL.
//!
//! Nothing here is fatal. An unusable URL, a failed download or a refused
//! upload all come back as `None` and the caller counts it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::database_ops::supabase::build_http;
use crate::database_ops::{ObjectStorage, UploadOptions};

/// Extensions accepted from a URL path, with their MIME type.
const KNOWN_IMAGE_TYPES: [(&str, &str); 7] = [
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
];

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const DEFAULT_EXT: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    /// Raw `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Plain `reqwest` GET with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http(timeout)?,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {url}: HTTP {status}");
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Canned responses keyed by URL; anything else is a 404. Backs offline
/// runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticImageFetcher {
    images: HashMap<String, FetchedImage>,
}

impl StaticImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, url: &str, content_type: Option<&str>, bytes: &'static [u8]) -> Self {
        self.images.insert(
            url.to_string(),
            FetchedImage {
                bytes: Bytes::from_static(bytes),
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl ImageFetcher for StaticImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        match self.images.get(url) {
            Some(img) => Ok(img.clone()),
            None => bail!("GET {url}: HTTP 404 Not Found"),
        }
    }
}

/// `//host/x` becomes `https://host/x`; anything that is not an absolute
/// http(s) URL is rejected.
pub fn normalize_source_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let candidate = if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    };
    let parsed = Url::parse(&candidate).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(candidate)
}

fn ext_for_mime(mime: &str) -> Option<&'static str> {
    KNOWN_IMAGE_TYPES
        .iter()
        .find(|(_, m)| *m == mime)
        .map(|(ext, _)| *ext)
}

fn mime_for_ext(ext: &str) -> Option<&'static str> {
    KNOWN_IMAGE_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Known extension of the URL path, lower-cased.
fn url_extension(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_IMAGE_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(e, _)| *e)
}

/// Content type and file extension for a download. The header wins, then
/// the URL's extension, then JPEG.
pub fn infer_content_type(header: Option<&str>, url: &str) -> (String, &'static str) {
    let mime = header
        .and_then(|h| h.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty());
    let from_url = url_extension(url);
    let ext = mime
        .as_deref()
        .and_then(ext_for_mime)
        .or(from_url)
        .unwrap_or(DEFAULT_EXT);
    let content_type = mime.unwrap_or_else(|| {
        from_url
            .and_then(mime_for_ext)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    });
    (content_type, ext)
}

/// `{unix_ts}-{md5(url)[..8]}.{ext}`
pub fn storage_filename(source_url: &str, unix_ts: i64, ext: &str) -> String {
    let digest = format!("{:x}", Md5::digest(source_url.as_bytes()));
    format!("{unix_ts}-{}.{ext}", &digest[..8])
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct AssetRehoster {
    fetcher: Arc<dyn ImageFetcher>,
    storage: Arc<dyn ObjectStorage>,
    cache_control: String,
    clock: Clock,
}

impl AssetRehoster {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        storage: Arc<dyn ObjectStorage>,
        cache_control: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            storage,
            cache_control: cache_control.into(),
            clock: Box::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Replace the wall clock used to salt filenames.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Copy `source_url` into `bucket` under `path_prefix`; the new public
    /// URL, or `None` when the image could not be moved.
    pub async fn rehost(&self, source_url: &str, bucket: &str, path_prefix: &str) -> Option<String> {
        let Some(url) = normalize_source_url(source_url) else {
            debug!(target = "migration", source_url, "image url unusable; skipped");
            return None;
        };
        match self.transfer(&url, bucket, path_prefix).await {
            Ok(public_url) => Some(public_url),
            Err(e) => {
                let error = format!("{e:#}");
                warn!(target = "migration", source_url = %url, bucket, error = %error, "image rehost failed");
                None
            }
        }
    }

    async fn transfer(&self, url: &str, bucket: &str, path_prefix: &str) -> Result<String> {
        let image = self.fetcher.fetch(url).await?;
        let (content_type, ext) = infer_content_type(image.content_type.as_deref(), url);
        let filename = storage_filename(url, (self.clock)(), ext);
        let prefix = path_prefix.trim_matches('/');
        let path = if prefix.is_empty() {
            filename
        } else {
            format!("{prefix}/{filename}")
        };
        let options = UploadOptions {
            content_type,
            cache_control: self.cache_control.clone(),
            upsert: true,
        };
        self.storage
            .upload(bucket, &path, image.bytes, &options)
            .await?;
        debug!(target = "migration", bucket, path = %path, "image rehosted");
        Ok(self.storage.public_url(bucket, &path))
    }
}
