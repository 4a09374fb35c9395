//! Panel image resolution
//!
//! Renderers are synchronous and deterministic, so every panel image is
//! fetched and decoded up front into an [`ImageCache`] keyed by URL.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::Page;

/// Decoded panel images keyed by their URL
pub type ImageCache = HashMap<String, DynamicImage>;

/// Where panel image bytes come from
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// Fetches `http(s)` URLs with reqwest and reads anything else from disk
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("comicpress/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::from_reqwest(e, "image client"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ApiError::from_reqwest(e, url))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::from_status(url, status.as_u16(), ""));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError::from_reqwest(e, url))?;
            return Ok(bytes.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound {
                url: url.to_string(),
            },
            _ => ApiError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            },
        })
    }
}

/// Resolves nothing; every panel renders as a placeholder
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImages;

#[async_trait]
impl ImageSource for NoImages {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        Err(ApiError::NotFound {
            url: url.to_string(),
        })
    }
}

/// Serves preloaded bytes by URL
#[derive(Debug, Clone, Default)]
pub struct StaticImages {
    files: HashMap<String, Vec<u8>>,
}

impl StaticImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.insert(url.into(), bytes);
        self
    }
}

#[async_trait]
impl ImageSource for StaticImages {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.files.get(url).cloned().ok_or_else(|| ApiError::NotFound {
            url: url.to_string(),
        })
    }
}

/// Distinct non-empty image URLs across `pages`, in sorted order
pub fn image_urls(pages: &[Page]) -> BTreeSet<String> {
    pages
        .iter()
        .flat_map(|page| page.panels.iter())
        .filter(|panel| !panel.image_url.is_empty())
        .map(|panel| panel.image_url.clone())
        .collect()
}

/// Number of image fetches kept in flight at once
const CONCURRENT_FETCHES: usize = 4;

/// Fetch and decode every panel image
///
/// Images that cannot be fetched or decoded are skipped with a warning and
/// the panel falls back to a placeholder.
pub async fn resolve_images(pages: &[Page], source: &dyn ImageSource) -> ImageCache {
    let fetched: Vec<(String, Result<Vec<u8>, ApiError>)> = stream::iter(image_urls(pages))
        .map(move |url| async move {
            let bytes = source.fetch(&url).await;
            (url, bytes)
        })
        .buffered(CONCURRENT_FETCHES)
        .collect()
        .await;

    let mut cache = ImageCache::new();
    for (url, bytes) in fetched {
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Panel image unavailable, using placeholder: {}", e);
                continue;
            }
        };

        match image::load_from_memory(&bytes) {
            Ok(decoded) => {
                debug!(
                    "Resolved panel image {} ({}x{})",
                    url,
                    decoded.width(),
                    decoded.height()
                );
                cache.insert(url, decoded);
            }
            Err(e) => warn!("Panel image {} could not be decoded: {}", url, e),
        }
    }

    cache
}
