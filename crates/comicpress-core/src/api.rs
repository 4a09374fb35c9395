//! Backend API client
//!
//! `ComicApi` is the seam between the editing session / export pipeline and
//! the backend. `HttpComicApi` talks to the real service over HTTP;
//! `MemoryApi` keeps everything in memory for offline use and tests.
//!
//! ## Endpoints
//!
//! - `POST {api}/projects/{project}/pages/{page}/save/`: `{elements, is_thumbnail?, revision?}`
//! - `GET  {api}/projects/{project}/pages/{page}/`: page record with `elements`
//! - `POST {api}/projects/{project}/export/`: `{export_format}` → `{exported_url}`

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::ApiError;
use crate::export::ExportFormat;
use crate::models::{PageId, ProjectId};
use crate::wire::{
    ExportRecord, ExportRequest, PageRecord, PersistedElement, SavePageRequest, SavePageResponse,
};

/// Operations the core needs from the backend
#[async_trait]
pub trait ComicApi: Send + Sync {
    /// Persist the elements of one page
    async fn save_page(
        &self,
        project: ProjectId,
        page: PageId,
        request: &SavePageRequest,
    ) -> Result<SavePageResponse, ApiError>;

    /// Fetch the stored record of one page
    async fn load_page(&self, project: ProjectId, page: PageId) -> Result<PageRecord, ApiError>;

    /// Register (and, for remote exports, render) a project export
    async fn export_project(
        &self,
        project: ProjectId,
        format: ExportFormat,
    ) -> Result<ExportRecord, ApiError>;

    /// Download a file the backend produced
    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// HTTP implementation of [`ComicApi`]
#[derive(Debug, Clone)]
pub struct HttpComicApi {
    base_url: Url,
    client: Client,
}

impl HttpComicApi {
    /// Create a client for the API rooted at `base_url`
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, ApiError> {
        // A trailing slash makes relative joins append instead of replace
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| ApiError::Transport {
            url: base_url.to_string(),
            message: format!("invalid API URL: {}", e),
        })?;

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                ApiError::Transport {
                    url: base_url.to_string(),
                    message: format!("invalid API token: {}", e),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("comicpress/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::from_reqwest(e, base_url.as_str()))?;

        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.api_url,
            config.api_token.as_deref(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn page_url(&self, project: ProjectId, page: PageId) -> String {
        format!("{}projects/{}/pages/{}/", self.base_url, project, page)
    }

    fn export_url(&self, project: ProjectId) -> String {
        format!("{}projects/{}/export/", self.base_url, project)
    }

    /// Resolve a possibly relative URL returned by the backend
    pub fn resolve_url(&self, url: &str) -> String {
        match Url::parse(url) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => self
                .base_url
                .join(url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.to_string()),
        }
    }

    async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, url))?;
        read_json(response, url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, url))?;
        read_json(response, url).await
    }
}

async fn read_body(response: reqwest::Response, url: &str) -> Result<Vec<u8>, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(url, status.as_u16(), body));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::from_reqwest(e, url))?;
    Ok(bytes.to_vec())
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, ApiError> {
    let bytes = read_body(response, url).await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidResponse {
        url: url.to_string(),
        details: e.to_string(),
    })
}

#[async_trait]
impl ComicApi for HttpComicApi {
    async fn save_page(
        &self,
        project: ProjectId,
        page: PageId,
        request: &SavePageRequest,
    ) -> Result<SavePageResponse, ApiError> {
        let url = format!("{}save/", self.page_url(project, page));
        self.post_json(&url, request).await
    }

    async fn load_page(&self, project: ProjectId, page: PageId) -> Result<PageRecord, ApiError> {
        let url = self.page_url(project, page);
        self.get_json(&url).await
    }

    async fn export_project(
        &self,
        project: ProjectId,
        format: ExportFormat,
    ) -> Result<ExportRecord, ApiError> {
        let url = self.export_url(project);
        let request = ExportRequest {
            export_format: format.to_string(),
        };
        self.post_json(&url, &request).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.resolve_url(url);
        debug!("GET {} (download)", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, &url))?;
        read_body(response, &url).await
    }
}

/// A call received by [`MemoryApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    SavePage {
        project: ProjectId,
        page: PageId,
        revision: Option<u64>,
    },
    LoadPage {
        project: ProjectId,
        page: PageId,
    },
    Export {
        project: ProjectId,
        format: ExportFormat,
    },
    Download {
        url: String,
    },
}

#[derive(Debug, Default)]
struct StoredPage {
    elements: Vec<PersistedElement>,
    revision: Option<u64>,
}

/// In-memory backend
///
/// Stores pages per project, records every call, and can be told to fail
/// or to delay saves. A save carrying an older revision than the stored one
/// is acknowledged but not applied.
#[derive(Debug, Default)]
pub struct MemoryApi {
    pages: Mutex<HashMap<(ProjectId, PageId), StoredPage>>,
    calls: Mutex<Vec<ApiCall>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    export_url: Mutex<Option<String>>,
    save_delays: Mutex<VecDeque<Duration>>,
    failure: Mutex<Option<String>>,
    export_failure: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored page
    pub fn insert_page(&self, project: ProjectId, page: PageId, elements: Vec<PersistedElement>) {
        lock(&self.pages).insert(
            (project, page),
            StoredPage {
                elements,
                revision: None,
            },
        );
    }

    /// Elements currently stored for a page
    pub fn stored_elements(&self, project: ProjectId, page: PageId) -> Option<Vec<PersistedElement>> {
        lock(&self.pages)
            .get(&(project, page))
            .map(|stored| stored.elements.clone())
    }

    /// Make every following call fail with a transport error (None to heal)
    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    /// Make only the export call fail
    pub fn set_export_failure(&self, message: Option<&str>) {
        *lock(&self.export_failure) = message.map(str::to_string);
    }

    /// Delay the next save by `delay`; queued delays apply in call order
    pub fn push_save_delay(&self, delay: Duration) {
        lock(&self.save_delays).push_back(delay);
    }

    /// URL returned by the export call, with the bytes served for it
    pub fn set_export_file(&self, url: &str, bytes: Vec<u8>) {
        *lock(&self.export_url) = Some(url.to_string());
        lock(&self.files).insert(url.to_string(), bytes);
    }

    /// Return `url` from the export call without serving a file
    pub fn set_export_url(&self, url: Option<&str>) {
        *lock(&self.export_url) = url.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    pub fn save_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, ApiCall::SavePage { .. }))
            .count()
    }

    fn record(&self, call: ApiCall) {
        lock(&self.calls).push(call);
    }

    fn check_failure(&self, url: &str) -> Result<(), ApiError> {
        match lock(&self.failure).clone() {
            Some(message) => Err(ApiError::Transport {
                url: url.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ComicApi for MemoryApi {
    async fn save_page(
        &self,
        project: ProjectId,
        page: PageId,
        request: &SavePageRequest,
    ) -> Result<SavePageResponse, ApiError> {
        self.record(ApiCall::SavePage {
            project,
            page,
            revision: request.revision,
        });

        let delay = lock(&self.save_delays).pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure(&format!("memory://projects/{}/pages/{}/save/", project, page))?;

        let mut pages = lock(&self.pages);
        let stored = pages.entry((project, page)).or_default();
        let stale = matches!(
            (stored.revision, request.revision),
            (Some(current), Some(incoming)) if incoming < current
        );
        if stale {
            return Ok(SavePageResponse {
                detail: "stale revision ignored".to_string(),
            });
        }

        stored.elements = request.elements.clone();
        stored.revision = request.revision.or(stored.revision);
        Ok(SavePageResponse {
            detail: "saved".to_string(),
        })
    }

    async fn load_page(&self, project: ProjectId, page: PageId) -> Result<PageRecord, ApiError> {
        self.record(ApiCall::LoadPage { project, page });
        let url = format!("memory://projects/{}/pages/{}/", project, page);
        self.check_failure(&url)?;

        match lock(&self.pages).get(&(project, page)) {
            Some(stored) => Ok(PageRecord {
                id: page,
                page_number: None,
                layout: None,
                elements: stored.elements.clone(),
            }),
            None => Err(ApiError::NotFound { url }),
        }
    }

    async fn export_project(
        &self,
        project: ProjectId,
        format: ExportFormat,
    ) -> Result<ExportRecord, ApiError> {
        self.record(ApiCall::Export { project, format });
        let url = format!("memory://projects/{}/export/", project);
        self.check_failure(&url)?;

        if let Some(message) = lock(&self.export_failure).clone() {
            return Err(ApiError::from_status(url, 500, message));
        }

        Ok(ExportRecord {
            id: Some(1),
            export_format: Some(format.to_string()),
            exported_url: lock(&self.export_url).clone(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.record(ApiCall::Download {
            url: url.to_string(),
        });
        self.check_failure(url)?;

        lock(&self.files)
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                url: url.to_string(),
            })
    }
}
