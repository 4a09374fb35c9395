//! Error types
//!
//! Typed errors for backend calls, page rendering, exports and the editing
//! session, with classification helpers and user-facing suggestions.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::PageId;

/// Errors from the backend API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request could not be delivered or the response not read
    #[error("Request to '{url}' failed: {message}")]
    Transport { url: String, message: String },

    /// Request timed out
    #[error("Request to '{url}' timed out")]
    Timeout { url: String },

    /// No record at this location (no remote state yet)
    #[error("Not found: '{url}'")]
    NotFound { url: String },

    /// Backend answered with a non-success status
    #[error("Backend returned {status} for '{url}': {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("Invalid response from '{url}': {details}")]
    InvalidResponse { url: String, details: String },
}

impl ApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let url = url.into();
        match status {
            404 => ApiError::NotFound { url },
            _ => ApiError::Status {
                url,
                status,
                body: body.into(),
            },
        }
    }

    /// Classify a transport error from the HTTP client
    pub fn from_reqwest(error: reqwest::Error, url: &str) -> Self {
        if error.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_decode() {
            ApiError::InvalidResponse {
                url: url.to_string(),
                details: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            ApiError::from_status(url, status.as_u16(), error.to_string())
        } else {
            ApiError::Transport {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Whether sending the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } | ApiError::Timeout { .. } => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::NotFound { .. } | ApiError::InvalidResponse { .. } => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ApiError::Transport { .. } => {
                Some("Check that the backend is running and api_url is correct.")
            }
            ApiError::Timeout { .. } => {
                Some("The backend is slow to respond. Try again or raise request_timeout_secs.")
            }
            ApiError::Status { status: 401, .. } | ApiError::Status { status: 403, .. } => {
                Some("Check api_token; the backend rejected the credentials.")
            }
            _ => None,
        }
    }
}

/// Errors raised while turning pages into a file
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Nothing to render: the page list is empty")]
    NoPages,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Failed to serialize page: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error while rendering: {0}")]
    Io(#[from] io::Error),

    #[error("Render task failed: {0}")]
    Task(String),
}

/// Errors that abort an export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Export request failed: {0}")]
    Api(#[from] ApiError),

    #[error("An export is already running")]
    AlreadyRunning,

    /// Remote export finished without a file to download
    #[error("The backend did not return a download URL for the export")]
    MissingExportUrl,

    #[error("Failed to write export to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from the editing session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Page index {index} is out of range (project has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    #[error("Page at index {index} is {expected}, not {found}")]
    PageIdMismatch {
        index: usize,
        expected: PageId,
        found: PageId,
    },

    #[error("Failed to serialize page: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}
