//! Export pipeline
//!
//! Turns an ordered list of pages into a single downloadable file.
//!
//! A run moves through `Idle → Rendering → Requesting → Success` when the
//! file is rendered locally, or `Idle → Requesting → Downloading → Success`
//! when the backend renders it. Any failure moves to `Error`, clears the
//! progress and records the message. There is no resume: the next call to
//! [`Exporter::export_comic`] starts again from `Idle`.

pub mod archive;
pub mod delivery;
pub mod epub;
pub mod images;
pub mod pdf;
pub mod raster;
pub mod text;
mod xml;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::ComicApi;
use crate::config::Config;
use crate::error::{ExportError, RenderError};
use crate::models::{Page, ProjectId};

pub use archive::ArchiveRenderer;
pub use delivery::{export_file_name, ExportResult};
pub use epub::EpubRenderer;
pub use images::{HttpImageSource, ImageCache, ImageSource, NoImages, StaticImages};
pub use pdf::PdfRenderer;

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Cbz,
    Cbr,
    Epub,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Pdf,
        ExportFormat::Cbz,
        ExportFormat::Cbr,
        ExportFormat::Epub,
    ];

    /// Wire name, also used as the file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Cbz => "cbz",
            ExportFormat::Cbr => "cbr",
            ExportFormat::Epub => "epub",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Cbz => "application/vnd.comicbook+zip",
            ExportFormat::Cbr => "application/vnd.comicbook-rar",
            ExportFormat::Epub => "application/epub+zip",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == lowered)
            .ok_or_else(|| {
                format!(
                    "Unknown export format '{}' (expected pdf, cbz, cbr or epub)",
                    s
                )
            })
    }
}

/// Which side produces the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportSource {
    /// Render here, then tell the backend about the export
    #[default]
    Local,
    /// Ask the backend to render and download what it returns
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub source: ExportSource,
    /// Canvas width in pixels for rendered pages
    pub page_width: u32,
    /// Canvas height in pixels for rendered pages
    pub page_height: u32,
    /// Document title; the project name when unset
    pub title: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            source: ExportSource::Local,
            page_width: 1200,
            page_height: 1800,
            title: None,
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_width: config.page_width,
            page_height: config.page_height,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: ExportSource) -> Self {
        self.source = source;
        self
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    Idle,
    Rendering,
    Requesting,
    Downloading,
    Success,
    Error,
}

/// Snapshot of the pipeline for progress display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportStatus {
    pub state: ExportState,
    /// Percentage, 0 to 100
    pub progress: u8,
    pub error: Option<String>,
}

impl ExportStatus {
    pub fn idle() -> Self {
        Self {
            state: ExportState::Idle,
            progress: 0,
            error: None,
        }
    }
}

/// Events emitted by the exporter
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    StatusChanged(ExportStatus),
    /// The backend could not be told about a local export
    NotificationFailed(String),
}

/// Everything a renderer needs, borrowed for the duration of one render
#[derive(Debug, Clone, Copy)]
pub struct RenderDocument<'a> {
    pub title: &'a str,
    pub pages: &'a [Page],
    pub images: &'a ImageCache,
    /// Canvas size in pixels
    pub width: u32,
    pub height: u32,
}

/// Turns a page list into the bytes of one file
///
/// Implementations must be deterministic: the same document always yields
/// the same bytes.
pub trait Renderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn render(&self, document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError>;
}

pub fn renderer_for(format: ExportFormat) -> Box<dyn Renderer> {
    match format {
        ExportFormat::Pdf => Box::new(PdfRenderer),
        ExportFormat::Cbz => Box::new(ArchiveRenderer::cbz()),
        ExportFormat::Cbr => Box::new(ArchiveRenderer::cbr()),
        ExportFormat::Epub => Box::new(EpubRenderer),
    }
}

pub fn render(format: ExportFormat, document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
    renderer_for(format).render(document)
}

/// Runs exports and publishes their progress
pub struct Exporter {
    api: Arc<dyn ComicApi>,
    images: Arc<dyn ImageSource>,
    status: watch::Sender<ExportStatus>,
    /// Kept so publishing never fails for lack of receivers
    status_rx: watch::Receiver<ExportStatus>,
    event_tx: mpsc::UnboundedSender<ExportEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<ExportEvent>>,
    running: AtomicBool,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Exporter {
    pub fn new(api: Arc<dyn ComicApi>, images: Arc<dyn ImageSource>) -> Self {
        let (status_tx, status_rx) = watch::channel(ExportStatus::idle());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            api,
            images,
            status: status_tx,
            status_rx,
            event_tx,
            event_rx: Some(event_rx),
            running: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> ExportStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportStatus> {
        self.status_rx.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ExportEvent>> {
        self.event_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Return to `Idle`, discarding any recorded error
    pub fn reset(&self) {
        self.publish(ExportStatus::idle());
    }

    /// Export `pages` of a project as one file
    ///
    /// Only one export runs at a time per exporter; a second call while one
    /// is in flight fails with [`ExportError::AlreadyRunning`] and leaves
    /// the running export untouched.
    pub async fn export_comic(
        &self,
        project_id: ProjectId,
        project_name: &str,
        pages: &[Page],
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportResult, ExportError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ExportError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        self.reset();
        info!(
            "Exporting project {} ({} pages) as {} [{:?}]",
            project_id,
            pages.len(),
            format,
            options.source
        );

        let result = match options.source {
            ExportSource::Local => {
                self.export_local(project_id, project_name, pages, format, options)
                    .await
            }
            ExportSource::Remote => self.export_remote(project_id, project_name, format).await,
        };

        match &result {
            Ok(exported) => {
                self.advance(ExportState::Success, 100);
                info!(
                    "Export ready: {} ({} bytes)",
                    exported.file_name,
                    exported.bytes.len()
                );
            }
            Err(e) => {
                warn!("Export of project {} failed: {}", project_id, e);
                self.publish(ExportStatus {
                    state: ExportState::Error,
                    progress: 0,
                    error: Some(e.to_string()),
                });
            }
        }

        result
    }

    async fn export_local(
        &self,
        project_id: ProjectId,
        project_name: &str,
        pages: &[Page],
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportResult, ExportError> {
        self.advance(ExportState::Rendering, 5);
        if pages.is_empty() {
            return Err(RenderError::NoPages.into());
        }

        let images = images::resolve_images(pages, self.images.as_ref()).await;
        debug!("Resolved {} panel images", images.len());
        self.advance(ExportState::Rendering, 30);

        let title = options
            .title
            .clone()
            .unwrap_or_else(|| project_name.to_string());
        let bytes = render_blocking(
            format,
            pages.to_vec(),
            images,
            title,
            options.page_width,
            options.page_height,
        )
        .await?;
        self.advance(ExportState::Requesting, 80);

        // The local file is authoritative; the backend only records the event
        let remote_url = match self.api.export_project(project_id, format).await {
            Ok(record) => record.exported_url,
            Err(e) => {
                warn!("Could not notify backend of export, keeping local file: {}", e);
                self.emit(ExportEvent::NotificationFailed(e.to_string()));
                None
            }
        };

        Ok(ExportResult::new(project_name, format, bytes, remote_url))
    }

    async fn export_remote(
        &self,
        project_id: ProjectId,
        project_name: &str,
        format: ExportFormat,
    ) -> Result<ExportResult, ExportError> {
        self.advance(ExportState::Requesting, 10);
        let record = self.api.export_project(project_id, format).await?;
        let url = record
            .exported_url
            .filter(|url| !url.is_empty())
            .ok_or(ExportError::MissingExportUrl)?;

        self.advance(ExportState::Downloading, 50);
        let bytes = self.api.download(&url).await?;

        Ok(ExportResult::new(project_name, format, bytes, Some(url)))
    }

    /// Move to `state`, never lowering progress within a run
    fn advance(&self, state: ExportState, progress: u8) {
        let current = self.status();
        self.publish(ExportStatus {
            state,
            progress: progress.max(current.progress).min(100),
            error: None,
        });
    }

    fn publish(&self, status: ExportStatus) {
        debug!("Export status: {:?} {}%", status.state, status.progress);
        self.status.send_replace(status.clone());
        self.emit(ExportEvent::StatusChanged(status));
    }

    fn emit(&self, event: ExportEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Render on the blocking pool; composition and compression are CPU bound
async fn render_blocking(
    format: ExportFormat,
    pages: Vec<Page>,
    images: ImageCache,
    title: String,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, RenderError> {
    tokio::task::spawn_blocking(move || {
        let document = RenderDocument {
            title: &title,
            pages: &pages,
            images: &images,
            width,
            height,
        };
        render(format, &document)
    })
    .await
    .map_err(|e| RenderError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiCall, MemoryApi};
    use crate::error::ApiError;
    use crate::models::{Bubble, BubbleType, Layout, Panel};
    use async_trait::async_trait;
    use std::time::Duration;

    fn pages() -> Vec<Page> {
        (1..=2)
            .map(|id| {
                let panel = Panel::with_id(format!("panel-{}", id), 5.0, 5.0, 90.0, 90.0)
                    .with_bubble(Bubble::with_id(
                        format!("bubble-{}", id),
                        BubbleType::Speech,
                        "Hello",
                        10.0,
                        10.0,
                    ));
                Page::new(id, Layout::Single).with_panel(panel)
            })
            .collect()
    }

    fn small() -> ExportOptions {
        ExportOptions {
            page_width: 40,
            page_height: 60,
            ..ExportOptions::default()
        }
    }

    fn exporter(api: Arc<MemoryApi>) -> Exporter {
        Exporter::new(api, Arc::new(NoImages))
    }

    #[test]
    fn test_format_names() {
        assert_eq!("CBZ".parse::<ExportFormat>().unwrap(), ExportFormat::Cbz);
        assert_eq!(ExportFormat::Epub.to_string(), "epub");
        assert_eq!(ExportFormat::Pdf.media_type(), "application/pdf");
        assert!("rar".parse::<ExportFormat>().is_err());
        assert_eq!(
            serde_json::to_string(&ExportFormat::Cbr).unwrap(),
            "\"cbr\""
        );
    }

    #[test]
    fn test_renderers_match_formats() {
        for format in ExportFormat::ALL {
            assert_eq!(renderer_for(format).format(), format);
        }
    }

    #[tokio::test]
    async fn test_local_export_records_backend_url() {
        let api = Arc::new(MemoryApi::new());
        api.set_export_url(Some("/media/exports/my.cbz"));
        let exporter = exporter(api.clone());

        let result = exporter
            .export_comic(7, "My Project", &pages(), ExportFormat::Cbz, &small())
            .await
            .unwrap();

        assert_eq!(result.file_name, "My_Project.cbz");
        assert_eq!(result.remote_url.as_deref(), Some("/media/exports/my.cbz"));
        assert!(!result.bytes.is_empty());
        assert_eq!(
            api.calls(),
            vec![ApiCall::Export {
                project: 7,
                format: ExportFormat::Cbz
            }]
        );

        let status = exporter.status();
        assert_eq!(status.state, ExportState::Success);
        assert_eq!(status.progress, 100);
    }

    #[tokio::test]
    async fn test_notification_failure_is_not_fatal() {
        let api = Arc::new(MemoryApi::new());
        api.set_export_failure(Some("boom"));
        let mut exporter = exporter(api);
        let mut events = exporter.take_events().unwrap();

        let result = exporter
            .export_comic(1, "Comic", &pages(), ExportFormat::Pdf, &small())
            .await
            .unwrap();

        assert!(result.bytes.starts_with(b"%PDF"));
        assert!(result.remote_url.is_none());
        assert_eq!(exporter.status().state, ExportState::Success);

        let mut notified = false;
        while let Ok(event) = events.try_recv() {
            if let ExportEvent::NotificationFailed(message) = event {
                assert!(message.contains("boom"));
                notified = true;
            }
        }
        assert!(notified);
    }

    #[tokio::test]
    async fn test_progress_never_decreases_within_a_run() {
        let api = Arc::new(MemoryApi::new());
        let mut exporter = exporter(api);
        let mut events = exporter.take_events().unwrap();

        exporter
            .export_comic(1, "Comic", &pages(), ExportFormat::Epub, &small())
            .await
            .unwrap();

        let mut states = Vec::new();
        let mut last = 0;
        while let Ok(ExportEvent::StatusChanged(status)) = events.try_recv() {
            assert!(status.progress >= last);
            last = status.progress;
            states.push(status.state);
        }
        states.dedup();
        assert_eq!(
            states,
            vec![
                ExportState::Idle,
                ExportState::Rendering,
                ExportState::Requesting,
                ExportState::Success
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_page_list_is_an_error() {
        let exporter = exporter(Arc::new(MemoryApi::new()));
        let err = exporter
            .export_comic(1, "Comic", &[], ExportFormat::Cbz, &small())
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Render(RenderError::NoPages)));
        let status = exporter.status();
        assert_eq!(status.state, ExportState::Error);
        assert_eq!(status.progress, 0);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn test_remote_export_downloads_backend_file() {
        let api = Arc::new(MemoryApi::new());
        api.set_export_file("memory://exports/1.epub", b"epub bytes".to_vec());
        let exporter = exporter(api.clone());
        let options = small().with_source(ExportSource::Remote);

        let result = exporter
            .export_comic(1, "Space  Opera", &pages(), ExportFormat::Epub, &options)
            .await
            .unwrap();

        assert_eq!(result.file_name, "Space__Opera.epub");
        assert_eq!(result.bytes, b"epub bytes");
        assert_eq!(result.remote_url.as_deref(), Some("memory://exports/1.epub"));
        assert!(api.calls().contains(&ApiCall::Download {
            url: "memory://exports/1.epub".to_string()
        }));
    }

    #[tokio::test]
    async fn test_remote_export_without_url_fails() {
        let api = Arc::new(MemoryApi::new());
        let exporter = exporter(api);
        let options = small().with_source(ExportSource::Remote);

        let err = exporter
            .export_comic(1, "Comic", &pages(), ExportFormat::Pdf, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingExportUrl));
        assert_eq!(exporter.status().progress, 0);

        // A failed export restarts from idle
        exporter.reset();
        assert_eq!(exporter.status(), ExportStatus::idle());
    }

    struct SlowImages;

    #[async_trait]
    impl ImageSource for SlowImages {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err(ApiError::NotFound {
                url: url.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_second_export_while_running_is_rejected() {
        let exporter = Arc::new(Exporter::new(
            Arc::new(MemoryApi::new()),
            Arc::new(SlowImages),
        ));
        let mut with_image = pages();
        with_image[0].panels[0].image_url = "slow.png".to_string();

        let first = {
            let exporter = exporter.clone();
            let pages = with_image.clone();
            tokio::spawn(async move {
                exporter
                    .export_comic(1, "Comic", &pages, ExportFormat::Cbz, &small())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(exporter.is_running());

        let second = exporter
            .export_comic(1, "Comic", &with_image, ExportFormat::Cbz, &small())
            .await;
        assert!(matches!(second, Err(ExportError::AlreadyRunning)));

        assert!(first.await.unwrap().is_ok());
        assert!(!exporter.is_running());
    }
}
