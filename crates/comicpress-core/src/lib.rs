//! comicpress core library
//!
//! Page model, persistence and export for comicpress, a tool for composing
//! comics out of image panels and text bubbles.
//!
//! # Architecture
//!
//! - **Model**: pages hold panels, panels hold bubbles; all geometry is in
//!   percentages of the page
//! - **Wire**: the backend stores a page as a flat list of elements ordered
//!   by `layer_index`; the serializer converts in both directions
//! - **Session**: saves only what changed, never drops an unsaved edit
//! - **Export**: renders pages to PDF, CBZ, CBR or EPUB
//!
//! # Quick Start
//!
//! ```text
//! let api = Arc::new(HttpComicApi::from_config(&config)?);
//! let session = EditorSession::new(api.clone(), project_id, pages);
//!
//! session.update_page(0, edited)?;
//! session.save_page(None).await;
//!
//! let exporter = Exporter::new(api, Arc::new(HttpImageSource::new(timeout)?));
//! let result = exporter
//!     .export_comic(project_id, "My Project", &session.pages(), ExportFormat::Cbz, &options)
//!     .await?;
//! result.save_to(&config.output_dir)?;
//! ```
//!
//! # Modules
//!
//! - `models`: pages, panels, bubbles and layouts
//! - `wire`: backend record types
//! - `serializer`: page model to and from persisted elements
//! - `session`: save/load orchestration
//! - `dirty`: copy-on-write set of unsaved pages
//! - `guard`: save-before-navigate guard
//! - `export`: rendering and packaging
//! - `api`: backend client
//! - `config`: application configuration

pub mod api;
pub mod config;
pub mod dirty;
pub mod error;
pub mod export;
pub mod guard;
pub mod models;
pub mod serializer;
pub mod session;
pub mod wire;

pub use api::{ComicApi, HttpComicApi, MemoryApi};
pub use config::Config;
pub use dirty::DirtySet;
pub use error::{ApiError, ExportError, RenderError, SessionError};
pub use export::{
    ExportFormat, ExportOptions, ExportResult, ExportSource, ExportState, ExportStatus, Exporter,
};
pub use guard::{NavigationGuard, NavigationOutcome};
pub use models::{Bubble, BubbleType, Layout, Page, PageId, Panel, ProjectId, TextAlign};
pub use serializer::{deserialize_page, serialize_page, OwnershipPolicy};
pub use session::{EditorSession, SaveOutcome};
pub use wire::PersistedElement;
