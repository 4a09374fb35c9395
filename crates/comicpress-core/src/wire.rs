//! Backend wire format
//!
//! The backend stores a page as a flat list of elements ordered by
//! `layer_index`. These types mirror its JSON shape exactly; optional
//! fields are omitted rather than sent as `null`.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::models::{Layout, PageId};

/// Element kind as stored by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Panel,
    SpeechBubble,
    Text,
}

impl ElementType {
    pub fn is_bubble(&self) -> bool {
        matches!(self, ElementType::SpeechBubble | ElementType::Text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Text styling of a bubble element; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
}

/// One persisted element of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementType,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub layer_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ElementStyle>,
}

/// Body of the page save call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePageRequest {
    pub elements: Vec<PersistedElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_thumbnail: Option<bool>,
    /// Client write sequence for this page; lets the backend drop stale writes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

/// Response of the page save call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavePageResponse {
    #[serde(default)]
    pub detail: String,
}

/// Page record returned by the load call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: PageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, deserialize_with = "skip_unreadable_elements")]
    pub elements: Vec<PersistedElement>,
}

/// Keep every element that parses; log and drop the rest
fn skip_unreadable_elements<'de, D>(deserializer: D) -> Result<Vec<PersistedElement>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match PersistedElement::deserialize(&value) {
            Ok(element) => Some(element),
            Err(e) => {
                warn!("Skipping unreadable element {}: {}", value, e);
                None
            }
        })
        .collect())
}

/// Body of the project export call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub export_format: String,
}

/// Export record returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_url: Option<String>,
}
