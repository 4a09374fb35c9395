//! Data models for comicpress
//!
//! Defines the editable page model: Page, Panel and Bubble.
//! Coordinates are percentages of the page (0-100). The model is treated as
//! an immutable snapshot: edits produce a new value instead of mutating the
//! one held by the session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backend identifier of a page
pub type PageId = u64;

/// Backend identifier of a project
pub type ProjectId = u64;

/// Default values applied when a field is missing
pub mod defaults {
    pub const FONT_SIZE: f64 = 16.0;
    pub const FONT_FAMILY: &str = "Comic Sans MS";
    pub const TEXT_COLOR: &str = "#000000";
    pub const BUBBLE_BACKGROUND: &str = "#FFFFFF";
    pub const BORDER_COLOR: &str = "#000000";
    pub const BORDER_WIDTH: f64 = 2.0;
    pub const BUBBLE_WIDTH: f64 = 25.0;
    pub const BUBBLE_HEIGHT: f64 = 15.0;
    pub const PANEL_SIZE: f64 = 100.0;
    pub const PAGE_BACKGROUND: &str = "#FFFFFF";

    /// Space between template panels and around the page edge
    pub const GUTTER: f64 = 2.0;
}

/// Panel arrangement of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    Single,
    DoubleHorizontal,
    DoubleVertical,
    Triple,
    Quad,
    Custom,
}

impl Layout {
    pub const ALL: [Layout; 6] = [
        Layout::Single,
        Layout::DoubleHorizontal,
        Layout::DoubleVertical,
        Layout::Triple,
        Layout::Quad,
        Layout::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Single => "single",
            Layout::DoubleHorizontal => "double-horizontal",
            Layout::DoubleVertical => "double-vertical",
            Layout::Triple => "triple",
            Layout::Quad => "quad",
            Layout::Custom => "custom",
        }
    }

    /// Panel boxes `(x, y, width, height)` for this layout
    ///
    /// `Custom` has no template; its panels are placed by hand.
    pub fn template(&self) -> Vec<(f64, f64, f64, f64)> {
        let g = defaults::GUTTER;
        let full = 100.0 - 2.0 * g;
        let half = (100.0 - 3.0 * g) / 2.0;
        let second = 2.0 * g + half;

        match self {
            Layout::Single => vec![(g, g, full, full)],
            Layout::DoubleHorizontal => vec![(g, g, half, full), (second, g, half, full)],
            Layout::DoubleVertical => vec![(g, g, full, half), (g, second, full, half)],
            Layout::Triple => vec![
                (g, g, full, half),
                (g, second, half, half),
                (second, second, half, half),
            ],
            Layout::Quad => vec![
                (g, g, half, half),
                (second, g, half, half),
                (g, second, half, half),
                (second, second, half, half),
            ],
            Layout::Custom => Vec::new(),
        }
    }

    /// Fresh, empty panels following the layout template
    pub fn template_panels(&self) -> Vec<Panel> {
        self.template()
            .into_iter()
            .map(|(x, y, width, height)| Panel::new(x, y, width, height))
            .collect()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layout::ALL
            .into_iter()
            .find(|layout| layout.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Unknown layout '{}'. Valid layouts: single, double-horizontal, \
                     double-vertical, triple, quad, custom",
                    s
                )
            })
    }
}

/// A comic page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: PageId,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default = "default_page_background")]
    pub background_color: String,
    #[serde(default)]
    pub panels: Vec<Panel>,
}

impl Page {
    /// Create an empty page
    pub fn new(id: PageId, layout: Layout) -> Self {
        Self {
            id,
            layout,
            background_color: defaults::PAGE_BACKGROUND.to_string(),
            panels: Vec::new(),
        }
    }

    /// Create a page populated with the layout's template panels
    pub fn with_layout(id: PageId, layout: Layout) -> Self {
        Self {
            panels: layout.template_panels(),
            ..Self::new(id, layout)
        }
    }

    /// Return a copy with `panel` appended
    pub fn with_panel(&self, panel: Panel) -> Self {
        let mut next = self.clone();
        next.panels.push(panel);
        next
    }

    /// Return a copy with the panel of the same id replaced
    ///
    /// Unknown ids leave the page unchanged.
    pub fn replace_panel(&self, panel: Panel) -> Self {
        let mut next = self.clone();
        if let Some(slot) = next.panels.iter_mut().find(|p| p.id == panel.id) {
            *slot = panel;
        }
        next
    }

    /// Total number of bubbles across all panels
    pub fn bubble_count(&self) -> usize {
        self.panels.iter().map(|p| p.bubbles.len()).sum()
    }
}

fn default_page_background() -> String {
    defaults::PAGE_BACKGROUND.to_string()
}

/// Offset of a panel image inside its frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePosition {
    pub x: f64,
    pub y: f64,
}

/// A rectangular image region of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub id: String,
    /// Image shown in the panel; may be empty
    #[serde(default)]
    pub image_url: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub bubbles: Vec<Bubble>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_position: Option<ImagePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_scale: Option<f64>,
    #[serde(default)]
    pub is_custom: bool,
}

impl Panel {
    /// Create an empty panel with a random id
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), x, y, width, height)
    }

    /// Create an empty panel with a specific id (for loading from storage)
    pub fn with_id(id: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            image_url: String::new(),
            x,
            y,
            width,
            height,
            rotation: 0.0,
            bubbles: Vec::new(),
            image_position: None,
            image_scale: None,
            is_custom: false,
        }
    }

    /// Return a copy with `bubble` appended
    pub fn with_bubble(&self, bubble: Bubble) -> Self {
        let mut next = self.clone();
        next.bubbles.push(bubble);
        next
    }

    /// Whether a page point lies inside the panel's box (edges included)
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Kind of text overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleType {
    #[default]
    Speech,
    Thought,
    Narration,
    Shout,
    Whisper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl TextAlign {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }

    /// Parse a CSS-style alignment, falling back to center
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => TextAlign::Left,
            "right" => TextAlign::Right,
            _ => TextAlign::Center,
        }
    }
}

/// A text overlay owned by one panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bubble {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BubbleType,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub font_family: String,
    pub text_align: TextAlign,
    pub color: String,
    pub background_color: String,
    pub border_color: String,
    pub border_width: f64,
}

impl Bubble {
    /// Create a bubble at a page position with default styling
    pub fn new(kind: BubbleType, text: impl Into<String>, x: f64, y: f64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind, text, x, y)
    }

    /// Create a bubble with a specific id (for loading from storage)
    pub fn with_id(
        id: impl Into<String>,
        kind: BubbleType,
        text: impl Into<String>,
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            x,
            y,
            width: defaults::BUBBLE_WIDTH,
            height: defaults::BUBBLE_HEIGHT,
            font_size: defaults::FONT_SIZE,
            font_family: defaults::FONT_FAMILY.to_string(),
            text_align: TextAlign::Center,
            color: defaults::TEXT_COLOR.to_string(),
            background_color: defaults::BUBBLE_BACKGROUND.to_string(),
            border_color: defaults::BORDER_COLOR.to_string(),
            border_width: defaults::BORDER_WIDTH,
        }
    }
}
