//! Conversion between the page model and the backend's flat element list
//!
//! Saving writes each panel followed immediately by its bubbles, numbering
//! `layer_index` across the whole page. The wire format has no parent
//! reference, so loading recovers bubble ownership from geometry: a bubble
//! belongs to a panel whose box contains the bubble's position.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{defaults, Bubble, BubbleType, Layout, Page, PageId, Panel, TextAlign};
use crate::wire::{ElementStyle, ElementType, PersistedElement, Position, Size};

/// Marker in a font family that identifies a shouted bubble
const BOLD_MARKER: &str = "bold";

/// How a bubble picks its owner when several panels contain it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Smallest containing panel wins; equal areas go to the earlier panel
    #[default]
    SmallestArea,
    /// First containing panel in layer order wins
    FirstMatch,
}

/// What was lost while rebuilding a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Ids of bubble elements outside every panel
    pub dropped_bubbles: Vec<String>,
}

impl LoadReport {
    pub fn is_lossless(&self) -> bool {
        self.dropped_bubbles.is_empty()
    }
}

/// Flatten a page into persisted elements
pub fn serialize_page(page: &Page) -> Vec<PersistedElement> {
    let mut elements = Vec::with_capacity(page.panels.len() + page.bubble_count());
    let mut layer_index = 0u32;

    for panel in &page.panels {
        elements.push(panel_element(panel, layer_index));
        layer_index += 1;

        for bubble in &panel.bubbles {
            elements.push(bubble_element(bubble, layer_index));
            layer_index += 1;
        }
    }

    elements
}

/// Rebuild a page using the default ownership policy
///
/// The page background is not persisted and comes back as the default.
pub fn deserialize_page(elements: &[PersistedElement], page_id: PageId, layout: Layout) -> Page {
    deserialize_page_with_report(elements, page_id, layout, OwnershipPolicy::default()).0
}

/// Rebuild a page and report bubbles that could not be placed
pub fn deserialize_page_with_report(
    elements: &[PersistedElement],
    page_id: PageId,
    layout: Layout,
    policy: OwnershipPolicy,
) -> (Page, LoadReport) {
    let mut ordered: Vec<&PersistedElement> = elements.iter().collect();
    ordered.sort_by_key(|e| e.layer_index);

    let (panel_elements, bubble_elements): (Vec<_>, Vec<_>) = ordered
        .into_iter()
        .partition(|e| e.kind == ElementType::Panel);

    let mut page = Page::new(page_id, layout);
    page.panels = panel_elements.into_iter().map(panel_from_element).collect();

    let mut report = LoadReport::default();
    for element in bubble_elements {
        let bubble = bubble_from_element(element);
        match owner_index(&page.panels, bubble.x, bubble.y, policy) {
            Some(index) => page.panels[index].bubbles.push(bubble),
            None => {
                debug!(
                    "Dropping bubble {} at ({}, {}): outside every panel",
                    bubble.id, bubble.x, bubble.y
                );
                report.dropped_bubbles.push(bubble.id);
            }
        }
    }

    (page, report)
}

/// Index of the panel that owns a point under `policy`
pub fn owner_index(panels: &[Panel], x: f64, y: f64, policy: OwnershipPolicy) -> Option<usize> {
    let mut candidates = panels
        .iter()
        .enumerate()
        .filter(|(_, panel)| panel.contains_point(x, y));

    match policy {
        OwnershipPolicy::FirstMatch => candidates.next().map(|(index, _)| index),
        OwnershipPolicy::SmallestArea => candidates
            .fold(None, |best: Option<(usize, f64)>, (index, panel)| {
                let area = panel.area();
                match best {
                    Some((_, best_area)) if best_area <= area => best,
                    _ => Some((index, area)),
                }
            })
            .map(|(index, _)| index),
    }
}

fn panel_element(panel: &Panel, layer_index: u32) -> PersistedElement {
    PersistedElement {
        id: panel.id.clone(),
        kind: ElementType::Panel,
        position: Position {
            x: panel.x,
            y: panel.y,
        },
        size: Some(Size {
            width: panel.width,
            height: panel.height,
        }),
        image: (!panel.image_url.is_empty()).then(|| panel.image_url.clone()),
        text: None,
        rotation: Some(panel.rotation),
        layer_index,
        style: None,
    }
}

fn bubble_element(bubble: &Bubble, layer_index: u32) -> PersistedElement {
    let kind = match bubble.kind {
        BubbleType::Narration => ElementType::Text,
        _ => ElementType::SpeechBubble,
    };

    PersistedElement {
        id: bubble.id.clone(),
        kind,
        position: Position {
            x: bubble.x,
            y: bubble.y,
        },
        size: Some(Size {
            width: bubble.width,
            height: bubble.height,
        }),
        image: None,
        text: Some(bubble.text.clone()),
        rotation: None,
        layer_index,
        style: Some(ElementStyle {
            font_size: Some(bubble.font_size),
            color: Some(bubble.color.clone()),
            font_family: Some(bubble.font_family.clone()),
            background_color: Some(bubble.background_color.clone()),
            border_color: Some(bubble.border_color.clone()),
            border_width: Some(bubble.border_width),
            border_radius: Some(border_radius(bubble.kind)),
            text_align: Some(bubble.text_align.as_str().to_string()),
        }),
    }
}

fn border_radius(kind: BubbleType) -> f64 {
    match kind {
        BubbleType::Speech | BubbleType::Whisper => 20.0,
        BubbleType::Thought => 50.0,
        BubbleType::Shout => 4.0,
        BubbleType::Narration => 0.0,
    }
}

fn panel_from_element(element: &PersistedElement) -> Panel {
    let size = element.size.unwrap_or(Size {
        width: defaults::PANEL_SIZE,
        height: defaults::PANEL_SIZE,
    });

    let mut panel = Panel::with_id(
        element.id.clone(),
        element.position.x,
        element.position.y,
        size.width,
        size.height,
    );
    panel.image_url = element.image.clone().unwrap_or_default();
    panel.rotation = element.rotation.unwrap_or(0.0);
    panel
}

fn bubble_from_element(element: &PersistedElement) -> Bubble {
    let style = element.style.clone().unwrap_or_default();
    let size = element.size.unwrap_or(Size {
        width: defaults::BUBBLE_WIDTH,
        height: defaults::BUBBLE_HEIGHT,
    });
    let font_family = style
        .font_family
        .unwrap_or_else(|| defaults::FONT_FAMILY.to_string());

    Bubble {
        id: element.id.clone(),
        kind: infer_bubble_type(element.kind, &font_family),
        text: element.text.clone().unwrap_or_default(),
        x: element.position.x,
        y: element.position.y,
        width: size.width,
        height: size.height,
        font_size: style.font_size.unwrap_or(defaults::FONT_SIZE),
        font_family,
        text_align: style
            .text_align
            .as_deref()
            .map(TextAlign::parse_or_default)
            .unwrap_or_default(),
        color: style
            .color
            .unwrap_or_else(|| defaults::TEXT_COLOR.to_string()),
        background_color: style
            .background_color
            .unwrap_or_else(|| defaults::BUBBLE_BACKGROUND.to_string()),
        border_color: style
            .border_color
            .unwrap_or_else(|| defaults::BORDER_COLOR.to_string()),
        border_width: style.border_width.unwrap_or(defaults::BORDER_WIDTH),
    }
}

/// Bubble type is not stored; text elements are narration and a bold font
/// marks a shout. Thought and whisper bubbles load as speech.
fn infer_bubble_type(kind: ElementType, font_family: &str) -> BubbleType {
    if kind == ElementType::Text {
        BubbleType::Narration
    } else if font_family.to_ascii_lowercase().contains(BOLD_MARKER) {
        BubbleType::Shout
    } else {
        BubbleType::Speech
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        let mut left = Panel::with_id("left", 2.0, 2.0, 47.0, 96.0);
        left.image_url = "https://cdn.example.com/a.png".to_string();
        left.rotation = 3.5;
        let mut speech = Bubble::with_id("b1", BubbleType::Speech, "Hello!", 10.0, 10.0);
        speech.font_size = 22.0;
        speech.text_align = TextAlign::Left;
        speech.color = "#112233".to_string();
        left = left.with_bubble(speech);
        left = left.with_bubble(Bubble::with_id("b2", BubbleType::Narration, "Later...", 5.0, 80.0));

        let right = Panel::with_id("right", 51.0, 2.0, 47.0, 96.0)
            .with_bubble(Bubble::with_id("b3", BubbleType::Speech, "Who?", 60.0, 40.0));

        let mut page = Page::new(9, Layout::DoubleHorizontal)
            .with_panel(left)
            .with_panel(right);
        page.background_color = "#FFEEDD".to_string();
        page
    }

    #[test]
    fn test_layer_index_is_panel_then_bubbles() {
        let elements = serialize_page(&sample_page());
        let order: Vec<(&str, u32)> = elements
            .iter()
            .map(|e| (e.id.as_str(), e.layer_index))
            .collect();
        assert_eq!(
            order,
            vec![("left", 0), ("b1", 1), ("b2", 2), ("right", 3), ("b3", 4)]
        );
        assert_eq!(elements[0].kind, ElementType::Panel);
        assert_eq!(elements[2].kind, ElementType::Text);
        assert_eq!(elements[4].kind, ElementType::SpeechBubble);
    }

    #[test]
    fn test_round_trip_preserves_everything_but_background() {
        let page = sample_page();
        let elements = serialize_page(&page);
        let (restored, report) = deserialize_page_with_report(
            &elements,
            page.id,
            page.layout,
            OwnershipPolicy::default(),
        );

        assert!(report.is_lossless());
        assert_eq!(restored.background_color, "#FFFFFF");
        assert_eq!(restored.panels, page.panels);
        assert_eq!(restored.id, page.id);
        assert_eq!(restored.layout, page.layout);
    }

    #[test]
    fn test_empty_image_is_not_sent() {
        let page = Page::new(1, Layout::Single).with_panel(Panel::with_id("p", 0.0, 0.0, 10.0, 10.0));
        let elements = serialize_page(&page);
        assert!(elements[0].image.is_none());
        assert_eq!(elements[0].rotation, Some(0.0));

        let restored = deserialize_page(&elements, 1, Layout::Single);
        assert_eq!(restored.panels[0].image_url, "");
    }

    #[test]
    fn test_orphan_bubble_is_dropped() {
        let panel = Panel::with_id("p", 0.0, 0.0, 50.0, 50.0)
            .with_bubble(Bubble::with_id("inside", BubbleType::Speech, "ok", 10.0, 10.0))
            .with_bubble(Bubble::with_id("orphan", BubbleType::Speech, "lost", -5.0, -5.0));
        let page = Page::new(1, Layout::Single).with_panel(panel);

        let (restored, report) = deserialize_page_with_report(
            &serialize_page(&page),
            1,
            Layout::Single,
            OwnershipPolicy::default(),
        );

        let ids: Vec<&str> = restored.panels[0].bubbles.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["inside"]);
        assert_eq!(report.dropped_bubbles, vec!["orphan".to_string()]);
    }

    #[test]
    fn test_ownership_policies_on_nested_panels() {
        let outer = Panel::with_id("outer", 0.0, 0.0, 100.0, 100.0);
        let inner = Panel::with_id("inner", 40.0, 40.0, 20.0, 20.0);
        let panels = vec![outer, inner];

        assert_eq!(owner_index(&panels, 50.0, 50.0, OwnershipPolicy::FirstMatch), Some(0));
        assert_eq!(owner_index(&panels, 50.0, 50.0, OwnershipPolicy::SmallestArea), Some(1));
        assert_eq!(owner_index(&panels, 10.0, 10.0, OwnershipPolicy::SmallestArea), Some(0));
        assert_eq!(owner_index(&panels, 150.0, 10.0, OwnershipPolicy::SmallestArea), None);
    }

    #[test]
    fn test_equal_area_tie_goes_to_earlier_panel() {
        let panels = vec![
            Panel::with_id("a", 0.0, 0.0, 50.0, 50.0),
            Panel::with_id("b", 25.0, 25.0, 50.0, 50.0),
        ];
        assert_eq!(owner_index(&panels, 30.0, 30.0, OwnershipPolicy::SmallestArea), Some(0));
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let elements = vec![
            PersistedElement {
                id: "p".into(),
                kind: ElementType::Panel,
                position: Position { x: 0.0, y: 0.0 },
                size: None,
                image: None,
                text: None,
                rotation: None,
                layer_index: 0,
                style: None,
            },
            PersistedElement {
                id: "b".into(),
                kind: ElementType::SpeechBubble,
                position: Position { x: 30.0, y: 30.0 },
                size: None,
                image: None,
                text: None,
                rotation: None,
                layer_index: 1,
                style: Some(ElementStyle {
                    font_size: Some(12.0),
                    ..ElementStyle::default()
                }),
            },
        ];

        let page = deserialize_page(&elements, 2, Layout::Single);
        let panel = &page.panels[0];
        assert_eq!((panel.width, panel.height, panel.rotation), (100.0, 100.0, 0.0));

        let bubble = &panel.bubbles[0];
        assert_eq!(bubble.font_size, 12.0);
        assert_eq!(bubble.font_family, "Comic Sans MS");
        assert_eq!(bubble.text_align, TextAlign::Center);
        assert_eq!(bubble.color, "#000000");
        assert_eq!(bubble.background_color, "#FFFFFF");
        assert_eq!(bubble.border_width, 2.0);
        assert_eq!(bubble.text, "");
        assert_eq!((bubble.width, bubble.height), (25.0, 15.0));
    }

    #[test]
    fn test_bubble_type_inference() {
        let panel = Panel::with_id("p", 0.0, 0.0, 100.0, 100.0);
        let mut shout = Bubble::with_id("s", BubbleType::Shout, "HEY", 10.0, 10.0);
        shout.font_family = "Bangers Bold".to_string();
        let thought = Bubble::with_id("t", BubbleType::Thought, "hmm", 20.0, 20.0);
        let page = Page::new(1, Layout::Single).with_panel(panel.with_bubble(shout).with_bubble(thought));

        let restored = deserialize_page(&serialize_page(&page), 1, Layout::Single);
        let kinds: Vec<BubbleType> = restored.panels[0].bubbles.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BubbleType::Shout, BubbleType::Speech]);
    }

    #[test]
    fn test_elements_are_reordered_by_layer_index() {
        let page = sample_page();
        let mut elements = serialize_page(&page);
        elements.reverse();

        let restored = deserialize_page(&elements, page.id, page.layout);
        assert_eq!(restored.panels, page.panels);
    }
}
