//! Page rasterization
//!
//! Composes a page into an RGBA image: background, then each panel followed
//! by its bubbles, which is the same stacking as `layer_index`. Output is a
//! pure function of the page, the resolved images and the options.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{warp_into_with, Interpolation};
use imageproc::rect::Rect;

use super::images::ImageCache;
use super::text::{bitmap_line_width, draw_bitmap_line, wrap_text, GLYPH_ADVANCE, GLYPH_LINE};
use crate::error::RenderError;
use crate::models::{defaults, Bubble, BubbleType, Page, Panel, TextAlign};

/// Width of the editor canvas that font sizes and border widths refer to
pub const EDITOR_WIDTH: f64 = 800.0;

const PLACEHOLDER: Rgba<u8> = Rgba([229, 229, 229, 255]);
const PANEL_BORDER: Rgba<u8> = Rgba([0, 0, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Largest panel image scaled in one piece
const MAX_SCALED_PIXELS: f64 = (1u64 << 24) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    pub width: u32,
    pub height: u32,
    /// Draw bubble text into the image (off when the format lays text over it)
    pub draw_text: bool,
}

/// A box in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Coordinates are kept within this distance of the origin
const COORD_LIMIT: f64 = (1u64 << 40) as f64;

impl PixelRect {
    /// Map a percentage box onto a `width` x `height` canvas
    ///
    /// Any finite or non-finite input gives a box; sizes are at least one pixel.
    pub fn from_percent(x: f64, y: f64, w: f64, h: f64, width: u32, height: u32) -> Self {
        let (cw, ch) = (width as f64, height as f64);
        let pixels = |value: f64, extent: f64| {
            let scaled = (value / 100.0 * extent).round();
            if scaled.is_finite() {
                scaled.clamp(-COORD_LIMIT, COORD_LIMIT)
            } else {
                0.0
            }
        };
        let size = |value: f64, extent: f64| pixels(value, extent).clamp(1.0, u32::MAX as f64) as u32;
        Self {
            x: pixels(x, cw) as i64,
            y: pixels(y, ch) as i64,
            width: size(w, cw),
            height: size(h, ch),
        }
    }

    /// Smallest box covering the given edges
    fn spanning(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        let (left, top) = (left.floor(), top.floor());
        Self {
            x: left.clamp(-COORD_LIMIT, COORD_LIMIT) as i64,
            y: top.clamp(-COORD_LIMIT, COORD_LIMIT) as i64,
            width: (right.ceil() - left).clamp(1.0, u32::MAX as f64) as u32,
            height: (bottom.ceil() - top).clamp(1.0, u32::MAX as f64) as u32,
        }
    }

    fn right(self) -> i64 {
        self.x + self.width as i64
    }

    fn bottom(self) -> i64 {
        self.y + self.height as i64
    }

    fn center(self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    fn translate(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    fn intersect(self, other: Self) -> Option<Self> {
        let (left, top) = (self.x.max(other.x), self.y.max(other.y));
        let (right, bottom) = (self.right().min(other.right()), self.bottom().min(other.bottom()));
        (right > left && bottom > top).then(|| Self {
            x: left,
            y: top,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }

    /// Only valid for boxes already clipped to a canvas
    fn to_rect(self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height)
    }

    fn inset(self, by: u32) -> Option<Self> {
        let twice = 2 * by as u64;
        if self.width as u64 <= twice || self.height as u64 <= twice {
            return None;
        }
        Some(Self {
            x: self.x + by as i64,
            y: self.y + by as i64,
            width: self.width - 2 * by,
            height: self.height - 2 * by,
        })
    }

    /// Four bands of thickness `by` along the edges
    fn edges(self, by: u32) -> [Self; 4] {
        let (bw, bh) = (by.min(self.width), by.min(self.height));
        [
            Self { height: bh, ..self },
            Self {
                y: self.bottom() - bh as i64,
                height: bh,
                ..self
            },
            Self { width: bw, ..self },
            Self {
                x: self.right() - bw as i64,
                width: bw,
                ..self
            },
        ]
    }
}

/// Parse a CSS color: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` or a basic name
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim().to_ascii_lowercase();

    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let mut out = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some(Rgba([out[0], out[1], out[2], 255]))
            }
            6 => Some(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ])),
            8 => Some(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            ])),
            _ => None,
        };
    }

    if let Some(args) = value
        .strip_prefix("rgb(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let parts: Vec<u8> = args
            .split(',')
            .map(|p| p.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .ok()?;
        return match parts.as_slice() {
            [r, g, b] => Some(Rgba([*r, *g, *b, 255])),
            _ => None,
        };
    }

    let named = match value.as_str() {
        "black" => [0, 0, 0, 255],
        "white" => [255, 255, 255, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "blue" => [0, 0, 255, 255],
        "yellow" => [255, 255, 0, 255],
        "gray" | "grey" => [128, 128, 128, 255],
        "transparent" => [0, 0, 0, 0],
        _ => return None,
    };
    Some(Rgba(named))
}

/// Parse `value`, falling back to `default` (which must itself parse)
pub fn color_or(value: &str, default: &str) -> Rgba<u8> {
    parse_color(value)
        .or_else(|| parse_color(default))
        .unwrap_or(Rgba([0, 0, 0, 255]))
}

/// Pixel size of an editor length on a canvas `canvas_width` wide
pub fn scale_length(length: f64, canvas_width: u32) -> u32 {
    (length * canvas_width as f64 / EDITOR_WIDTH).round().max(0.0) as u32
}

/// Compose one page
///
/// Panels and bubbles may extend past the canvas; only the visible part is
/// drawn, so memory use depends on the canvas size alone.
pub fn compose_page(page: &Page, images: &ImageCache, options: &RasterOptions) -> RgbaImage {
    let background = color_or(&page.background_color, defaults::PAGE_BACKGROUND);
    let mut canvas = RgbaImage::from_pixel(options.width, options.height, background);

    for panel in &page.panels {
        draw_panel(&mut canvas, panel, images, options);
        for bubble in &panel.bubbles {
            draw_bubble(&mut canvas, bubble, options);
        }
    }

    canvas
}

fn canvas_bounds(options: &RasterOptions) -> PixelRect {
    PixelRect {
        x: 0,
        y: 0,
        width: options.width,
        height: options.height,
    }
}

fn draw_panel(canvas: &mut RgbaImage, panel: &Panel, images: &ImageCache, options: &RasterOptions) {
    let rect = PixelRect::from_percent(
        panel.x,
        panel.y,
        panel.width,
        panel.height,
        options.width,
        options.height,
    );
    let bounds = canvas_bounds(options);
    let rotation = if panel.rotation.is_finite() {
        panel.rotation
    } else {
        0.0
    };

    if rotation.abs() <= f64::EPSILON {
        let Some(visible) = rect.intersect(bounds) else {
            return;
        };
        let window = visible.translate(-rect.x, -rect.y);
        let frame = panel_frame(panel, rect, window, images, options);
        imageops::overlay(canvas, &frame, visible.x, visible.y);
        return;
    }

    let Some((visible, window)) = rotated_window(rect, rotation, bounds) else {
        return;
    };
    let frame = panel_frame(panel, rect, window, images, options);

    // Each visible pixel samples the unrotated frame (clockwise rotation about the panel center)
    let (sin, cos) = rotation.to_radians().sin_cos();
    let (cx, cy) = rect.center();
    let origin = (visible.x as f64, visible.y as f64);
    let frame_origin = ((rect.x + window.x) as f64, (rect.y + window.y) as f64);
    let mut layer = RgbaImage::from_pixel(visible.width, visible.height, TRANSPARENT);
    warp_into_with(
        &frame,
        move |x, y| {
            let dx = origin.0 + x as f64 - cx;
            let dy = origin.1 + y as f64 - cy;
            (
                (cx + cos * dx + sin * dy - frame_origin.0) as f32,
                (cy - sin * dx + cos * dy - frame_origin.1) as f32,
            )
        },
        Interpolation::Bilinear,
        TRANSPARENT,
        &mut layer,
    );
    imageops::overlay(canvas, &layer, visible.x, visible.y);
}

/// Canvas area covered by a rotated panel, and the part of the panel
/// (in panel coordinates) that lands there
fn rotated_window(rect: PixelRect, degrees: f64, bounds: PixelRect) -> Option<(PixelRect, PixelRect)> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = rect.center();
    let (w, h) = (rect.width as f64, rect.height as f64);
    let half_w = (cos.abs() * w + sin.abs() * h) / 2.0;
    let half_h = (sin.abs() * w + cos.abs() * h) / 2.0;
    let visible =
        PixelRect::spanning(cx - half_w, cy - half_h, cx + half_w, cy + half_h).intersect(bounds)?;

    let corners = [
        (visible.x as f64, visible.y as f64),
        (visible.right() as f64, visible.y as f64),
        (visible.x as f64, visible.bottom() as f64),
        (visible.right() as f64, visible.bottom() as f64),
    ];
    let (mut left, mut top) = (f64::INFINITY, f64::INFINITY);
    let (mut right, mut bottom) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (dx, dy) = (x - cx, y - cy);
        let (sx, sy) = (cx + cos * dx + sin * dy, cy - sin * dx + cos * dy);
        left = left.min(sx);
        top = top.min(sy);
        right = right.max(sx);
        bottom = bottom.max(sy);
    }
    // One pixel of margin for bilinear sampling
    let source = PixelRect::spanning(left - 1.0, top - 1.0, right + 1.0, bottom + 1.0).intersect(rect)?;
    Some((visible, source.translate(-rect.x, -rect.y)))
}

/// Panel content inside `window`, which is given in panel coordinates
fn panel_frame(
    panel: &Panel,
    rect: PixelRect,
    window: PixelRect,
    images: &ImageCache,
    options: &RasterOptions,
) -> RgbaImage {
    let mut frame = RgbaImage::from_pixel(window.width, window.height, PLACEHOLDER);

    if let Some(source) = images.get(&panel.image_url) {
        draw_panel_image(&mut frame, panel, source, rect, window);
    }

    let border = scale_length(defaults::BORDER_WIDTH, options.width).max(1);
    let local = PixelRect {
        x: 0,
        y: 0,
        ..rect
    };
    for band in local.edges(border) {
        if let Some(part) = band.intersect(window) {
            let part = part.translate(-window.x, -window.y);
            draw_filled_rect_mut(&mut frame, part.to_rect(), PANEL_BORDER);
        }
    }

    frame
}

fn draw_panel_image(
    frame: &mut RgbaImage,
    panel: &Panel,
    source: &DynamicImage,
    rect: PixelRect,
    window: PixelRect,
) {
    let scale = panel
        .image_scale
        .filter(|s| s.is_finite())
        .unwrap_or(1.0)
        .max(0.01);
    let target_w = (rect.width as f64 * scale).round().max(1.0);
    let target_h = (rect.height as f64 * scale).round().max(1.0);
    let (offset_x, offset_y) = panel
        .image_position
        .map(|p| {
            let percent = |v: f64| if v.is_finite() { v } else { 0.0 };
            (
                (percent(p.x) / 100.0 * rect.width as f64).round(),
                (percent(p.y) / 100.0 * rect.height as f64).round(),
            )
        })
        .unwrap_or((0.0, 0.0));
    // Image origin relative to the frame
    let origin_x = offset_x - window.x as f64;
    let origin_y = offset_y - window.y as f64;

    if target_w * target_h <= MAX_SCALED_PIXELS {
        let resized = imageops::resize(source, target_w as u32, target_h as u32, FilterType::Triangle);
        imageops::overlay(frame, &resized, origin_x as i64, origin_y as i64);
        return;
    }

    // Too large to scale in one piece: sample the source for the frame only.
    // At this zoom a source pixel spans many output pixels.
    let source = source.to_rgba8();
    let step_x = source.width() as f64 / target_w;
    let step_y = source.height() as f64 / target_h;
    let mut layer = RgbaImage::from_pixel(frame.width(), frame.height(), TRANSPARENT);
    warp_into_with(
        &source,
        move |x, y| {
            (
                ((x as f64 - origin_x) * step_x) as f32,
                ((y as f64 - origin_y) * step_y) as f32,
            )
        },
        Interpolation::Nearest,
        TRANSPARENT,
        &mut layer,
    );
    imageops::overlay(frame, &layer, 0, 0);
}

fn draw_bubble(canvas: &mut RgbaImage, bubble: &Bubble, options: &RasterOptions) {
    let rect = PixelRect::from_percent(
        bubble.x,
        bubble.y,
        bubble.width,
        bubble.height,
        options.width,
        options.height,
    );
    let bounds = canvas_bounds(options);
    let Some(visible) = rect.intersect(bounds) else {
        return;
    };
    let fill = color_or(&bubble.background_color, defaults::BUBBLE_BACKGROUND);
    let stroke = color_or(&bubble.border_color, defaults::BORDER_COLOR);
    let border = scale_length(bubble.border_width, options.width);

    if bubble.kind == BubbleType::Thought {
        draw_ellipse(canvas, rect, visible, border, stroke, fill);
    } else {
        if border > 0 {
            draw_filled_rect_mut(canvas, visible.to_rect(), stroke);
        }
        if let Some(inner) = rect.inset(border).and_then(|r| r.intersect(bounds)) {
            draw_filled_rect_mut(canvas, inner.to_rect(), fill);
        }
    }

    if options.draw_text {
        let area = rect.inset(border.saturating_add(2)).unwrap_or(rect);
        draw_bubble_text(canvas, bubble, area, options);
    }
}

/// Ellipse inscribed in `rect` with a `border` wide outline, drawn inside `visible`
fn draw_ellipse(
    canvas: &mut RgbaImage,
    rect: PixelRect,
    visible: PixelRect,
    border: u32,
    stroke: Rgba<u8>,
    fill: Rgba<u8>,
) {
    let (cx, cy) = rect.center();
    let (rx, ry) = (rect.width as f64 / 2.0, rect.height as f64 / 2.0);
    let (ix, iy) = (rx - border as f64, ry - border as f64);

    for y in visible.y..visible.bottom() {
        for x in visible.x..visible.right() {
            let (dx, dy) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
            if (dx / rx).powi(2) + (dy / ry).powi(2) > 1.0 {
                continue;
            }
            let inner = ix > 0.0 && iy > 0.0 && (dx / ix).powi(2) + (dy / iy).powi(2) <= 1.0;
            canvas.put_pixel(x as u32, y as u32, if inner { fill } else { stroke });
        }
    }
}

fn draw_bubble_text(canvas: &mut RgbaImage, bubble: &Bubble, area: PixelRect, options: &RasterOptions) {
    let color = color_or(&bubble.color, defaults::TEXT_COLOR);
    // 7-pixel glyphs; one glyph pixel per ~10% of the scaled font size.
    // A glyph never needs to be taller than the canvas.
    let max_scale = (options.height / GLYPH_LINE).max(1);
    let scale = ((scale_length(bubble.font_size, options.width) as f64) / 10.0)
        .round()
        .clamp(1.0, max_scale as f64) as u32;

    let max_chars = (area.width / (GLYPH_ADVANCE * scale)).max(1) as usize;
    let lines = wrap_text(&bubble.text, max_chars);
    let line_height = (GLYPH_LINE * scale) as i64;
    let block_height = lines.len() as i64 * line_height;
    let top = area.y + (area.height as i64 - block_height).max(0) / 2;

    for (i, line) in lines.iter().enumerate() {
        let y = top + i as i64 * line_height;
        if y >= options.height as i64 {
            break;
        }
        let line_width = bitmap_line_width(line, scale) as i64;
        let left = match bubble.text_align {
            TextAlign::Left => area.x,
            TextAlign::Center => area.x + (area.width as i64 - line_width) / 2,
            TextAlign::Right => area.x + area.width as i64 - line_width,
        };
        draw_bitmap_line(canvas, line, left, y, scale, color);
    }
}

/// Encode an image as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Layout, Panel};

    fn options() -> RasterOptions {
        RasterOptions {
            width: 200,
            height: 300,
            draw_text: true,
        }
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_color("#112233"), Some(Rgba([0x11, 0x22, 0x33, 255])));
        assert_eq!(parse_color("#11223380"), Some(Rgba([0x11, 0x22, 0x33, 0x80])));
        assert_eq!(parse_color("rgb(1, 2, 3)"), Some(Rgba([1, 2, 3, 255])));
        assert_eq!(parse_color(" Black "), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn test_color_or_falls_back() {
        assert_eq!(color_or("nonsense", "#FFFFFF"), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_pixel_rect_from_percent() {
        let rect = PixelRect::from_percent(10.0, 50.0, 50.0, 25.0, 200, 400);
        assert_eq!(
            rect,
            PixelRect {
                x: 20,
                y: 200,
                width: 100,
                height: 100
            }
        );
        let tiny = PixelRect::from_percent(0.0, 0.0, 0.0, 0.0, 200, 400);
        assert_eq!((tiny.width, tiny.height), (1, 1));
    }

    #[test]
    fn test_compose_background_and_placeholder() {
        let mut page = Page::new(1, Layout::Custom)
            .with_panel(Panel::with_id("p", 50.0, 50.0, 40.0, 40.0));
        page.background_color = "#ff0000".to_string();

        let image = compose_page(&page, &ImageCache::new(), &options());
        assert_eq!(image.dimensions(), (200, 300));
        assert_eq!(*image.get_pixel(5, 5), Rgba([255, 0, 0, 255]));
        // Middle of the panel shows the placeholder fill
        assert_eq!(*image.get_pixel(140, 210), PLACEHOLDER);
    }

    #[test]
    fn test_compose_uses_resolved_image() {
        let mut panel = Panel::with_id("p", 0.0, 0.0, 100.0, 100.0);
        panel.image_url = "blue.png".to_string();
        let page = Page::new(1, Layout::Single).with_panel(panel);

        let mut images = ImageCache::new();
        images.insert(
            "blue.png".to_string(),
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]))),
        );

        let image = compose_page(&page, &images, &options());
        assert_eq!(*image.get_pixel(100, 150), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_bubble_drawn_over_panel() {
        let mut bubble = Bubble::with_id("b", BubbleType::Speech, "", 10.0, 10.0);
        bubble.background_color = "#00ff00".to_string();
        let panel = Panel::with_id("p", 0.0, 0.0, 100.0, 100.0).with_bubble(bubble);
        let page = Page::new(1, Layout::Single).with_panel(panel);

        let image = compose_page(&page, &ImageCache::new(), &options());
        // Center of the bubble box: x = 10% + 12.5% of 200, y = 10% + 7.5% of 300
        assert_eq!(*image.get_pixel(45, 52), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_oversized_panel_draws_visible_part_only() {
        let options = RasterOptions {
            width: 40,
            height: 60,
            draw_text: true,
        };
        let page = Page::new(1, Layout::Custom)
            .with_panel(Panel::with_id("p", 0.0, 0.0, 1e9, 1e9));

        let image = compose_page(&page, &ImageCache::new(), &options);
        assert_eq!(image.dimensions(), (40, 60));
        assert_eq!(*image.get_pixel(0, 0), PANEL_BORDER);
        assert_eq!(*image.get_pixel(20, 30), PLACEHOLDER);
        assert_eq!(*image.get_pixel(39, 59), PLACEHOLDER);
    }

    #[test]
    fn test_partly_visible_panel_keeps_its_far_border() {
        let mut page = Page::new(1, Layout::Custom)
            .with_panel(Panel::with_id("p", -50.0, 0.0, 100.0, 100.0));
        page.background_color = "#ff0000".to_string();

        let image = compose_page(&page, &ImageCache::new(), &options());
        assert_eq!(*image.get_pixel(10, 150), PLACEHOLDER);
        assert_eq!(*image.get_pixel(99, 150), PANEL_BORDER);
        assert_eq!(*image.get_pixel(150, 150), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_extreme_geometry_is_tolerated() {
        let mut rotated = Panel::with_id("r", -1e7, -1e7, 1e9, 1e9);
        rotated.rotation = 45.0;
        let mut nan = Panel::with_id("n", f64::NAN, 0.0, f64::INFINITY, 50.0);
        nan.rotation = f64::NAN;

        let mut shout = Bubble::with_id("b1", BubbleType::Speech, "WHAT", -1e6, -1e6);
        shout.width = 1e9;
        shout.height = 1e9;
        shout.font_size = 1e9;
        shout.border_width = 1e12;
        let mut thought = Bubble::with_id("b2", BubbleType::Thought, "hmm", 20.0, 20.0);
        thought.width = 1e8;
        thought.height = 1e8;

        let page = Page::new(1, Layout::Custom)
            .with_panel(rotated.with_bubble(shout))
            .with_panel(nan.with_bubble(thought));

        let image = compose_page(&page, &ImageCache::new(), &options());
        assert_eq!(image.dimensions(), (200, 300));
    }

    #[test]
    fn test_rotated_panel_covers_its_center() {
        let mut panel = Panel::with_id("p", 25.0, 25.0, 50.0, 50.0);
        panel.rotation = 90.0;
        let page = Page::new(1, Layout::Custom).with_panel(panel);

        let image = compose_page(&page, &ImageCache::new(), &options());
        let center = image.get_pixel(100, 150);
        for (got, want) in center.0.iter().zip(PLACEHOLDER.0.iter()) {
            assert!(got.abs_diff(*want) <= 1, "{:?}", center);
        }
        assert_eq!(*image.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_huge_image_scale_samples_visible_region() {
        let mut panel = Panel::with_id("p", 0.0, 0.0, 100.0, 100.0);
        panel.image_url = "blue.png".to_string();
        panel.image_scale = Some(1e5);
        let page = Page::new(1, Layout::Single).with_panel(panel);

        let mut images = ImageCache::new();
        images.insert(
            "blue.png".to_string(),
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]))),
        );

        let image = compose_page(&page, &images, &options());
        assert_eq!(*image.get_pixel(100, 150), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let page = Page::with_layout(1, Layout::Quad);
        let a = compose_page(&page, &ImageCache::new(), &options());
        let b = compose_page(&page, &ImageCache::new(), &options());
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_encode_png_signature() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
