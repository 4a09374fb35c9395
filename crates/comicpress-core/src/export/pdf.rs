//! PDF renderer
//!
//! One PDF page per comic page. The composed artwork is embedded as a
//! Flate-compressed RGB image; bubble text is laid over it as real text in
//! the standard Helvetica font, so it stays selectable and searchable.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::raster::{color_or, compose_page, RasterOptions, EDITOR_WIDTH};
use super::text::wrap_text;
use super::{ExportFormat, RenderDocument, Renderer};
use crate::error::RenderError;
use crate::models::{defaults, Bubble, TextAlign};

/// A4 width in points
const PAGE_WIDTH_PT: f64 = 595.0;
/// Average Helvetica glyph width as a fraction of the font size
const AVERAGE_GLYPH_WIDTH: f64 = 0.5;
const LINE_HEIGHT: f64 = 1.2;

/// Largest real a conforming reader must accept
const MAX_REAL: f64 = 32767.0;

const FONT_NAME: &str = "F1";
const IMAGE_NAME: &str = "Im0";

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl Renderer for PdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
        if document.pages.is_empty() {
            return Err(RenderError::NoPages);
        }

        let options = RasterOptions {
            width: document.width,
            height: document.height,
            draw_text: false,
        };
        let page_w = PAGE_WIDTH_PT;
        let page_h = PAGE_WIDTH_PT * document.height as f64 / document.width.max(1) as f64;

        let mut pdf = Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids = Vec::with_capacity(document.pages.len());
        for page in document.pages {
            let raster = compose_page(page, document.images, &options);
            let image_id = pdf.add_object(image_stream(&raster)?);

            let mut operations = vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        real(page_w),
                        Object::Integer(0),
                        Object::Integer(0),
                        real(page_h),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![IMAGE_NAME.into()]),
                Operation::new("Q", vec![]),
            ];
            for bubble in page.panels.iter().flat_map(|p| p.bubbles.iter()) {
                operations.extend(bubble_text_ops(bubble, page_w, page_h));
            }
            let content = Content { operations }.encode()?;
            let content_id = pdf.add_object(Stream::new(Dictionary::new(), content));

            let page_id = pdf.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    real(page_w),
                    real(page_h),
                ],
                "Resources" => dictionary! {
                    "Font" => dictionary! { FONT_NAME => font_id },
                    "XObject" => dictionary! { IMAGE_NAME => image_id },
                },
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id: ObjectId = pdf.add_object(dictionary! {
            "Title" => Object::String(win_ansi(document.title), StringFormat::Literal),
            "Producer" => Object::string_literal("comicpress"),
        });
        pdf.trailer.set("Root", catalog_id);
        pdf.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        pdf.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn image_stream(raster: &RgbaImage) -> Result<Stream, RenderError> {
    let pixels = deflate(&rgb_bytes(raster))?;
    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => raster.width() as i64,
            "Height" => raster.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "FlateDecode",
        },
        pixels,
    ))
}

/// Text operations for one bubble, in page points (origin bottom-left)
fn bubble_text_ops(bubble: &Bubble, page_w: f64, page_h: f64) -> Vec<Operation> {
    if bubble.text.trim().is_empty() {
        return Vec::new();
    }

    let size = (finite(bubble.font_size) * page_w / EDITOR_WIDTH).max(1.0);
    let box_x = finite(bubble.x) / 100.0 * page_w;
    let box_w = finite(bubble.width) / 100.0 * page_w;
    let box_top = page_h - finite(bubble.y) / 100.0 * page_h;
    let box_h = finite(bubble.height) / 100.0 * page_h;

    let glyph_w = size * AVERAGE_GLYPH_WIDTH;
    let max_chars = (box_w / glyph_w).floor().max(1.0) as usize;
    let lines = wrap_text(&bubble.text, max_chars);

    let leading = size * LINE_HEIGHT;
    let block = leading * lines.len() as f64;
    let first_baseline = box_top - ((box_h - block).max(0.0) / 2.0) - size;

    let color = color_or(&bubble.color, defaults::TEXT_COLOR);
    let fill: Vec<Object> = color.0[..3]
        .iter()
        .map(|&channel| real(channel as f64 / 255.0))
        .collect();

    let mut ops = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line_w = line.chars().count() as f64 * glyph_w;
        let x = match bubble.text_align {
            TextAlign::Left => box_x,
            TextAlign::Center => box_x + (box_w - line_w) / 2.0,
            TextAlign::Right => box_x + box_w - line_w,
        };
        let y = first_baseline - leading * i as f64;

        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![FONT_NAME.into(), real(size)]));
        ops.push(Operation::new("rg", fill.clone()));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi(line), StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

/// Encode text in WinAnsi (Latin-1 subset) for the standard fonts
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| if (c as u32) < 256 { c as u32 as u8 } else { b'?' })
        .collect()
}

/// NaN and infinities are not valid PDF numbers
fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn real(value: f64) -> Object {
    Object::Real(finite(value).clamp(-MAX_REAL, MAX_REAL) as f32)
}

fn rgb_bytes(image: &RgbaImage) -> Vec<u8> {
    image
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect()
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, RenderError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
