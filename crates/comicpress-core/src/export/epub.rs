//! EPUB 3 fixed-layout renderer
//!
//! Each comic page becomes one pre-paginated XHTML document showing the
//! composed artwork, with bubble text laid over it as absolutely positioned
//! HTML so readers can search it and resize it.

use std::io::{Cursor, Write};

use image::Rgba;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::raster::{color_or, compose_page, encode_png, RasterOptions, EDITOR_WIDTH};
use super::xml::{self, element, write_element, write_text_element};
use super::{ExportFormat, RenderDocument, Renderer};
use crate::error::RenderError;
use crate::models::{defaults, Bubble, Page};

/// `dcterms:modified` is required; a fixed value keeps output stable
const MODIFIED: &str = "2000-01-01T00:00:00Z";

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const STYLE_CSS: &str = "html, body { margin: 0; padding: 0; }
.page { position: relative; overflow: hidden; }
.page img { position: absolute; top: 0; left: 0; width: 100%; height: 100%; }
.bubble { position: absolute; display: flex; flex-direction: column; justify-content: center; \
overflow: hidden; word-wrap: break-word; line-height: 1.2; }
.bubble p { margin: 0; }
";

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubRenderer;

impl Renderer for EpubRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Epub
    }

    fn render(&self, document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
        if document.pages.is_empty() {
            return Err(RenderError::NoPages);
        }

        let raster = RasterOptions {
            width: document.width,
            height: document.height,
            draw_text: false,
        };
        let stored = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(DateTime::default());
        let deflated = stored.compression_method(CompressionMethod::Deflated);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        // Readers sniff the first entry, which must be an uncompressed mimetype
        zip.start_file("mimetype", stored)?;
        zip.write_all(ExportFormat::Epub.media_type().as_bytes())?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(&container_document()?)?;

        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(&package_document(document)?)?;

        zip.start_file("OEBPS/nav.xhtml", deflated)?;
        zip.write_all(&navigation_document(document)?)?;

        zip.start_file("OEBPS/style.css", deflated)?;
        zip.write_all(STYLE_CSS.as_bytes())?;

        for (i, page) in document.pages.iter().enumerate() {
            let png = encode_png(&compose_page(page, document.images, &raster))?;
            // PNG data is already compressed
            zip.start_file(format!("OEBPS/{}", image_name(i)), stored)?;
            zip.write_all(&png)?;

            zip.start_file(format!("OEBPS/{}", page_name(i)), deflated)?;
            zip.write_all(&page_document(document, page, i)?)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

fn page_name(index: usize) -> String {
    format!("page_{:03}.xhtml", index + 1)
}

fn image_name(index: usize) -> String {
    format!("images/page_{:03}.png", index + 1)
}

/// Stable identifier derived from the title and page content
fn identifier(document: &RenderDocument<'_>) -> Result<String, RenderError> {
    let mut hasher = Sha256::new();
    hasher.update(document.title.as_bytes());
    for page in document.pages {
        serde_json::to_writer(&mut hasher, page)?;
    }
    Ok(format!("urn:sha256:{}", hex::encode(hasher.finalize())))
}

fn container_document() -> Result<Vec<u8>, RenderError> {
    let mut out = xml::xml_document()?;
    xml::open(
        &mut out,
        element(
            "container",
            &[
                ("version", "1.0"),
                ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
            ],
        ),
    )?;
    xml::open(&mut out, element("rootfiles", &[]))?;
    xml::empty(
        &mut out,
        element(
            "rootfile",
            &[
                ("full-path", "OEBPS/content.opf"),
                ("media-type", "application/oebps-package+xml"),
            ],
        ),
    )?;
    xml::close(&mut out, "rootfiles")?;
    xml::close(&mut out, "container")?;
    Ok(xml::finish(out))
}

fn package_document(document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
    let identifier = identifier(document)?;
    let mut out = xml::xml_document()?;
    xml::open(
        &mut out,
        element(
            "package",
            &[
                ("xmlns", "http://www.idpf.org/2007/opf"),
                ("version", "3.0"),
                ("unique-identifier", "book-id"),
                ("prefix", "rendition: http://www.idpf.org/vocab/rendition/#"),
            ],
        ),
    )?;

    xml::open(
        &mut out,
        element("metadata", &[("xmlns:dc", "http://purl.org/dc/elements/1.1/")]),
    )?;
    write_element(&mut out, element("dc:identifier", &[("id", "book-id")]), &identifier)?;
    write_text_element(&mut out, "dc:title", document.title)?;
    write_text_element(&mut out, "dc:language", "en")?;
    for (property, value) in [
        ("dcterms:modified", MODIFIED),
        ("rendition:layout", "pre-paginated"),
        ("rendition:spread", "none"),
    ] {
        write_element(&mut out, element("meta", &[("property", property)]), value)?;
    }
    xml::close(&mut out, "metadata")?;

    xml::open(&mut out, element("manifest", &[]))?;
    xml::empty(
        &mut out,
        element(
            "item",
            &[
                ("id", "nav"),
                ("href", "nav.xhtml"),
                ("media-type", "application/xhtml+xml"),
                ("properties", "nav"),
            ],
        ),
    )?;
    xml::empty(
        &mut out,
        element(
            "item",
            &[("id", "css"), ("href", "style.css"), ("media-type", "text/css")],
        ),
    )?;
    for i in 0..document.pages.len() {
        let (image_id, image_href) = (format!("img{}", i + 1), image_name(i));
        let mut image = element(
            "item",
            &[
                ("id", image_id.as_str()),
                ("href", image_href.as_str()),
                ("media-type", "image/png"),
            ],
        );
        if i == 0 {
            image.push_attribute(("properties", "cover-image"));
        }
        xml::empty(&mut out, image)?;

        let (page_id, page_href) = (format!("page{}", i + 1), page_name(i));
        xml::empty(
            &mut out,
            element(
                "item",
                &[
                    ("id", page_id.as_str()),
                    ("href", page_href.as_str()),
                    ("media-type", "application/xhtml+xml"),
                ],
            ),
        )?;
    }
    xml::close(&mut out, "manifest")?;

    xml::open(&mut out, element("spine", &[]))?;
    for i in 0..document.pages.len() {
        let idref = format!("page{}", i + 1);
        xml::empty(&mut out, element("itemref", &[("idref", idref.as_str())]))?;
    }
    xml::close(&mut out, "spine")?;

    xml::close(&mut out, "package")?;
    Ok(xml::finish(out))
}

fn navigation_document(document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
    let mut out = xml::xml_document()?;
    xml::open(
        &mut out,
        element(
            "html",
            &[
                ("xmlns", XHTML_NS),
                ("xmlns:epub", "http://www.idpf.org/2007/ops"),
            ],
        ),
    )?;
    xml::open(&mut out, element("head", &[]))?;
    write_text_element(&mut out, "title", document.title)?;
    xml::close(&mut out, "head")?;

    xml::open(&mut out, element("body", &[]))?;
    xml::open(&mut out, element("nav", &[("epub:type", "toc"), ("id", "toc")]))?;
    write_text_element(&mut out, "h1", document.title)?;
    xml::open(&mut out, element("ol", &[]))?;
    for i in 0..document.pages.len() {
        let href = page_name(i);
        xml::open(&mut out, element("li", &[]))?;
        write_element(
            &mut out,
            element("a", &[("href", href.as_str())]),
            &format!("Page {}", i + 1),
        )?;
        xml::close(&mut out, "li")?;
    }
    xml::close(&mut out, "ol")?;
    xml::close(&mut out, "nav")?;
    xml::close(&mut out, "body")?;
    xml::close(&mut out, "html")?;
    Ok(xml::finish(out))
}

fn page_document(
    document: &RenderDocument<'_>,
    page: &Page,
    index: usize,
) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (document.width, document.height);
    let number = index + 1;
    let viewport = format!("width={}, height={}", width, height);
    let page_style = format!("width: {}px; height: {}px;", width, height);
    let image = image_name(index);
    let alt = format!("Page {}", number);

    let mut out = xml::xml_document()?;
    xml::open(&mut out, element("html", &[("xmlns", XHTML_NS)]))?;

    xml::open(&mut out, element("head", &[]))?;
    xml::empty(
        &mut out,
        element("meta", &[("name", "viewport"), ("content", viewport.as_str())]),
    )?;
    write_text_element(&mut out, "title", &alt)?;
    xml::empty(
        &mut out,
        element(
            "link",
            &[("rel", "stylesheet"), ("type", "text/css"), ("href", "style.css")],
        ),
    )?;
    xml::close(&mut out, "head")?;

    xml::open(&mut out, element("body", &[]))?;
    xml::open(
        &mut out,
        element("div", &[("class", "page"), ("style", page_style.as_str())]),
    )?;
    xml::empty(
        &mut out,
        element("img", &[("src", image.as_str()), ("alt", alt.as_str())]),
    )?;
    for bubble in page
        .panels
        .iter()
        .flat_map(|panel| panel.bubbles.iter())
        .filter(|bubble| !bubble.text.trim().is_empty())
    {
        write_bubble(&mut out, bubble, width)?;
    }
    xml::close(&mut out, "div")?;
    xml::close(&mut out, "body")?;
    xml::close(&mut out, "html")?;
    Ok(xml::finish(out))
}

fn write_bubble(
    out: &mut xml::XmlWriter,
    bubble: &Bubble,
    canvas_width: u32,
) -> Result<(), RenderError> {
    let style = bubble_style(bubble, canvas_width);
    xml::open(
        out,
        element("div", &[("class", "bubble"), ("style", style.as_str())]),
    )?;
    for line in bubble.text.lines() {
        write_text_element(out, "p", line)?;
    }
    xml::close(out, "div")
}

/// Inline style built only from parsed values
fn bubble_style(bubble: &Bubble, canvas_width: u32) -> String {
    let font_px = finite(bubble.font_size) * canvas_width as f64 / EDITOR_WIDTH;
    format!(
        "left: {:.2}%; top: {:.2}%; width: {:.2}%; height: {:.2}%; font-size: {:.1}px; \
         font-family: {}; color: {}; text-align: {};",
        finite(bubble.x),
        finite(bubble.y),
        finite(bubble.width),
        finite(bubble.height),
        font_px,
        css_font_family(&bubble.font_family),
        css_color(color_or(&bubble.color, defaults::TEXT_COLOR)),
        bubble.text_align.as_str(),
    )
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn css_color(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    } else {
        format!("rgba({}, {}, {}, {:.3})", r, g, b, a as f64 / 255.0)
    }
}

/// Quote a family name and add a generic fallback
fn css_font_family(family: &str) -> String {
    let cleaned: String = family
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "sans-serif".to_string()
    } else {
        format!("'{}', sans-serif", cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::images::ImageCache;
    use crate::models::{BubbleType, Layout, Panel, TextAlign};
    use std::io::Read;

    fn sample_pages() -> Vec<Page> {
        let mut bubble = Bubble::with_id("b1", BubbleType::Speech, "Look <out>!", 10.0, 20.0);
        bubble.text_align = TextAlign::Right;
        let panel = Panel::with_id("p1", 0.0, 0.0, 100.0, 100.0).with_bubble(bubble);
        vec![
            Page::new(1, Layout::Single).with_panel(panel),
            Page::new(2, Layout::Custom),
        ]
    }

    fn render(pages: &[Page]) -> Vec<u8> {
        let images = ImageCache::new();
        let document = RenderDocument {
            title: "Epic",
            pages,
            images: &images,
            width: 80,
            height: 120,
        };
        EpubRenderer.render(&document).unwrap()
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_mimetype_is_first_and_stored() {
        let bytes = render(&sample_pages());
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);

        assert_eq!(read_entry(&bytes, "mimetype"), "application/epub+zip");
    }

    #[test]
    fn test_package_lists_every_page() {
        let bytes = render(&sample_pages());
        let opf = read_entry(&bytes, "OEBPS/content.opf");

        assert!(opf.contains("<dc:title>Epic</dc:title>"));
        assert!(opf.contains("pre-paginated"));
        assert!(opf.contains("urn:sha256:"));
        assert!(opf.contains("<itemref idref=\"page1\"/>"));
        assert!(opf.contains("<itemref idref=\"page2\"/>"));
        assert!(opf.contains("properties=\"cover-image\""));

        let nav = read_entry(&bytes, "OEBPS/nav.xhtml");
        assert!(nav.contains("page_002.xhtml"));
    }

    #[test]
    fn test_page_overlays_bubble_text() {
        let bytes = render(&sample_pages());
        let page = read_entry(&bytes, "OEBPS/page_001.xhtml");

        assert!(page.contains("<p>Look &lt;out&gt;!</p>"));
        assert!(page.contains("left: 10.00%; top: 20.00%"));
        assert!(page.contains("text-align: right"));
        assert!(page.contains("images/page_001.png"));

        let empty = read_entry(&bytes, "OEBPS/page_002.xhtml");
        assert!(!empty.contains("class=\"bubble\""));
    }

    #[test]
    fn test_epub_is_deterministic() {
        let pages = sample_pages();
        assert_eq!(render(&pages), render(&pages));
    }

    #[test]
    fn test_identifier_tracks_content() {
        fn id_of(pages: &[Page], images: &ImageCache) -> String {
            identifier(&RenderDocument {
                title: "Epic",
                pages,
                images,
                width: 10,
                height: 10,
            })
            .unwrap()
        }

        let images = ImageCache::new();
        let pages = sample_pages();
        let a = id_of(&pages, &images);
        assert_ne!(a, id_of(&pages[..1], &images));
        assert_eq!(a, id_of(&pages, &images));
    }

    #[test]
    fn test_font_family_is_sanitized() {
        assert_eq!(
            css_font_family("Comic \"Sans\"; MS"),
            "'Comic Sans MS', sans-serif"
        );
        assert_eq!(css_font_family("');}"), "sans-serif");
    }

    #[test]
    fn test_bubble_style_uses_parsed_color() {
        let mut bubble = Bubble::with_id("b", BubbleType::Speech, "Hi", 10.0, 20.0);
        bubble.color = "red; background:url(x)".to_string();
        let style = bubble_style(&bubble, 800);
        assert!(style.contains("color: #000000;"));
        assert!(!style.contains("url("));

        bubble.color = "red".to_string();
        bubble.x = f64::NAN;
        let style = bubble_style(&bubble, 800);
        assert!(style.contains("color: #ff0000;"));
        assert!(style.contains("left: 0.00%"));
        assert!(!style.contains("NaN"));
    }

    #[test]
    fn test_container_points_at_package() {
        let bytes = render(&sample_pages());
        let container = read_entry(&bytes, "META-INF/container.xml");
        assert!(container.contains("full-path=\"OEBPS/content.opf\""));
    }
}
