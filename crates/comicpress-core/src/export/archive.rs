//! Comic book archives (CBZ and CBR)
//!
//! Both formats hold one PNG per page, named so that a plain sort gives
//! reading order, followed by a `ComicInfo.xml` metadata file. CBZ entries
//! are deflated. CBR uses the same container with stored entries: there is
//! no open RAR writer, and comic readers identify the container by its
//! signature rather than the extension.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::raster::{compose_page, encode_png, RasterOptions};
use super::xml::{self, element, write_text_element};
use super::{ExportFormat, RenderDocument, Renderer};
use crate::error::RenderError;

pub const COMIC_INFO: &str = "ComicInfo.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveRenderer {
    format: ExportFormat,
    compression: CompressionMethod,
}

impl ArchiveRenderer {
    pub fn cbz() -> Self {
        Self {
            format: ExportFormat::Cbz,
            compression: CompressionMethod::Deflated,
        }
    }

    pub fn cbr() -> Self {
        Self {
            format: ExportFormat::Cbr,
            compression: CompressionMethod::Stored,
        }
    }
}

impl Renderer for ArchiveRenderer {
    fn format(&self) -> ExportFormat {
        self.format
    }

    fn render(&self, document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
        if document.pages.is_empty() {
            return Err(RenderError::NoPages);
        }

        let raster = RasterOptions {
            width: document.width,
            height: document.height,
            draw_text: true,
        };
        // Fixed timestamps keep the archive byte-stable
        let options = SimpleFileOptions::default()
            .compression_method(self.compression)
            .last_modified_time(DateTime::default());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (i, page) in document.pages.iter().enumerate() {
            let png = encode_png(&compose_page(page, document.images, &raster))?;
            zip.start_file(page_entry_name(i), options)?;
            zip.write_all(&png)?;
        }

        zip.start_file(COMIC_INFO, options)?;
        zip.write_all(&comic_info(document)?)?;

        Ok(zip.finish()?.into_inner())
    }
}

/// `page_001.png`, `page_002.png`, ...
pub fn page_entry_name(index: usize) -> String {
    format!("page_{:03}.png", index + 1)
}

/// ComicRack-style metadata with the title, page count and bubble text
fn comic_info(document: &RenderDocument<'_>) -> Result<Vec<u8>, RenderError> {
    let mut out = xml::xml_document()?;
    xml::open(
        &mut out,
        element(
            "ComicInfo",
            &[("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")],
        ),
    )?;
    write_text_element(&mut out, "Title", document.title)?;
    write_text_element(&mut out, "PageCount", &document.pages.len().to_string())?;
    write_text_element(&mut out, "Manga", "No")?;

    let dialogue: Vec<&str> = document
        .pages
        .iter()
        .flat_map(|page| page.panels.iter())
        .flat_map(|panel| panel.bubbles.iter())
        .map(|bubble| bubble.text.trim())
        .filter(|text| !text.is_empty())
        .collect();
    if !dialogue.is_empty() {
        write_text_element(&mut out, "Summary", &dialogue.join("\n"))?;
    }

    let (width, height) = (document.width.to_string(), document.height.to_string());
    xml::open(&mut out, element("Pages", &[]))?;
    for i in 0..document.pages.len() {
        let index = i.to_string();
        let mut entry = element("Page", &[("Image", index.as_str())]);
        if i == 0 {
            entry.push_attribute(("Type", "FrontCover"));
        }
        entry.push_attribute(("ImageWidth", width.as_str()));
        entry.push_attribute(("ImageHeight", height.as_str()));
        xml::empty(&mut out, entry)?;
    }
    xml::close(&mut out, "Pages")?;
    xml::close(&mut out, "ComicInfo")?;

    Ok(xml::finish(out))
}
