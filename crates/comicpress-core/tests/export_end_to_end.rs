//! Edit, save, reload and export a small project against the in-memory backend

use std::io::{Cursor, Read};
use std::sync::Arc;

use comicpress_core::export::{NoImages, StaticImages};
use comicpress_core::{
    Bubble, BubbleType, EditorSession, ExportFormat, ExportOptions, ExportState, Exporter, Layout,
    MemoryApi, Page, Panel, SaveOutcome,
};
use tempfile::TempDir;

const PROJECT: u64 = 9;

fn two_pages() -> Vec<Page> {
    (1..=2)
        .map(|id| {
            let panel = Panel::with_id(format!("panel-{}", id), 10.0, 10.0, 80.0, 80.0)
                .with_bubble(Bubble::with_id(
                    format!("bubble-{}", id),
                    BubbleType::Speech,
                    format!("Page {} says hi", id),
                    20.0,
                    20.0,
                ));
            Page::new(id, Layout::Single).with_panel(panel)
        })
        .collect()
}

fn small_pages() -> ExportOptions {
    ExportOptions {
        page_width: 60,
        page_height: 90,
        ..ExportOptions::default()
    }
}

#[tokio::test]
async fn test_cbz_export_of_two_pages() {
    let api = Arc::new(MemoryApi::new());
    api.set_export_url(Some("/media/exports/My_Project.cbz"));
    let exporter = Exporter::new(api.clone(), Arc::new(NoImages));

    let result = exporter
        .export_comic(
            PROJECT,
            "My Project",
            &two_pages(),
            ExportFormat::Cbz,
            &small_pages(),
        )
        .await
        .unwrap();

    assert_eq!(result.file_name, "My_Project.cbz");
    assert_eq!(result.media_type, "application/vnd.comicbook+zip");
    assert_eq!(
        result.remote_url.as_deref(),
        Some("/media/exports/My_Project.cbz")
    );
    assert_eq!(exporter.status().state, ExportState::Success);

    let mut archive = zip::ZipArchive::new(Cursor::new(result.bytes.as_slice())).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["page_001.png", "page_002.png", "ComicInfo.xml"]);

    let mut info = String::new();
    archive
        .by_name("ComicInfo.xml")
        .unwrap()
        .read_to_string(&mut info)
        .unwrap();
    assert!(info.contains("Page 2 says hi"));

    let dir = TempDir::new().unwrap();
    let path = result.save_to(dir.path()).unwrap();
    assert_eq!(path.file_name().unwrap(), "My_Project.cbz");
    assert_eq!(std::fs::read(path).unwrap(), result.bytes);
}

#[tokio::test]
async fn test_saved_pages_export_the_same_after_reload() {
    let api = Arc::new(MemoryApi::new());
    let pages = two_pages();

    let editor = EditorSession::new(api.clone(), PROJECT, pages.clone());
    for index in 0..pages.len() {
        editor.update_page(index, pages[index].clone()).unwrap();
    }
    let outcomes = editor.save_all_dirty().await;
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, SaveOutcome::Saved { .. })));

    // A second session starts from blank pages and loads everything back
    let blank: Vec<Page> = pages.iter().map(|p| Page::new(p.id, p.layout)).collect();
    let reader = EditorSession::new(api.clone(), PROJECT, blank);
    for index in 0..pages.len() {
        assert!(reader.load_page(index).await.unwrap().is_some());
    }
    assert_eq!(reader.pages(), pages);

    let exporter = Exporter::new(api, Arc::new(StaticImages::new()));
    let options = small_pages();
    let original = exporter
        .export_comic(PROJECT, "Round Trip", &pages, ExportFormat::Pdf, &options)
        .await
        .unwrap();
    let reloaded = exporter
        .export_comic(PROJECT, "Round Trip", &reader.pages(), ExportFormat::Pdf, &options)
        .await
        .unwrap();
    assert_eq!(original.bytes, reloaded.bytes);
}

#[tokio::test]
async fn test_every_format_renders() {
    let api = Arc::new(MemoryApi::new());
    let exporter = Exporter::new(api, Arc::new(NoImages));

    for format in ExportFormat::ALL {
        let result = exporter
            .export_comic(PROJECT, "All Formats", &two_pages(), format, &small_pages())
            .await
            .unwrap();
        assert_eq!(result.format, format);
        assert!(result.file_name.ends_with(format.extension()));
        assert!(!result.bytes.is_empty());
    }
}
