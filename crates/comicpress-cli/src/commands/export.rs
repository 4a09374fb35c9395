//! Export command handler

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use comicpress_core::export::HttpImageSource;
use comicpress_core::{
    Config, ExportFormat, ExportOptions, ExportSource, Exporter, HttpComicApi, Page, ProjectId,
};

use crate::output::Output;

pub struct ExportArgs {
    pub project: ProjectId,
    pub name: String,
    pub format: ExportFormat,
    pub pages: PathBuf,
    pub remote: bool,
    pub out: Option<PathBuf>,
}

pub async fn run(args: ExportArgs, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let pages = read_pages(&args.pages)?;

    let api = HttpComicApi::from_config(&config).context("Failed to create API client")?;
    let images =
        HttpImageSource::new(config.request_timeout()).context("Failed to create image client")?;
    let exporter = Exporter::new(Arc::new(api), Arc::new(images));

    let source = if args.remote {
        ExportSource::Remote
    } else {
        ExportSource::Local
    };
    let mut options = ExportOptions::from_config(&config).with_source(source);
    options.title = Some(args.name.clone());

    let mut status = exporter.subscribe();
    let progress = output.is_human().then(|| {
        let format = output.format;
        tokio::spawn(async move {
            let output = Output::new(format);
            while status.changed().await.is_ok() {
                let current = status.borrow_and_update().clone();
                output.progress(&current);
            }
        })
    });

    let result = exporter
        .export_comic(args.project, &args.name, &pages, args.format, &options)
        .await;

    // Closing the channel ends the progress task
    drop(exporter);
    if let Some(task) = progress {
        let _ = task.await;
    }

    let result = result.context("Export failed")?;
    let dir = args.out.unwrap_or_else(|| config.output_dir.clone());
    let path = result.save_to(&dir)?;
    output.print_export(&result, &path);

    Ok(())
}

fn read_pages(file: &Path) -> Result<Vec<Page>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read pages file: {:?}", file))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid pages JSON in {:?}", file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use comicpress_core::Layout;
    use tempfile::TempDir;

    #[test]
    fn test_read_pages_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.json");
        let pages = vec![
            Page::with_layout(1, Layout::Quad),
            Page::new(2, Layout::Custom),
        ];
        std::fs::write(&path, serde_json::to_string(&pages).unwrap()).unwrap();

        let read = read_pages(&path).unwrap();
        assert_eq!(read, pages);
        assert_eq!(read[0].panels.len(), 4);
    }

    #[test]
    fn test_missing_pages_file() {
        let err = read_pages(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read pages file"));
    }
}
