//! Page command handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use comicpress_core::{
    ComicApi, Config, EditorSession, HttpComicApi, Layout, Page, PageId, ProjectId, SaveOutcome,
};

use crate::output::Output;

fn connect(config: &Config) -> Result<Arc<dyn ComicApi>> {
    let api = HttpComicApi::from_config(config).context("Failed to create API client")?;
    Ok(Arc::new(api))
}

/// Load a page and print it
pub async fn pull(
    project: ProjectId,
    page: PageId,
    layout: Layout,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let session = EditorSession::new(connect(&config)?, project, vec![Page::new(page, layout)])
        .with_ownership(config.ownership);

    match session.load_page(0).await? {
        Some(loaded) => output.print_page(&loaded)?,
        None => output.message(&format!("Page {} has no saved content yet.", page)),
    }

    Ok(())
}

/// Save a page read from a JSON file
///
/// The stored page is loaded first, so pushing content identical to what
/// the backend already has sends nothing.
pub async fn push(
    project: ProjectId,
    file: &Path,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let page = read_page(file)?;
    let page_id = page.id;

    let session = EditorSession::new(connect(&config)?, project, vec![page.clone()])
        .with_ownership(config.ownership);
    session.load_page(0).await?;
    session.update_page(0, page)?;

    match session.save_page(Some(0)).await {
        SaveOutcome::Unchanged => {
            output.success(&format!("Page {} is already up to date", page_id));
        }
        SaveOutcome::Saved { .. } => {
            output.success(&format!("Saved page {} of project {}", page_id, project));
        }
        SaveOutcome::Failed(message) => bail!(message),
    }

    Ok(())
}

fn read_page(file: &Path) -> Result<Page> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read page file: {:?}", file))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid page JSON in {:?}", file))
}
