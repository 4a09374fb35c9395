//! Export results and writing them to disk

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::ExportFormat;
use crate::error::ExportError;

/// A finished export, ready to hand to the user
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Suggested download name, e.g. `My_Project.cbz`
    pub file_name: String,
    pub media_type: &'static str,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    /// URL the backend reported for this export, if any
    pub remote_url: Option<String>,
}

impl ExportResult {
    pub fn new(
        project_name: &str,
        format: ExportFormat,
        bytes: Vec<u8>,
        remote_url: Option<String>,
    ) -> Self {
        Self {
            file_name: export_file_name(project_name, format),
            media_type: format.media_type(),
            format,
            bytes,
            remote_url,
        }
    }

    /// Write the file into `dir`, returning its path
    ///
    /// The write is atomic: an existing file with the same name is either
    /// fully replaced or left untouched.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        atomic_write(&path, &self.bytes).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;
        info!("Wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Download name for a project export
///
/// Every whitespace character becomes an underscore; nothing else changes.
pub fn export_file_name(project_name: &str, format: ExportFormat) -> String {
    let stem: String = project_name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{}.{}", stem, format.extension())
}

/// Write to a sibling temp file, sync it, then rename over the target
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_file_name() {
        assert_eq!(
            export_file_name("My Project", ExportFormat::Cbz),
            "My_Project.cbz"
        );
        assert_eq!(
            export_file_name("a\tb  c", ExportFormat::Pdf),
            "a_b__c.pdf"
        );
        assert_eq!(export_file_name("Solo", ExportFormat::Epub), "Solo.epub");
    }

    #[test]
    fn test_result_carries_media_type() {
        let result = ExportResult::new("X", ExportFormat::Cbr, vec![1], None);
        assert_eq!(result.media_type, "application/vnd.comicbook-rar");
        assert_eq!(result.file_name, "X.cbr");
    }

    #[test]
    fn test_save_to_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let first = ExportResult::new("Comic Book", ExportFormat::Pdf, b"old".to_vec(), None);
        let second = ExportResult::new("Comic Book", ExportFormat::Pdf, b"new".to_vec(), None);

        let path = first.save_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("Comic_Book.pdf"));
        second.save_to(dir.path()).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!dir.path().join("Comic_Book.pdf.tmp").exists());
    }

    #[test]
    fn test_save_to_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("exports").join("today");
        let result = ExportResult::new("c", ExportFormat::Cbz, vec![0; 4], None);

        let path = result.save_to(&nested).unwrap();
        assert!(path.exists());
    }
}
