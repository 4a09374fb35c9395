//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/comicpress/config.toml)
//! 3. Environment variables (COMICPRESS_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::serializer::OwnershipPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "COMICPRESS";

const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the backend API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token sent with every request (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Directory where exported files are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Per-request timeout for backend calls and image fetches
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Width in pixels of a rendered export page
    #[serde(default = "default_page_width")]
    pub page_width: u32,

    /// Height in pixels of a rendered export page
    #[serde(default = "default_page_height")]
    pub page_height: u32,

    /// How loaded bubbles are assigned to overlapping panels
    #[serde(default)]
    pub ownership: OwnershipPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            output_dir: default_output_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            page_width: default_page_width(),
            page_height: default_page_height(),
            ownership: OwnershipPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (COMICPRESS_API_URL, COMICPRESS_API_TOKEN, COMICPRESS_OUTPUT_DIR)
    /// 2. Config file (~/.config/comicpress/config.toml or COMICPRESS_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from an explicit path when given, else from the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // COMICPRESS_API_URL
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        // COMICPRESS_API_TOKEN
        if let Ok(val) = std::env::var(format!("{}_API_TOKEN", ENV_PREFIX)) {
            self.api_token = if val.is_empty() { None } else { Some(val) };
        }

        // COMICPRESS_OUTPUT_DIR
        if let Ok(val) = std::env::var(format!("{}_OUTPUT_DIR", ENV_PREFIX)) {
            self.output_dir = PathBuf::from(val);
        }
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with COMICPRESS_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("comicpress")
            .join("config.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Downloads folder when the platform has one
fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_width() -> u32 {
    1200
}

fn default_page_height() -> u32 {
    1800
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "COMICPRESS_API_URL",
        "COMICPRESS_API_TOKEN",
        "COMICPRESS_OUTPUT_DIR",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:8000/api");
        assert!(config.api_token.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!((config.page_width, config.page_height), (1200, 1800));
        assert_eq!(config.ownership, OwnershipPolicy::SmallestArea);
    }

    #[test]
    fn test_env_override_api_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("COMICPRESS_API_URL", "https://comics.example.com/api");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "https://comics.example.com/api");

        // Empty string keeps the current value
        env::set_var("COMICPRESS_API_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.api_url, "https://comics.example.com/api");
    }

    #[test]
    fn test_env_override_token() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("COMICPRESS_API_TOKEN", "secret");
        config.apply_env_overrides();
        assert_eq!(config.api_token.as_deref(), Some("secret"));

        // Empty string clears it
        env::set_var("COMICPRESS_API_TOKEN", "");
        config.apply_env_overrides();
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_env_override_output_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("COMICPRESS_OUTPUT_DIR", "/tmp/comics");
        config.apply_env_overrides();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/comics"));
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            api_url = "http://backend:9000/api"
            page_width = 800
            ownership = "first_match"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.api_url, "http://backend:9000/api");
        assert_eq!(config.page_width, 800);
        assert_eq!(config.page_height, 1800);
        assert_eq!(config.ownership, OwnershipPolicy::FirstMatch);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000/api");
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            api_token: Some("t0k3n".to_string()),
            output_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.api_token.as_deref(), Some("t0k3n"));
        assert_eq!(loaded.output_dir, temp_dir.path());
    }
}
