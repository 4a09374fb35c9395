//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use comicpress_core::{Config, OwnershipPolicy};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "api_url": config.api_url,
                    "api_token_set": config.api_token.is_some(),
                    "output_dir": config.output_dir,
                    "request_timeout_secs": config.request_timeout_secs,
                    "page_width": config.page_width,
                    "page_height": config.page_height,
                    "ownership": config.ownership,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  api_url:              {}", config.api_url);
            println!(
                "  api_token:            {}",
                if config.api_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  output_dir:           {}", config.output_dir.display());
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!(
                "  page size:            {}x{}",
                config.page_width, config.page_height
            );
            println!("  ownership:            {}", ownership_name(config.ownership));
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match key.as_str() {
        "api_url" => {
            if value.is_empty() {
                bail!("api_url cannot be empty");
            }
            config.api_url = value.clone();
        }
        "api_token" => {
            config.api_token = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.clone())
            };
        }
        "output_dir" => {
            config.output_dir = value.clone().into();
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a whole number of seconds.")?;
        }
        "page_width" => {
            config.page_width = parse_dimension(&value, "page_width")?;
        }
        "page_height" => {
            config.page_height = parse_dimension(&value, "page_height")?;
        }
        "ownership" => {
            config.ownership = match value.as_str() {
                "smallest_area" => OwnershipPolicy::SmallestArea,
                "first_match" => OwnershipPolicy::FirstMatch,
                _ => bail!("Invalid value for ownership. Use 'smallest_area' or 'first_match'."),
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: api_url, api_token, output_dir, request_timeout_secs, \
                 page_width, page_height, ownership",
                key
            );
        }
    }

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_token" { "***" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn parse_dimension(value: &str, key: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a number of pixels.", key))?;
    if parsed == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(parsed)
}

fn ownership_name(policy: OwnershipPolicy) -> &'static str {
    match policy {
        OwnershipPolicy::SmallestArea => "smallest_area",
        OwnershipPolicy::FirstMatch => "first_match",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_set_writes_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        set("page_width".into(), "600".into(), Some(&path), &quiet()).unwrap();
        set("ownership".into(), "first_match".into(), Some(&path), &quiet()).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.page_width, 600);
        assert_eq!(config.ownership, OwnershipPolicy::FirstMatch);
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        assert!(set("page_height".into(), "0".into(), Some(&path), &quiet()).is_err());
        assert!(set("ownership".into(), "largest".into(), Some(&path), &quiet()).is_err());
        assert!(set("nope".into(), "1".into(), Some(&path), &quiet()).is_err());
        assert!(!path.exists());
    }
}
