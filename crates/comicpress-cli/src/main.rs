//! comicpress CLI
//!
//! Command-line interface for comicpress - pull and push comic pages, and
//! export projects as PDF, CBZ, CBR or EPUB.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use comicpress_core::{ExportFormat, Layout, PageId, ProjectId};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "comicpress")]
#[command(about = "comicpress - compose, save and export comics")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load or save pages
    Page {
        #[command(subcommand)]
        command: PageCommands,
    },
    /// Export pages to a comic file
    Export {
        /// Project ID
        project: ProjectId,
        /// Project name, used for the file name
        #[arg(short, long)]
        name: String,
        /// pdf, cbz, cbr or epub
        #[arg(short, long, default_value = "cbz")]
        format: ExportFormat,
        /// JSON file holding the list of pages
        #[arg(short, long)]
        pages: PathBuf,
        /// Let the backend render the file and download it
        #[arg(long)]
        remote: bool,
        /// Output directory (defaults to output_dir from the config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum PageCommands {
    /// Load a page from the backend and print it
    Pull {
        /// Project ID
        project: ProjectId,
        /// Page ID
        page: PageId,
        /// Layout to assume when the backend does not report one
        #[arg(short, long, default_value = "single")]
        layout: Layout,
    },
    /// Save a page read from a JSON file
    Push {
        /// Project ID
        project: ProjectId,
        /// Page JSON file
        file: PathBuf,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, api_token, output_dir, request_timeout_secs,
        /// page_width, page_height, ownership)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Page { command } => match command {
            PageCommands::Pull {
                project,
                page,
                layout,
            } => commands::page::pull(project, page, layout, config_path, &output).await,
            PageCommands::Push { project, file } => {
                commands::page::push(project, &file, config_path, &output).await
            }
        },
        Commands::Export {
            project,
            name,
            format,
            pages,
            remote,
            out,
        } => {
            let request = commands::export::ExportArgs {
                project,
                name,
                format,
                pages,
                remote,
                out,
            };
            commands::export::run(request, config_path, &output).await
        }
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        },
    }
}

/// Log to stderr; COMICPRESS_LOG overrides the level chosen by `-v`
fn init_logging(verbose: u8) {
    let level = std::env::var("COMICPRESS_LOG").unwrap_or_else(|_| {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
        .to_string()
    });

    let env_filter = EnvFilter::new(format!(
        "comicpress_core={},comicpress_cli={}",
        level, level
    ));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
