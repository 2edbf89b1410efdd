//! Canvasync CLI - Headless driver for canvas lazy loading and persistence
//!
//! Runs the viewport loader and persistence controller against a graph
//! store without a canvas UI.
//!
//! # Usage
//!
//! ```bash
//! # Create the local store and config
//! canvasync init --config-file
//!
//! # Fill a project with a grid of nodes
//! canvasync seed --project 6f1c... --count 200 --extent 5000
//!
//! # Load what a viewport would show
//! canvasync view --project 6f1c... --x -4000 --y -4000 --zoom 1
//! ```

use std::path::PathBuf;

use anyhow::Result;
use canvasync_config::{LogFormat, LoggingConfig, SaveMode, StoreBackend};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Canvasync - Viewport-driven canvas loading and persistence
#[derive(Parser, Debug)]
#[command(name = "canvasync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace directory holding `.canvasync/`
    #[arg(long, short = 'w', global = true, env = "CANVASYNC_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to a configuration file (skips global and local lookup)
    #[arg(long, short = 'c', global = true, env = "CANVASYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Store backend (sqlite, remote)
    #[arg(long, global = true, env = "CANVASYNC_BACKEND", value_parser = parse_backend)]
    backend: Option<StoreBackend>,

    /// SQLite database path
    #[arg(long, global = true, env = "CANVASYNC_DB")]
    db: Option<PathBuf>,

    /// Remote store base URL
    #[arg(long, global = true, env = "CANVASYNC_REMOTE_URL")]
    remote_url: Option<String>,

    /// Save mode (debounced, manual)
    #[arg(long, global = true, value_parser = parse_save_mode)]
    save_mode: Option<SaveMode>,
}

fn parse_backend(s: &str) -> Result<StoreBackend, String> {
    s.parse()
        .map_err(|e: canvasync_config::ConfigError| e.to_string())
}

fn parse_save_mode(s: &str) -> Result<SaveMode, String> {
    s.parse()
        .map_err(|e: canvasync_config::ConfigError| e.to_string())
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> canvasync_config::ConfigOverrides {
        canvasync_config::ConfigOverrides {
            backend: self.backend,
            sqlite_path: self.db.clone(),
            remote_url: self.remote_url.clone(),
            save_mode: self.save_mode,
            log_level: None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the local store (and optionally a config file)
    Init(commands::init::InitArgs),

    /// Fill a project with a deterministic grid of nodes
    Seed(commands::seed::SeedArgs),

    /// Load the content visible through a viewport
    View(commands::view::ViewArgs),

    /// Show stored counts for a project
    Stats(commands::stats::StatsArgs),

    /// Write a project's canvas as JSON
    Export(commands::export::ExportArgs),

    /// Replace a project's canvas from JSON
    Import(commands::import::ImportArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins over the configured level; `--quiet`/`--verbose` win over both.
fn init_tracing(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let filter = if global.quiet {
        EnvFilter::new("error")
    } else if global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(true).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from config; a broken config still gets default logging
    let logging = commands::resolve_workspace(&cli.global)
        .and_then(|workspace| commands::load_config(&cli.global, &workspace))
        .map(|config| config.logging)
        .unwrap_or_default();
    init_tracing(&cli.global, &logging)?;

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.global).await,
        Commands::Seed(args) => commands::seed::execute(args, cli.global).await,
        Commands::View(args) => commands::view::execute(args, cli.global).await,
        Commands::Stats(args) => commands::stats::execute(args, cli.global).await,
        Commands::Export(args) => commands::export::execute(args, cli.global).await,
        Commands::Import(args) => commands::import::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
