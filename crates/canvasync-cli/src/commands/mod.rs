//! CLI command implementations
//!
//! This module contains all canvasync CLI command implementations.

pub mod config;
pub mod export;
pub mod import;
pub mod init;
pub mod seed;
pub mod stats;
pub mod view;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use canvasync_config::{CanvasyncConfig, ConfigLoader, StoreBackend};
use canvasync_store::{GraphStore, RemoteStore, SqliteStore};
use tracing::debug;

use crate::GlobalOptions;

/// Resolve the workspace path from options or current directory.
pub fn resolve_workspace(global: &GlobalOptions) -> Result<PathBuf> {
    match global.workspace {
        Some(ref path) => path
            .canonicalize()
            .with_context(|| format!("Workspace not found: {}", path.display())),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

/// Load configuration with CLI overrides applied.
///
/// An explicit `--config` file replaces the global/local lookup.
pub fn load_config(global: &GlobalOptions, workspace: &Path) -> Result<CanvasyncConfig> {
    let overrides = global.to_config_overrides();
    let loader = ConfigLoader::new();

    if let Some(ref config_path) = global.config {
        return loader
            .load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    loader
        .load(workspace, Some(&overrides))
        .context("Failed to load configuration")
}

/// Open the configured graph store.
pub fn open_store(config: &CanvasyncConfig, workspace: &Path) -> Result<Arc<dyn GraphStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let path = config.sqlite_path(workspace);
            let store = SqliteStore::open(&path)
                .with_context(|| format!("Failed to open store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Remote => {
            let remote = &config.store.remote;
            let mut store = RemoteStore::new(remote.url.clone())
                .and_then(|s| s.with_timeout(remote.timeout_secs))
                .context("Failed to create remote store client")?
                .with_snapshot_upsert(remote.snapshot_upsert);
            match remote.api_key() {
                Some(key) => store = store.with_api_key(key)?,
                None => debug!("{} not set, connecting without an API key", remote.api_key_env),
            }
            Ok(Arc::new(store))
        }
    }
}

/// Resolve workspace, config and store in one go.
pub fn connect(global: &GlobalOptions) -> Result<(CanvasyncConfig, Arc<dyn GraphStore>)> {
    let workspace = resolve_workspace(global)?;
    let config = load_config(global, &workspace)?;
    let store = open_store(&config, &workspace)?;
    Ok((config, store))
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
