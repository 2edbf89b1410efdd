//! Initialize command - Create the local store

use anyhow::{Context, Result};
use canvasync_config::{ConfigLoader, StoreBackend};
use canvasync_store::GraphStore;
use clap::Args;
use tracing::info;

use super::{load_config, open_store, print_info, resolve_workspace};
use crate::GlobalOptions;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also write `.canvasync/config.toml` with default settings
    #[arg(long)]
    config_file: bool,
}

/// Execute the init command
pub async fn execute(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;

    if args.config_file {
        let path = ConfigLoader::new()
            .init_local(&workspace)
            .context("Failed to create local config")?;
        print_info(&format!("Config: {}", path.display()), global.quiet);
    }

    let config = load_config(&global, &workspace)?;
    let store = open_store(&config, &workspace)?;

    let healthy = store
        .health_check()
        .await
        .with_context(|| format!("{} store is not reachable", store.name()))?;
    if !healthy {
        anyhow::bail!("{} store reported unhealthy", store.name());
    }

    match config.store.backend {
        StoreBackend::Sqlite => {
            let path = config.sqlite_path(&workspace);
            info!("SQLite store ready at {}", path.display());
            print_info(&format!("Store:  {}", path.display()), global.quiet);
        }
        StoreBackend::Remote => {
            print_info(
                &format!("Store:  {} (remote)", config.store.remote.url),
                global.quiet,
            );
        }
    }

    Ok(())
}
