//! Export command - Write a project's canvas as JSON

use std::path::PathBuf;

use anyhow::{Context, Result};
use canvasync_config::{PersistenceConfig, SaveMode};
use canvasync_core::ProjectId;
use canvasync_engine::{Notifier, PersistenceController};
use clap::Args;

use super::{connect, print_info};
use crate::GlobalOptions;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Project to export
    #[arg(long)]
    project: ProjectId,

    /// Output file (defaults to stdout)
    #[arg(long, short = 'o')]
    out: Option<PathBuf>,
}

/// Execute the export command
pub async fn execute(args: ExportArgs, global: GlobalOptions) -> Result<()> {
    let (_, store) = connect(&global)?;
    let persistence = PersistenceConfig {
        mode: SaveMode::Manual,
        ..Default::default()
    };
    let controller = PersistenceController::new(store, persistence, Notifier::new());

    let source = controller
        .switch_project(Some(args.project))
        .await
        .context("Failed to load project")?;
    let state = controller.state();
    let json = serde_json::to_string_pretty(&state)?;

    match args.out {
        Some(ref path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_info(
                &format!(
                    "Exported {} nodes and {} edges from {:?} to {}",
                    state.nodes.len(),
                    state.edges.len(),
                    source,
                    path.display()
                ),
                global.quiet,
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}
