//! Import command - Replace a project's canvas from JSON

use std::path::PathBuf;

use anyhow::{Context, Result};
use canvasync_config::{PersistenceConfig, SaveMode};
use canvasync_core::{CanvasPatch, CanvasState, ProjectId};
use canvasync_engine::{Notifier, PersistenceController, SaveOutcome};
use clap::Args;

use super::{connect, print_info};
use crate::GlobalOptions;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Project to write into
    #[arg(long)]
    project: ProjectId,

    /// Canvas JSON file (`{nodes, edges, viewport}`)
    file: PathBuf,
}

/// Execute the import command
pub async fn execute(args: ImportArgs, global: GlobalOptions) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let incoming: CanvasState = serde_json::from_str(&content)
        .with_context(|| format!("Invalid canvas JSON in {}", args.file.display()))?;
    incoming
        .viewport
        .validate()
        .context("Invalid viewport in canvas JSON")?;

    let (_, store) = connect(&global)?;
    let persistence = PersistenceConfig {
        mode: SaveMode::Manual,
        ..Default::default()
    };
    let controller = PersistenceController::new(store, persistence, Notifier::new());
    controller
        .switch_project(Some(args.project))
        .await
        .context("Failed to load project")?;

    let dropped = controller.update_canvas(CanvasPatch {
        nodes: Some(incoming.nodes),
        edges: Some(incoming.edges),
        viewport: Some(incoming.viewport),
    });
    if !dropped.is_empty() {
        print_info(
            &format!("Dropped {} edges with missing endpoints", dropped.len()),
            global.quiet,
        );
    }

    match controller.save().await.context("Failed to save canvas")? {
        SaveOutcome::Unchanged => println!("Canvas unchanged, nothing written"),
        SaveOutcome::Saved { record_warning } => {
            if let Some(warning) = record_warning {
                eprintln!("warning: {}", warning);
            }
            let state = controller.state();
            println!(
                "Imported {} nodes and {} edges",
                state.nodes.len(),
                state.edges.len()
            );
        }
    }

    Ok(())
}
