//! Seed command - Fill a project with a grid of task nodes

use anyhow::{Context, Result};
use canvasync_config::{PersistenceConfig, SaveMode};
use canvasync_core::{CanvasPatch, NodeData, Position, ProjectId, TaskCard};
use canvasync_engine::{Notifier, PersistenceController, SaveOutcome};
use clap::Args;

use super::{connect, print_info};
use crate::GlobalOptions;

/// Arguments for the seed command
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Project to seed
    #[arg(long)]
    project: ProjectId,

    /// Number of nodes to add
    #[arg(long, default_value = "200")]
    count: usize,

    /// Side length of the square world area the grid covers
    #[arg(long, default_value = "5000")]
    extent: f64,

    /// Drop the existing canvas first
    #[arg(long)]
    replace: bool,

    /// Do not connect consecutive nodes
    #[arg(long)]
    no_edges: bool,
}

/// Execute the seed command
pub async fn execute(args: SeedArgs, global: GlobalOptions) -> Result<()> {
    if args.extent <= 0.0 || !args.extent.is_finite() {
        anyhow::bail!("--extent must be a positive number");
    }

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
    print_info(
        &format!("Loaded project {} ({:?})", args.project, source),
        global.quiet,
    );

    if args.replace {
        controller.update_canvas(CanvasPatch::nodes(Vec::new()));
    }

    let mut previous: Option<String> = None;
    let mut edges = 0;
    for (i, position) in grid_positions(args.count, args.extent).into_iter().enumerate() {
        let card = TaskCard {
            title: format!("Task {}", i + 1),
            ..Default::default()
        };
        let id = controller.add_node_with(NodeData::Task(card), position);
        if !args.no_edges {
            if let Some(ref prev) = previous {
                if controller.connect(prev, &id).is_some() {
                    edges += 1;
                }
            }
        }
        previous = Some(id);
    }

    let outcome = controller.save().await.context("Failed to save canvas")?;
    if let SaveOutcome::Saved {
        record_warning: Some(ref warning),
    } = outcome
    {
        eprintln!("warning: {}", warning);
    }

    let state = controller.state();
    println!(
        "Seeded {} nodes and {} edges ({} nodes, {} edges total)",
        args.count,
        edges,
        state.nodes.len(),
        state.edges.len()
    );
    Ok(())
}

/// Row-major positions of `count` nodes spread evenly over `extent` x `extent`.
fn grid_positions(count: usize, extent: f64) -> Vec<Position> {
    if count == 0 {
        return Vec::new();
    }
    let columns = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);
    let step_x = extent / columns as f64;
    let step_y = extent / rows as f64;

    (0..count)
        .map(|i| {
            let column = i % columns;
            let row = i / columns;
            Position::new(
                (column as f64 * step_x).round(),
                (row as f64 * step_y).round(),
            )
        })
        .collect()
}
