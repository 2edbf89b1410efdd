//! View command - Load what a viewport would show

use anyhow::{Context, Result};
use canvasync_core::{ProjectId, Viewport};
use canvasync_engine::{Notifier, ViewportLoader};
use clap::Args;
use serde_json::json;

use super::connect;
use crate::GlobalOptions;

/// Arguments for the view command
#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Project to load
    #[arg(long)]
    project: ProjectId,

    /// Horizontal pan offset in screen pixels
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    x: f64,

    /// Vertical pan offset in screen pixels
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    y: f64,

    /// Zoom factor
    #[arg(long, default_value = "0.8")]
    zoom: f64,

    /// Canvas width in pixels (defaults to loader.default_canvas_width)
    #[arg(long)]
    width: Option<f64>,

    /// Canvas height in pixels (defaults to loader.default_canvas_height)
    #[arg(long)]
    height: Option<f64>,

    /// List the loaded node ids
    #[arg(long)]
    nodes: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the view command
pub async fn execute(args: ViewArgs, global: GlobalOptions) -> Result<()> {
    let viewport = Viewport::new(args.x, args.y, args.zoom).context("Invalid viewport")?;
    let (config, store) = connect(&global)?;
    let width = args.width.unwrap_or(config.loader.default_canvas_width);
    let height = args.height.unwrap_or(config.loader.default_canvas_height);

    let loader = ViewportLoader::new(store, config.loader.clone(), Notifier::new());
    loader.set_project(Some(args.project));
    let report = loader
        .load_viewport(viewport, width, height)
        .await
        .context("Failed to load viewport")?;
    let view = loader.view();

    if args.json {
        let mut output = json!({
            "report": report,
            "debug": view.debug,
            "cache": loader.cache_metrics(),
        });
        if args.nodes {
            output["node_ids"] = json!(view.nodes.iter().map(|n| &n.id).collect::<Vec<_>>());
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Viewport");
    println!("========\n");
    println!(
        "Position:     ({}, {}) at zoom {} on {}x{}",
        viewport.x, viewport.y, viewport.zoom, width, height
    );
    println!("Strategy:     {:?}", report.strategy);
    if let Some(chunk) = report.chunk {
        let source = if report.cache_hit { "cached" } else { "fetched" };
        println!("Chunk:        {} ({})", chunk, source);
    }
    if !report.evicted.is_empty() {
        let evicted: Vec<String> = report.evicted.iter().map(ToString::to_string).collect();
        println!("Evicted:      {}", evicted.join(", "));
    }

    let debug = &view.debug;
    println!("\nTotal nodes:  {}", debug.total_nodes);
    println!("Loaded nodes: {}", debug.loaded_nodes);
    println!("Loaded edges: {}", view.edges.len());
    println!("Chunks:       {}", debug.loaded_chunks);
    println!("Memory usage: {}", debug.memory_usage);
    println!("Query time:   {:.2}ms", debug.query_time_ms);
    println!("Small canvas: {}", debug.is_small_canvas);

    if args.nodes {
        println!();
        for node in &view.nodes {
            println!(
                "  {} {} ({}, {})",
                node.id,
                node.kind(),
                node.position.x,
                node.position.y
            );
        }
    }

    Ok(())
}
