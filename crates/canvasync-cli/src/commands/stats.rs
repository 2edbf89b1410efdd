//! Stats command - Show what the store holds for a project

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use canvasync_core::ProjectId;
use canvasync_store::GraphStore;
use clap::Args;
use serde::Serialize;

use super::connect;
use crate::GlobalOptions;

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Project to inspect
    #[arg(long)]
    project: ProjectId,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ProjectStats {
    project: ProjectId,
    store: String,
    node_records: u64,
    edge_records: usize,
    nodes_by_kind: BTreeMap<String, usize>,
    snapshot: Option<SnapshotStats>,
}

#[derive(Debug, Serialize)]
struct SnapshotStats {
    nodes: usize,
    edges: usize,
    updated_at: Option<String>,
}

/// Execute the stats command
pub async fn execute(args: StatsArgs, global: GlobalOptions) -> Result<()> {
    let (_, store) = connect(&global)?;
    let stats = collect(store.as_ref(), args.project).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Project {}", stats.project);
    println!("========================================\n");
    println!("Store:        {}", stats.store);
    println!("Node records: {}", stats.node_records);
    for (kind, count) in &stats.nodes_by_kind {
        println!("  {:<10} {}", kind, count);
    }
    println!("Edge records: {}", stats.edge_records);
    match stats.snapshot {
        Some(ref snapshot) => {
            println!(
                "Snapshot:     {} nodes, {} edges",
                snapshot.nodes, snapshot.edges
            );
            if let Some(ref updated) = snapshot.updated_at {
                println!("Updated:      {}", updated);
            }
        }
        None => println!("Snapshot:     none"),
    }

    Ok(())
}

async fn collect(store: &dyn GraphStore, project: ProjectId) -> Result<ProjectStats> {
    let node_records = store
        .count_nodes(project)
        .await
        .context("Failed to count nodes")?;
    let nodes = store
        .list_nodes(project)
        .await
        .context("Failed to list nodes")?;
    let edges = store
        .list_edges(project)
        .await
        .context("Failed to list edges")?;
    let snapshot = store
        .get_snapshot(project)
        .await
        .context("Failed to read snapshot")?;

    let mut nodes_by_kind = BTreeMap::new();
    for record in &nodes {
        *nodes_by_kind.entry(record.node_type.clone()).or_insert(0) += 1;
    }

    Ok(ProjectStats {
        project,
        store: store.name().to_string(),
        node_records,
        edge_records: edges.len(),
        nodes_by_kind,
        snapshot: snapshot.map(|s| SnapshotStats {
            nodes: s.canvas_data.nodes.len(),
            edges: s.canvas_data.edges.len(),
            updated_at: s.updated_at.map(|ts| ts.to_rfc3339()),
        }),
    })
}
