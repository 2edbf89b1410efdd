//! SQLite store integration tests

use canvasync_core::{
    CanvasState, Edge, Node, NodeData, NodeKind, Position, ProjectId, Viewport, WorldBounds,
};
use canvasync_store::{
    ConflictPolicy, EdgeRecord, GraphStore, NodeRecord, SqliteStore, StoreError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use uuid::Uuid;

fn node_record(project: ProjectId, x: f64, y: f64) -> NodeRecord {
    let node = Node::new(
        Uuid::new_v4().to_string(),
        NodeData::default_for(NodeKind::Task),
        Position::new(x, y),
    );
    NodeRecord::from_node(project, &node)
}

fn edge_record(project: ProjectId, from: &str, to: &str) -> EdgeRecord {
    EdgeRecord::from_edge(project, &Edge::new(Uuid::new_v4().to_string(), from, to))
}

/// 200 nodes on a 20x10 grid spanning a 5000x5000 world area
fn seed_grid(project: ProjectId) -> Vec<NodeRecord> {
    let mut records = Vec::new();
    for row in 0..10 {
        for col in 0..20 {
            records.push(node_record(project, col as f64 * 250.0, row as f64 * 500.0));
        }
    }
    records
}

#[tokio::test]
async fn test_bounds_query_returns_only_contained_nodes() {
    let store = SqliteStore::in_memory().unwrap();
    let project = ProjectId::random();
    store.upsert_nodes(&seed_grid(project), ConflictPolicy::Update).await.unwrap();
    // Same coordinates in another project must not leak in
    store
        .upsert_nodes(&seed_grid(ProjectId::random()), ConflictPolicy::Update)
        .await
        .unwrap();

    let viewports = [
        Viewport::new(0.0, 0.0, 1.0).unwrap(),
        Viewport::new(-2000.0, -1500.0, 0.5).unwrap(),
        Viewport::new(-4000.0, -4000.0, 1.0).unwrap(),
        Viewport::new(300.0, 300.0, 2.0).unwrap(),
    ];

    for viewport in viewports {
        let bounds = WorldBounds::from_viewport(&viewport, 1200.0, 800.0, 0.2);
        let range = bounds.snapped();
        let records = store.query_nodes_in_bounds(project, &bounds, 75).await.unwrap();

        assert!(records.len() <= 75);
        for record in &records {
            assert_eq!(record.project_id, project);
            assert!(
                range.contains_point(record.position_x as f64, record.position_y as f64),
                "{:?} outside {:?}",
                (record.position_x, record.position_y),
                range
            );
        }
    }
}

#[tokio::test]
async fn test_bounds_query_respects_row_limit() {
    let store = SqliteStore::in_memory().unwrap();
    let project = ProjectId::random();
    store.upsert_nodes(&seed_grid(project), ConflictPolicy::Update).await.unwrap();

    let everything = WorldBounds::new(-10.0, -10.0, 10_000.0, 10_000.0);
    assert_eq!(store.query_nodes_in_bounds(project, &everything, 75).await.unwrap().len(), 75);
    assert_eq!(store.count_nodes(project).await.unwrap(), 200);
}

#[tokio::test]
async fn test_upsert_updates_existing_rows() {
    let store = SqliteStore::in_memory().unwrap();
    let project = ProjectId::random();
    let mut record = node_record(project, 0.0, 0.0);
    store.upsert_nodes(&[record.clone()], ConflictPolicy::Update).await.unwrap();

    record.position_x = 640;
    store.upsert_nodes(&[record.clone()], ConflictPolicy::Update).await.unwrap();

    let rows = store.list_nodes(project).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].position_x, 640);
}

#[tokio::test]
async fn test_foreign_id_conflicts_then_ignores() {
    let store = SqliteStore::in_memory().unwrap();
    let owner = ProjectId::random();
    let other = ProjectId::random();
    let record = node_record(owner, 0.0, 0.0);
    store.upsert_nodes(&[record.clone()], ConflictPolicy::Update).await.unwrap();

    let mut stolen = record.clone();
    stolen.project_id = other;
    let fresh = node_record(other, 10.0, 10.0);

    let err = store
        .upsert_nodes(&[fresh.clone(), stolen.clone()], ConflictPolicy::Update)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    // The batch is rolled back as a whole
    assert_eq!(store.count_nodes(other).await.unwrap(), 0);

    store
        .upsert_nodes(&[fresh, stolen], ConflictPolicy::Ignore)
        .await
        .unwrap();
    assert_eq!(store.count_nodes(other).await.unwrap(), 1);
    assert_eq!(store.count_nodes(owner).await.unwrap(), 1);
}

#[tokio::test]
async fn test_edges_by_node_ids_match_either_endpoint() {
    let store = SqliteStore::in_memory().unwrap();
    let project = ProjectId::random();
    let nodes: Vec<NodeRecord> = (0..4).map(|i| node_record(project, i as f64 * 100.0, 0.0)).collect();
    store.upsert_nodes(&nodes, ConflictPolicy::Update).await.unwrap();

    let ab = edge_record(project, &nodes[0].id, &nodes[1].id);
    let cb = edge_record(project, &nodes[2].id, &nodes[1].id);
    let cd = edge_record(project, &nodes[2].id, &nodes[3].id);
    store
        .upsert_edges(&[ab.clone(), cb.clone(), cd.clone()], ConflictPolicy::Update)
        .await
        .unwrap();

    let mut found: Vec<String> = store
        .query_edges_by_node_ids(project, &[nodes[1].id.clone()])
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    found.sort();
    let mut expected = vec![ab.id.clone(), cb.id.clone()];
    expected.sort();
    assert_eq!(found, expected);

    assert!(store.query_edges_by_node_ids(project, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_edge_upsert_rejects_non_uuid_endpoint() {
    let store = SqliteStore::in_memory().unwrap();
    let project = ProjectId::random();
    let record = edge_record(project, &Uuid::new_v4().to_string(), "task-1");

    let err = store.upsert_edges(&[record], ConflictPolicy::Update).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidId { ref id } if id == "task-1"));
}

#[tokio::test]
async fn test_replace_snapshot() {
    let store = SqliteStore::in_memory().unwrap().with_snapshot_upsert(false);
    assert!(!store.supports_snapshot_upsert());
    let project = ProjectId::random();

    assert!(store.get_snapshot(project).await.unwrap().is_none());

    let node = Node::new(
        Uuid::new_v4().to_string(),
        NodeData::default_for(NodeKind::Project),
        Position::new(1.0, 2.0),
    );
    let state = CanvasState::new(vec![node], vec![], Viewport::new(5.0, 6.0, 1.2).unwrap());
    store.replace_snapshot(project, &CanvasState::default()).await.unwrap();
    store.replace_snapshot(project, &state).await.unwrap();

    let snapshot = store.get_snapshot(project).await.unwrap().unwrap();
    assert_eq!(snapshot.project_id, project);
    assert_eq!(snapshot.canvas_data, state);
}

#[tokio::test]
async fn test_delete_all_is_project_scoped() {
    let store = SqliteStore::in_memory().unwrap();
    let p1 = ProjectId::random();
    let p2 = ProjectId::random();
    let a = node_record(p1, 0.0, 0.0);
    let b = node_record(p1, 1.0, 0.0);
    let c = node_record(p2, 0.0, 0.0);
    store.upsert_nodes(&[a.clone(), b.clone()], ConflictPolicy::Update).await.unwrap();
    store.upsert_nodes(&[c], ConflictPolicy::Update).await.unwrap();
    store
        .upsert_edges(&[edge_record(p1, &a.id, &b.id)], ConflictPolicy::Update)
        .await
        .unwrap();

    assert_eq!(store.delete_all_nodes(p1).await.unwrap(), 2);
    assert_eq!(store.delete_all_edges(p1).await.unwrap(), 1);
    assert_eq!(store.count_nodes(p1).await.unwrap(), 0);
    assert_eq!(store.count_nodes(p2).await.unwrap(), 1);
}

#[tokio::test]
async fn test_on_disk_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("canvas.db");
    let project = ProjectId::random();

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .upsert_nodes(&[node_record(project, 0.0, 0.0)], ConflictPolicy::Update)
            .await
            .unwrap();
        store.upsert_snapshot(project, &CanvasState::default()).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert_eq!(store.count_nodes(project).await.unwrap(), 1);
    assert!(store.get_snapshot(project).await.unwrap().is_some());
}
