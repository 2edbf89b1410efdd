//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvasync_core::{
    CanvasState, Edge, Node, NodeData, NodeKind, Position, ProjectId, WorldBounds,
};
use canvasync_store::{
    ConflictPolicy, EdgeRecord, GraphStore, NodeRecord, SnapshotRecord, SqliteStore, StoreError,
};
use parking_lot::Mutex;

/// Deterministic store-compatible id
pub fn uuid_id(n: u64) -> String {
    format!("00000000-0000-4000-8000-{:012}", n)
}

pub fn task(id: impl Into<String>, x: f64, y: f64) -> Node {
    Node::new(id, NodeData::default_for(NodeKind::Task), Position::new(x, y))
}

/// SQLite-backed store that logs every call, fails and stalls on demand.
pub struct RecordingStore {
    inner: SqliteStore,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<StoreError>>>,
    delays: Mutex<HashMap<&'static str, VecDeque<Duration>>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Self::wrap(SqliteStore::in_memory().unwrap())
    }

    pub fn wrap(inner: SqliteStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        })
    }

    /// Make the next call to `op` fail with `error`.
    pub fn fail_next(&self, op: &'static str, error: StoreError) {
        self.failures.lock().entry(op).or_default().push_back(error);
    }

    /// Make the next `times` calls to `op` fail with a connection error.
    pub fn fail_times(&self, op: &'static str, times: usize) {
        for _ in 0..times {
            self.fail_next(op, StoreError::connection("injected failure"));
        }
    }

    /// Make the next call to `op` wait `delay` before answering.
    pub fn delay_next(&self, op: &'static str, delay: Duration) {
        self.delays.lock().entry(op).or_default().push_back(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Underlying store, bypassing recording and injected failures
    pub fn raw(&self) -> &SqliteStore {
        &self.inner
    }

    fn enter(&self, op: &'static str, detail: Option<&str>) -> Result<(), StoreError> {
        let name = match detail {
            Some(detail) => format!("{}:{}", op, detail),
            None => op.to_string(),
        };
        self.calls.lock().push(name);
        match self.failures.lock().get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn stall(&self, op: &'static str) {
        let delay = self.delays.lock().get_mut(op).and_then(VecDeque::pop_front);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GraphStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.enter("health_check", None)?;
        self.inner.health_check().await
    }

    async fn count_nodes(&self, project: ProjectId) -> Result<u64, StoreError> {
        self.enter("count_nodes", None)?;
        self.inner.count_nodes(project).await
    }

    async fn query_nodes_in_bounds(
        &self,
        project: ProjectId,
        bounds: &WorldBounds,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        self.enter("query_nodes_in_bounds", None)?;
        self.stall("query_nodes_in_bounds").await;
        self.inner.query_nodes_in_bounds(project, bounds, limit).await
    }

    async fn query_edges_by_node_ids(
        &self,
        project: ProjectId,
        node_ids: &[String],
    ) -> Result<Vec<EdgeRecord>, StoreError> {
        self.enter("query_edges_by_node_ids", None)?;
        self.inner.query_edges_by_node_ids(project, node_ids).await
    }

    async fn list_nodes(&self, project: ProjectId) -> Result<Vec<NodeRecord>, StoreError> {
        self.enter("list_nodes", None)?;
        self.inner.list_nodes(project).await
    }

    async fn list_edges(&self, project: ProjectId) -> Result<Vec<EdgeRecord>, StoreError> {
        self.enter("list_edges", None)?;
        self.inner.list_edges(project).await
    }

    async fn get_snapshot(&self, project: ProjectId) -> Result<Option<SnapshotRecord>, StoreError> {
        self.enter("get_snapshot", None)?;
        self.inner.get_snapshot(project).await
    }

    fn supports_snapshot_upsert(&self) -> bool {
        self.inner.supports_snapshot_upsert()
    }

    async fn upsert_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        self.enter("upsert_snapshot", None)?;
        self.inner.upsert_snapshot(project, state).await
    }

    async fn replace_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        self.enter("replace_snapshot", None)?;
        self.inner.replace_snapshot(project, state).await
    }

    async fn upsert_nodes(&self, records: &[NodeRecord], policy: ConflictPolicy) -> Result<(), StoreError> {
        self.enter("upsert_nodes", Some(policy.as_str()))?;
        self.inner.upsert_nodes(records, policy).await
    }

    async fn upsert_edges(&self, records: &[EdgeRecord], policy: ConflictPolicy) -> Result<(), StoreError> {
        self.enter("upsert_edges", Some(policy.as_str()))?;
        self.inner.upsert_edges(records, policy).await
    }

    async fn delete_nodes(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        self.enter("delete_nodes", None)?;
        self.inner.delete_nodes(project, ids).await
    }

    async fn delete_edges(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        self.enter("delete_edges", None)?;
        self.inner.delete_edges(project, ids).await
    }

    async fn delete_all_nodes(&self, project: ProjectId) -> Result<usize, StoreError> {
        self.enter("delete_all_nodes", None)?;
        self.inner.delete_all_nodes(project).await
    }

    async fn delete_all_edges(&self, project: ProjectId) -> Result<usize, StoreError> {
        self.enter("delete_all_edges", None)?;
        self.inner.delete_all_edges(project).await
    }
}

/// Write nodes and edges straight into the record tables.
pub async fn seed(store: &SqliteStore, project: ProjectId, nodes: &[Node], edges: &[Edge]) {
    let records: Vec<NodeRecord> = nodes.iter().map(|n| NodeRecord::from_node(project, n)).collect();
    store.upsert_nodes(&records, ConflictPolicy::Update).await.unwrap();
    let records: Vec<EdgeRecord> = edges.iter().map(|e| EdgeRecord::from_edge(project, e)).collect();
    store.upsert_edges(&records, ConflictPolicy::Update).await.unwrap();
}

/// `columns` x `rows` task nodes spaced `step_x` by `step_y` from the origin.
pub fn grid(columns: u64, rows: u64, step_x: f64, step_y: f64) -> Vec<Node> {
    let mut nodes = Vec::new();
    for row in 0..rows {
        for column in 0..columns {
            let n = row * columns + column + 1;
            nodes.push(task(
                uuid_id(n),
                column as f64 * step_x,
                row as f64 * step_y,
            ));
        }
    }
    nodes
}
