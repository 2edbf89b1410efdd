//! Viewport Lazy Loader
//!
//! Keeps the set of nodes and edges around the current viewport resident,
//! fetching from the graph store as the user pans and zooms:
//!
//! - Small projects (at most `small_canvas_threshold` nodes) are loaded whole.
//! - Larger projects are fetched one spatial chunk at a time through a
//!   bounded range query, merged by node id, and trimmed by distance-based
//!   eviction so memory stays bounded.
//!
//! Viewport updates are debounced; only the trailing update of a burst
//! touches the store. Every load is stamped with a generation so that
//! results superseded by a newer load, or belonging to an evicted chunk,
//! are dropped instead of merged.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canvasync_config::LoaderConfig;
use canvasync_core::{
    CacheMetrics, ChunkCache, ChunkKey, Edge, LoadDecision, MergeOutcome, Node, ProjectId,
    Viewport, WorldBounds,
};
use canvasync_store::{EdgeRecord, GraphStore, NodeRecord};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::controller::SavedHook;
use crate::error::LoadError;
use crate::notify::{Notice, Notifier};

// ============================================================================
// View
// ============================================================================

/// Load statistics shown in the debug overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugInfo {
    pub total_nodes: u64,
    pub loaded_nodes: usize,
    pub loaded_chunks: usize,
    pub query_time_ms: f64,
    /// Resident nodes plus edges
    pub memory_usage: usize,
    pub is_small_canvas: bool,
}

/// What the canvas should currently render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoaderView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub is_loading: bool,
    pub debug: DebugInfo,
}

/// How a load was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// No project, or the project changed while loading
    Idle,
    /// Whole project loaded at once
    SmallCanvas,
    /// One chunk fetched or served from cache
    Chunked,
}

/// Outcome of one [`ViewportLoader::load_viewport`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub strategy: LoadStrategy,
    pub generation: u64,
    pub chunk: Option<ChunkKey>,
    pub cache_hit: bool,
    pub merge: Option<MergeOutcome>,
    pub fetched_nodes: usize,
    pub evicted: Vec<ChunkKey>,
    pub total_nodes: u64,
    pub loaded_nodes: usize,
    pub loaded_edges: usize,
    pub query_time_ms: f64,
}

impl LoadReport {
    fn new(strategy: LoadStrategy, generation: u64) -> Self {
        Self {
            strategy,
            generation,
            chunk: None,
            cache_hit: false,
            merge: None,
            fetched_nodes: 0,
            evicted: Vec::new(),
            total_nodes: 0,
            loaded_nodes: 0,
            loaded_edges: 0,
            query_time_ms: 0.0,
        }
    }

    fn idle(generation: u64) -> Self {
        Self::new(LoadStrategy::Idle, generation)
    }
}

// ============================================================================
// Loader
// ============================================================================

struct CachedCount {
    project: ProjectId,
    value: u64,
    fetched_at: Instant,
}

#[derive(Default)]
struct LoaderState {
    project: Option<ProjectId>,
    /// Bumped on every project change; loads from an older epoch are dropped
    epoch: u64,
    /// Node payloads by id, restricted to the working set after each rebuild
    pool: HashMap<String, Node>,
    /// Working set in display order
    working: Vec<String>,
    /// Node ids of the whole project while in small-canvas mode
    small_ids: Vec<String>,
    edges: Vec<Edge>,
    total: Option<CachedCount>,
    small_canvas: bool,
    query_time_ms: f64,
    in_flight: usize,
    /// Newest generation that replaced the whole working set
    full_generation: u64,
    /// Bumped whenever nodes are merged into the working set
    merge_seq: u64,
    /// Merge sequence seen by the newest applied edge fetch
    edges_seq: u64,
}

struct LoaderInner {
    store: Arc<dyn GraphStore>,
    config: LoaderConfig,
    cache: ChunkCache,
    state: Mutex<LoaderState>,
    generation: AtomicU64,
    view_tx: watch::Sender<LoaderView>,
    notifier: Notifier,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Viewport-driven loader for one active project at a time.
pub struct ViewportLoader {
    inner: Arc<LoaderInner>,
}

impl ViewportLoader {
    pub fn new(store: Arc<dyn GraphStore>, config: LoaderConfig, notifier: Notifier) -> Self {
        let (view_tx, _) = watch::channel(LoaderView::default());
        Self {
            inner: Arc::new(LoaderInner {
                store,
                config,
                cache: ChunkCache::new(),
                state: Mutex::new(LoaderState::default()),
                generation: AtomicU64::new(0),
                view_tx,
                notifier,
                pending: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn project(&self) -> Option<ProjectId> {
        self.inner.state.lock().project
    }

    /// Switch to another project (or none), dropping everything loaded.
    pub fn set_project(&self, project: Option<ProjectId>) {
        self.cancel_pending();

        let mut state = self.inner.state.lock();
        let epoch = state.epoch + 1;
        *state = LoaderState {
            project,
            epoch,
            ..Default::default()
        };
        self.inner.cache.clear();
        self.inner.cache.reset_metrics();
        self.inner.publish(&state);

        match project {
            Some(project) => info!("Viewport loader switched to project {}", project),
            None => debug!("Viewport loader cleared"),
        }
    }

    /// Watch the rendered view.
    pub fn subscribe(&self) -> watch::Receiver<LoaderView> {
        self.inner.view_tx.subscribe()
    }

    /// Current view
    pub fn view(&self) -> LoaderView {
        self.inner.view_tx.borrow().clone()
    }

    pub fn debug_info(&self) -> DebugInfo {
        self.inner.view_tx.borrow().debug.clone()
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.inner.cache.metrics()
    }

    /// Resident chunk keys, most recently used first
    pub fn resident_chunks(&self) -> Vec<ChunkKey> {
        self.inner.cache.keys()
    }

    /// Forget the cached total node count so the next load re-counts.
    pub fn invalidate_total_count(&self) {
        self.inner.state.lock().total = None;
    }

    /// Hook that drops the cached count when its project is written.
    pub fn count_invalidator(&self) -> SavedHook {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |project: ProjectId| {
            let mut state = inner.state.lock();
            if state.total.as_ref().is_some_and(|t| t.project == project) {
                debug!("Total node count for project {} invalidated", project);
                state.total = None;
            }
        })
    }

    /// Record a viewport change; the load runs once updates go quiet.
    ///
    /// Each call restarts the debounce window, so a burst of pan or zoom
    /// events results in a single load for the last viewport.
    pub fn update_viewport(&self, viewport: Viewport, width: f64, height: f64) {
        if self.inner.state.lock().project.is_none() {
            return;
        }
        if let Err(e) = viewport.validate() {
            warn!("Ignoring viewport update: {}", e);
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Viewport update outside a tokio runtime ignored");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let delay = Duration::from_millis(self.inner.config.debounce_ms);

        let mut pending = self.inner.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached so that re-arming the timer never cancels a running load
            tokio::spawn(async move {
                if let Err(e) = inner.load(viewport, width, height).await {
                    debug!("Debounced viewport load failed: {}", e);
                }
            });
        }));
    }

    /// Load the content for `viewport` now, bypassing the debounce.
    pub async fn load_viewport(
        &self,
        viewport: Viewport,
        width: f64,
        height: f64,
    ) -> Result<LoadReport, LoadError> {
        self.inner.load(viewport, width, height).await
    }

    /// Drop a debounced load that has not started yet.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.inner.pending.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ViewportLoader {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl LoaderInner {
    async fn load(
        &self,
        viewport: Viewport,
        width: f64,
        height: f64,
    ) -> Result<LoadReport, LoadError> {
        viewport.validate().map_err(LoadError::InvalidViewport)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let bounds =
            WorldBounds::from_viewport(&viewport, width, height, self.config.buffer_fraction);

        let (project, epoch) = {
            let mut state = self.state.lock();
            let Some(project) = state.project else {
                return Ok(LoadReport::idle(generation));
            };
            state.in_flight += 1;
            self.publish(&state);
            (project, state.epoch)
        };

        let result = self.run(project, epoch, generation, bounds).await;

        {
            let mut state = self.state.lock();
            if state.epoch == epoch {
                state.in_flight = state.in_flight.saturating_sub(1);
                self.publish(&state);
            }
        }

        if let Err(ref e) = result {
            warn!("Viewport load failed for project {}: {}", project, e);
            self.notifier.emit(Notice::error(
                "Loading Error",
                "Failed to load canvas content. Please try refreshing.",
            ));
        }
        result
    }

    async fn run(
        &self,
        project: ProjectId,
        epoch: u64,
        generation: u64,
        bounds: WorldBounds,
    ) -> Result<LoadReport, LoadError> {
        let total = self.total_count(project, epoch).await?;

        if total <= self.config.small_canvas_threshold {
            self.load_all(project, epoch, generation, total).await
        } else {
            self.load_chunk(project, epoch, generation, bounds, total)
                .await
        }
    }

    async fn total_count(&self, project: ProjectId, epoch: u64) -> Result<u64, LoadError> {
        let ttl = Duration::from_millis(self.config.count_ttl_ms);
        {
            let state = self.state.lock();
            if let Some(ref cached) = state.total {
                if cached.project == project && cached.fetched_at.elapsed() < ttl {
                    return Ok(cached.value);
                }
            }
        }

        let value = self
            .store
            .count_nodes(project)
            .await
            .map_err(|e| LoadError::fetch("count", e))?;

        let mut state = self.state.lock();
        if state.epoch == epoch {
            state.total = Some(CachedCount {
                project,
                value,
                fetched_at: Instant::now(),
            });
        }
        Ok(value)
    }

    async fn load_all(
        &self,
        project: ProjectId,
        epoch: u64,
        generation: u64,
        total: u64,
    ) -> Result<LoadReport, LoadError> {
        let started = Instant::now();
        let records = self
            .store
            .list_nodes(project)
            .await
            .map_err(|e| LoadError::fetch("nodes", e))?;
        let edge_records = self
            .store
            .list_edges(project)
            .await
            .map_err(|e| LoadError::fetch("edges", e))?;
        let query_time_ms = elapsed_ms(started);

        let nodes = decode_nodes(records);
        let edges: Vec<Edge> = edge_records.into_iter().map(EdgeRecord::into_edge).collect();

        let mut state = self.state.lock();
        if state.epoch != epoch || generation < state.full_generation {
            return Ok(LoadReport::idle(generation));
        }

        self.cache.clear();
        state.full_generation = generation;
        state.merge_seq += 1;
        state.edges_seq = state.merge_seq;
        state.small_canvas = true;
        state.small_ids = nodes.iter().map(|n| n.id.clone()).collect();
        state.pool = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        state.edges = edges;
        state.query_time_ms = query_time_ms;
        self.rebuild(&mut state);
        self.publish(&state);

        debug!(
            "Loaded all {} nodes and {} edges in {:.2}ms",
            state.working.len(),
            state.edges.len(),
            query_time_ms
        );

        let mut report = LoadReport::new(LoadStrategy::SmallCanvas, generation);
        report.fetched_nodes = state.working.len();
        report.total_nodes = total;
        report.loaded_nodes = state.working.len();
        report.loaded_edges = state.edges.len();
        report.query_time_ms = query_time_ms;
        Ok(report)
    }

    async fn load_chunk(
        &self,
        project: ProjectId,
        epoch: u64,
        generation: u64,
        bounds: WorldBounds,
        total: u64,
    ) -> Result<LoadReport, LoadError> {
        let key = ChunkKey::for_bounds(&bounds, self.config.chunk_size);
        let mut report = LoadReport::new(LoadStrategy::Chunked, generation);
        report.chunk = Some(key);
        report.total_nodes = total;

        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return Ok(LoadReport::idle(generation));
            }
            if state.small_canvas && generation > state.full_generation {
                // Project grew past the threshold
                state.small_canvas = false;
                state.small_ids.clear();
                state.full_generation = generation;
            }
        }

        match self.cache.begin_load(key, bounds, generation) {
            LoadDecision::CacheHit => {
                debug!("Using cached chunk {}", key);
                report.cache_hit = true;
            }
            LoadDecision::Fetch => {
                let started = Instant::now();
                let records = match self
                    .store
                    .query_nodes_in_bounds(project, &bounds, self.config.row_limit)
                    .await
                {
                    Ok(records) => records,
                    Err(e) => {
                        self.cache.fail_load(key, generation);
                        return Err(LoadError::fetch("chunk", e));
                    }
                };
                let query_time_ms = elapsed_ms(started);

                let nodes = decode_nodes(records);
                report.fetched_nodes = nodes.len();
                let ids = nodes.iter().map(|n| n.id.clone()).collect();

                let outcome = {
                    let mut state = self.state.lock();
                    if state.epoch != epoch {
                        return Ok(LoadReport::idle(generation));
                    }
                    let outcome = self.cache.complete_load(key, generation, ids);
                    if outcome == MergeOutcome::Merged {
                        state.merge_seq += 1;
                        for node in nodes {
                            state.pool.insert(node.id.clone(), node);
                        }
                        state.query_time_ms = query_time_ms;
                        self.rebuild(&mut state);
                        self.publish(&state);
                        debug!(
                            "Loaded chunk {} ({} nodes) in {:.2}ms",
                            key, report.fetched_nodes, query_time_ms
                        );
                    } else {
                        debug!("Discarding {:?} result for chunk {}", outcome, key);
                    }
                    outcome
                };
                report.merge = Some(outcome);

                if outcome == MergeOutcome::Merged {
                    self.load_edges(project, epoch).await?;
                }
            }
        }

        let evicted = self.cache.evict_for(
            bounds.center(),
            self.config.eviction_distance,
            self.config.max_chunks,
        );
        if !evicted.is_empty() {
            debug!("Evicted {} distant chunks", evicted.len());
        }

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Ok(LoadReport::idle(generation));
        }
        self.rebuild(&mut state);
        self.publish(&state);

        report.evicted = evicted;
        report.loaded_nodes = state.working.len();
        report.loaded_edges = state.edges.len();
        report.query_time_ms = state.query_time_ms;
        Ok(report)
    }

    /// Fetch edges touching the working set.
    ///
    /// Chunk loads may complete out of order, so a fetch is applied unless a
    /// newer one has already seen every merge this one saw.
    async fn load_edges(&self, project: ProjectId, epoch: u64) -> Result<(), LoadError> {
        let (seq, ids) = {
            let state = self.state.lock();
            (state.merge_seq, self.cache.resident_node_ids())
        };
        let records = if ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .query_edges_by_node_ids(project, &ids)
                .await
                .map_err(|e| LoadError::fetch("edges", e))?
        };

        let mut state = self.state.lock();
        if state.epoch != epoch || seq < state.edges_seq {
            return Ok(());
        }
        state.edges_seq = seq;
        state.edges = records.into_iter().map(EdgeRecord::into_edge).collect();
        self.rebuild(&mut state);
        self.publish(&state);
        Ok(())
    }

    /// Recompute the working set from resident chunks and drop everything else.
    fn rebuild(&self, state: &mut LoaderState) {
        let ids = if state.small_canvas {
            state.small_ids.clone()
        } else {
            self.cache.resident_node_ids()
        };

        let keep: HashSet<&str> = ids.iter().map(String::as_str).collect();
        state.pool.retain(|id, _| keep.contains(id.as_str()));
        if !state.small_canvas {
            state
                .edges
                .retain(|e| keep.contains(e.source.as_str()) || keep.contains(e.target.as_str()));
        }
        state.working = ids;
    }

    fn publish(&self, state: &LoaderState) {
        let nodes: Vec<Node> = state
            .working
            .iter()
            .filter_map(|id| state.pool.get(id).cloned())
            .collect();
        let edges = state.edges.clone();

        let debug = DebugInfo {
            total_nodes: state.total.as_ref().map(|t| t.value).unwrap_or(0),
            loaded_nodes: nodes.len(),
            loaded_chunks: self.cache.loaded_count(),
            query_time_ms: state.query_time_ms,
            memory_usage: nodes.len() + edges.len(),
            is_small_canvas: state.small_canvas,
        };

        self.view_tx.send_replace(LoaderView {
            nodes,
            edges,
            is_loading: state.in_flight > 0,
            debug,
        });
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Decode store rows, skipping any that do not describe a valid node.
pub(crate) fn decode_nodes(records: Vec<NodeRecord>) -> Vec<Node> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            match record.into_node() {
                Ok(node) => Some(node),
                Err(e) => {
                    warn!("Skipping node {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasync_core::{NodeData, NodeKind, Position};
    use canvasync_store::{ConflictPolicy, SqliteStore};
    use serde_json::json;

    fn record(project: ProjectId, id: &str, node_type: &str) -> NodeRecord {
        NodeRecord {
            id: id.to_string(),
            project_id: project,
            node_type: node_type.to_string(),
            position_x: 10,
            position_y: 20,
            width: 200,
            height: 100,
            content: json!({}),
            style: json!({}),
        }
    }

    #[test]
    fn test_decode_skips_unknown_kinds() {
        let project = ProjectId::random();
        let nodes = decode_nodes(vec![
            record(project, "a", "task"),
            record(project, "b", "default"),
            record(project, "c", "team"),
        ]);

        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_no_project_is_idle() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let loader = ViewportLoader::new(store, LoaderConfig::default(), Notifier::new());

        let report = loader
            .load_viewport(Viewport::default(), 1200.0, 800.0)
            .await
            .unwrap();
        assert_eq!(report.strategy, LoadStrategy::Idle);
        assert!(!loader.view().is_loading);
    }

    #[tokio::test]
    async fn test_count_is_cached_until_invalidated() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let project = ProjectId::random();
        let loader = ViewportLoader::new(store.clone(), LoaderConfig::default(), Notifier::new());
        loader.set_project(Some(project));

        loader
            .load_viewport(Viewport::default(), 1200.0, 800.0)
            .await
            .unwrap();
        assert_eq!(loader.debug_info().total_nodes, 0);

        let node = Node::new(
            uuid_like(1),
            NodeData::default_for(NodeKind::Task),
            Position::new(0.0, 0.0),
        );
        store
            .upsert_nodes(&[NodeRecord::from_node(project, &node)], ConflictPolicy::Update)
            .await
            .unwrap();

        loader
            .load_viewport(Viewport::default(), 1200.0, 800.0)
            .await
            .unwrap();
        assert_eq!(loader.debug_info().total_nodes, 0);

        loader.invalidate_total_count();
        let report = loader
            .load_viewport(Viewport::default(), 1200.0, 800.0)
            .await
            .unwrap();
        assert_eq!(report.total_nodes, 1);
        assert_eq!(loader.view().nodes.len(), 1);
    }

    fn uuid_like(n: u32) -> String {
        format!("00000000-0000-4000-8000-{:012}", n)
    }
}
