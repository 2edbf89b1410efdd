//! Canvas Persistence Controller
//!
//! Owns the authoritative `{nodes, edges, viewport}` state of the active
//! project and is the only writer to the graph store. Local mutations are
//! applied synchronously; persistence happens either after a quiet period
//! (debounced mode) or on explicit request (manual mode).
//!
//! A save normalizes ids, skips the write when the state is unchanged since
//! the last successful save, writes the snapshot blob, then mirrors the
//! difference into the per-record node and connection tables.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canvasync_config::{PersistenceConfig, SaveMode};
use canvasync_core::{
    apply_rewrites, normalize, CanvasPatch, CanvasState, Edge, FileCard, Node, NodeData,
    NodeKind, Normalized, Position, ProjectId, StateDigest, Viewport,
};
use canvasync_store::{ConflictPolicy, EdgeRecord, GraphStore, NodeRecord, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{LoadError, SaveError};
use crate::loader::decode_nodes;
use crate::notify::{Notice, Notifier};

/// Callback that places a dropped file on the canvas and returns the new node id.
///
/// Handed to the file sidebar explicitly instead of living in a global slot.
pub type AddFileNode = Arc<dyn Fn(FileCard, Position) -> String + Send + Sync>;

/// Called with the project after every save that wrote to the store,
/// including debounced ones.
pub type SavedHook = Arc<dyn Fn(ProjectId) + Send + Sync>;

const UNLOAD_WARNING: &str = "You have unsaved changes. Are you sure you want to leave?";

// ============================================================================
// Status Types
// ============================================================================

/// Save progress as shown next to the canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveStatus {
    pub is_saving: bool,
    pub last_saved: Option<DateTime<Utc>>,
    pub has_unsaved_changes: bool,
    pub error: Option<String>,
}

/// What a save did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The state matched the last successful save; nothing was written
    Unchanged,
    /// The snapshot was written. `record_warning` is set when a per-record
    /// table could not be updated; those tables are resynced on the next save.
    Saved { record_warning: Option<String> },
}

impl SaveOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

/// Answer to "may the page be closed now?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnloadGuard {
    Allow,
    Warn(String),
}

/// Where a loaded canvas came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// The denormalized snapshot blob
    Snapshot,
    /// Reconstructed from the node and connection tables
    Records,
    /// Nothing stored yet
    Empty,
}

// ============================================================================
// Controller
// ============================================================================

struct Persisted {
    digest: StateDigest,
    state: CanvasState,
}

#[derive(Default)]
struct Document {
    project: Option<ProjectId>,
    /// Bumped on every project switch
    generation: u64,
    /// Bumped on every local mutation
    revision: u64,
    /// Whether `state` reflects a successful load of `project`
    loaded: bool,
    state: CanvasState,
    persisted: Option<Persisted>,
    /// Per-record tables may be out of sync and need a full rewrite
    resync_records: bool,
}

struct ControllerInner {
    store: Arc<dyn GraphStore>,
    config: PersistenceConfig,
    notifier: Notifier,
    doc: Mutex<Document>,
    state_tx: watch::Sender<CanvasState>,
    status_tx: watch::Sender<SaveStatus>,
    /// Single in-flight save; project switches and reloads also hold it
    save_slot: tokio::sync::Mutex<()>,
    pending: Mutex<Option<JoinHandle<()>>>,
    next_local_id: AtomicU64,
    is_loading: AtomicBool,
    on_saved: Mutex<Option<SavedHook>>,
}

/// Single writer of canvas state for the active project.
#[derive(Clone)]
pub struct PersistenceController {
    inner: Arc<ControllerInner>,
}

impl PersistenceController {
    pub fn new(store: Arc<dyn GraphStore>, config: PersistenceConfig, notifier: Notifier) -> Self {
        let (state_tx, _) = watch::channel(CanvasState::default());
        let (status_tx, _) = watch::channel(SaveStatus::default());
        let seed = Utc::now().timestamp_millis().max(0) as u64;

        Self {
            inner: Arc::new(ControllerInner {
                store,
                config,
                notifier,
                doc: Mutex::new(Document::default()),
                state_tx,
                status_tx,
                save_slot: tokio::sync::Mutex::new(()),
                pending: Mutex::new(None),
                next_local_id: AtomicU64::new(seed),
                is_loading: AtomicBool::new(false),
                on_saved: Mutex::new(None),
            }),
        }
    }

    pub fn mode(&self) -> SaveMode {
        self.inner.config.mode
    }

    pub fn project(&self) -> Option<ProjectId> {
        self.inner.doc.lock().project
    }

    /// Copy of the current canvas state
    pub fn state(&self) -> CanvasState {
        self.inner.doc.lock().state.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CanvasState> {
        self.inner.state_tx.subscribe()
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.is_loading.load(Ordering::SeqCst)
    }

    /// Run `hook` after each save that wrote the snapshot.
    pub fn set_on_saved(&self, hook: SavedHook) {
        *self.inner.on_saved.lock() = Some(hook);
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Merge a partial update into the state.
    ///
    /// Edges left without an endpoint are removed in the same step and
    /// returned.
    pub fn update_canvas(&self, patch: CanvasPatch) -> Vec<Edge> {
        let removed = self.mutate(|state| Some(state.apply(patch))).unwrap_or_default();
        if !removed.is_empty() {
            debug!("Removed {} edges left without an endpoint", removed.len());
        }
        removed
    }

    /// Add a node of `kind` with its default payload; returns the client id.
    pub fn add_node(&self, kind: NodeKind, position: Position) -> String {
        self.add_node_with(NodeData::default_for(kind), position)
    }

    pub fn add_node_with(&self, data: NodeData, position: Position) -> String {
        let id = self.local_id(data.kind().as_str());
        let node = Node::new(id.clone(), data, position);
        self.mutate(|state| {
            state.nodes.push(node);
            Some(())
        });
        id
    }

    pub fn add_file_node(&self, card: FileCard, position: Position) -> String {
        self.add_node_with(NodeData::File(card), position)
    }

    pub fn move_node(&self, id: &str, position: Position) -> bool {
        self.mutate(|state| {
            let node = state.node_mut(id)?;
            node.position = position;
            Some(())
        })
        .is_some()
    }

    pub fn update_node_data(&self, id: &str, data: NodeData) -> bool {
        self.mutate(|state| {
            let node = state.node_mut(id)?;
            node.data = data;
            Some(())
        })
        .is_some()
    }

    /// Delete a node and every edge touching it; returns the removed edges.
    pub fn remove_node(&self, id: &str) -> Option<Vec<Edge>> {
        self.mutate(|state| state.remove_node(id).map(|(_, edges)| edges))
    }

    /// Connect two existing nodes; returns the new edge id.
    pub fn connect(&self, source: &str, target: &str) -> Option<String> {
        let id = self.local_id("edge");
        self.mutate(|state| {
            if !state.contains_node(source) || !state.contains_node(target) {
                return None;
            }
            state.edges.push(Edge::new(id.clone(), source, target));
            Some(id)
        })
    }

    pub fn remove_edge(&self, id: &str) -> bool {
        self.mutate(|state| state.remove_edge(id)).is_some()
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.mutate(|state| {
            state.viewport = viewport;
            Some(())
        });
    }

    /// Callback for the file sidebar to drop files onto this canvas.
    pub fn file_drop_handler(&self) -> AddFileNode {
        let controller = self.clone();
        Arc::new(move |card: FileCard, position: Position| controller.add_file_node(card, position))
    }

    fn local_id(&self, prefix: &str) -> String {
        let n = self.inner.next_local_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", prefix, n)
    }

    /// Apply `f` to the state; `None` means nothing changed.
    fn mutate<T>(&self, f: impl FnOnce(&mut CanvasState) -> Option<T>) -> Option<T> {
        let result = {
            let mut doc = self.inner.doc.lock();
            let result = f(&mut doc.state)?;
            doc.revision += 1;
            self.inner.state_tx.send_replace(doc.state.clone());
            result
        };
        self.inner
            .status_tx
            .send_modify(|status| status.has_unsaved_changes = true);
        self.schedule_save();
        Some(result)
    }

    // ------------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------------

    fn schedule_save(&self) {
        if self.inner.config.mode != SaveMode::Debounced {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Canvas change outside a tokio runtime, debounced save not scheduled");
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
            // Detached so that re-arming the timer never cancels a running save
            tokio::spawn(async move {
                if let Err(e) = inner.save().await {
                    debug!("Debounced save failed: {}", e);
                }
            });
        }));
    }

    /// Drop a debounced save that has not started yet.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.inner.pending.lock().take() {
            handle.abort();
        }
    }

    /// Run the save pipeline now.
    pub async fn save(&self) -> Result<SaveOutcome, SaveError> {
        self.inner.save().await
    }

    /// Save on explicit request; `true` when the canvas is persisted.
    pub async fn manual_save(&self) -> bool {
        self.cancel_pending();
        match self.inner.save().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Manual save failed: {}", e);
                false
            }
        }
    }

    /// Save if there are unsaved changes.
    pub async fn flush(&self) -> Result<Option<SaveOutcome>, SaveError> {
        self.cancel_pending();
        if !self.status().has_unsaved_changes {
            return Ok(None);
        }
        self.inner.save().await.map(Some)
    }

    pub fn unload_guard(&self) -> UnloadGuard {
        if self.status().has_unsaved_changes {
            UnloadGuard::Warn(UNLOAD_WARNING.to_string())
        } else {
            UnloadGuard::Allow
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Make `project` the active project.
    ///
    /// Unsaved changes are first saved against the previous project.
    pub async fn switch_project(
        &self,
        project: Option<ProjectId>,
    ) -> Result<LoadSource, LoadError> {
        self.cancel_pending();
        let _slot = self.inner.save_slot.lock().await;

        let previous = self.inner.doc.lock().project;
        if previous.is_some() && self.status().has_unsaved_changes {
            info!("Saving unsaved changes before leaving project");
            if let Err(e) = self.inner.save_locked().await {
                warn!("Could not save changes before switching projects: {}", e);
            }
        }

        let generation = {
            let mut doc = self.inner.doc.lock();
            let generation = doc.generation + 1;
            *doc = Document {
                project,
                generation,
                ..Default::default()
            };
            self.inner.state_tx.send_replace(CanvasState::default());
            self.inner.status_tx.send_replace(SaveStatus::default());
            generation
        };

        match project {
            Some(project) => self.inner.load_locked(project, generation).await,
            None => Ok(LoadSource::Empty),
        }
    }

    /// Reload the active project from the store, discarding local changes.
    pub async fn load_project(&self) -> Result<LoadSource, LoadError> {
        self.cancel_pending();
        let _slot = self.inner.save_slot.lock().await;

        let (project, generation) = {
            let doc = self.inner.doc.lock();
            (doc.project, doc.generation)
        };
        match project {
            Some(project) => self.inner.load_locked(project, generation).await,
            None => Ok(LoadSource::Empty),
        }
    }
}

impl ControllerInner {
    async fn save(&self) -> Result<SaveOutcome, SaveError> {
        let _slot = self.save_slot.lock().await;
        self.save_locked().await
    }

    /// Save pipeline; the caller holds `save_slot`.
    async fn save_locked(&self) -> Result<SaveOutcome, SaveError> {
        let (project, generation, revision, candidate) = {
            let doc = self.doc.lock();
            let Some(project) = doc.project else {
                return Err(SaveError::NoProject);
            };
            if !doc.loaded {
                return Err(SaveError::NotLoaded(project));
            }
            (project, doc.generation, doc.revision, doc.state.clone())
        };

        // Store-compatible ids, written back before anything is persisted
        let Normalized {
            state: candidate,
            changed,
            rewrites,
            edge_rewrites,
        } = normalize(&candidate);
        if changed {
            let mut doc = self.doc.lock();
            if doc.generation == generation {
                if doc.revision == revision {
                    doc.state = candidate.clone();
                } else {
                    apply_rewrites(&mut doc.state, &rewrites, &edge_rewrites);
                }
                self.state_tx.send_replace(doc.state.clone());
            }
            debug!(
                "Normalized {} node ids and {} edge ids",
                rewrites.len(),
                edge_rewrites.len()
            );
        }

        let digest = StateDigest::of(&candidate)?;
        let (base, resync) = {
            let doc = self.doc.lock();
            if !doc.resync_records {
                if let Some(ref persisted) = doc.persisted {
                    if persisted.digest == digest {
                        if doc.revision == revision {
                            self.status_tx
                                .send_modify(|status| status.has_unsaved_changes = false);
                        }
                        debug!("Canvas for project {} unchanged, skipping save", project);
                        return Ok(SaveOutcome::Unchanged);
                    }
                }
            }
            let base = if doc.resync_records {
                None
            } else {
                doc.persisted.as_ref().map(|p| p.state.clone())
            };
            (base, doc.resync_records)
        };

        self.status_tx.send_modify(|status| status.is_saving = true);

        let snapshot = if self.store.supports_snapshot_upsert() {
            self.store.upsert_snapshot(project, &candidate).await
        } else {
            self.store.replace_snapshot(project, &candidate).await
        };
        if let Err(e) = snapshot {
            error!("Failed to save canvas for project {}: {}", project, e);
            let message = e.to_string();
            self.status_tx.send_modify(|status| {
                status.is_saving = false;
                status.has_unsaved_changes = true;
                status.error = Some(message);
            });
            self.notifier.emit(Notice::error(
                "Save Error",
                "Failed to save canvas changes. Please try again.",
            ));
            return Err(SaveError::Snapshot(e));
        }

        let mut warnings = Vec::new();
        if let Err(e) = self.write_nodes(project, base.as_ref(), &candidate).await {
            warn!("Node records for project {} not updated: {}", project, e);
            warnings.push(format!("node records: {}", e));
        }
        if let Err(e) = self.write_edges(project, base.as_ref(), &candidate).await {
            warn!("Connection records for project {} not updated: {}", project, e);
            warnings.push(format!("connection records: {}", e));
        }
        let record_warning = if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("; "))
        };

        {
            let mut doc = self.doc.lock();
            if doc.generation == generation {
                doc.resync_records = record_warning.is_some();
                let unsaved = doc.revision != revision;
                let warning = record_warning.clone();
                doc.persisted = Some(Persisted {
                    digest,
                    state: candidate,
                });
                self.status_tx.send_modify(|status| {
                    status.is_saving = false;
                    status.last_saved = Some(Utc::now());
                    status.has_unsaved_changes = unsaved;
                    status.error = warning;
                });
            }
        }

        info!(
            "Saved canvas for project {}{}",
            project,
            if resync { " (records resynced)" } else { "" }
        );
        let hook = self.on_saved.lock().clone();
        if let Some(hook) = hook {
            hook(project);
        }
        Ok(SaveOutcome::Saved { record_warning })
    }

    /// Mirror node changes into the record table.
    ///
    /// With no `base` every record is rewritten and rows missing from
    /// `next` are deleted.
    async fn write_nodes(
        &self,
        project: ProjectId,
        base: Option<&CanvasState>,
        next: &CanvasState,
    ) -> Result<(), StoreError> {
        if next.nodes.is_empty() {
            let removed = self.store.delete_all_nodes(project).await?;
            debug!("Cleared {} node records", removed);
            return Ok(());
        }

        let records: Vec<NodeRecord> = next
            .nodes
            .iter()
            .map(|n| NodeRecord::from_node(project, n))
            .collect();
        let live: HashSet<&str> = next.nodes.iter().map(|n| n.id.as_str()).collect();

        match base {
            Some(base) => {
                let before: HashMap<&str, NodeRecord> = base
                    .nodes
                    .iter()
                    .map(|n| (n.id.as_str(), NodeRecord::from_node(project, n)))
                    .collect();

                let removed: Vec<String> = before
                    .keys()
                    .filter(|id| !live.contains(*id))
                    .map(|id| id.to_string())
                    .collect();
                if !removed.is_empty() {
                    self.store.delete_nodes(project, &removed).await?;
                }

                let changed: Vec<NodeRecord> = records
                    .into_iter()
                    .filter(|r| before.get(r.id.as_str()) != Some(r))
                    .collect();
                debug!(
                    "Node records: {} changed, {} removed",
                    changed.len(),
                    removed.len()
                );
                self.upsert_nodes(&changed).await
            }
            None => {
                self.upsert_nodes(&records).await?;
                let stale: Vec<String> = self
                    .store
                    .list_nodes(project)
                    .await?
                    .into_iter()
                    .map(|r| r.id)
                    .filter(|id| !live.contains(id.as_str()))
                    .collect();
                if !stale.is_empty() {
                    self.store.delete_nodes(project, &stale).await?;
                }
                debug!("Node records resynced, {} stale rows removed", stale.len());
                Ok(())
            }
        }
    }

    /// Mirror edge changes into the connection table.
    async fn write_edges(
        &self,
        project: ProjectId,
        base: Option<&CanvasState>,
        next: &CanvasState,
    ) -> Result<(), StoreError> {
        if next.edges.is_empty() {
            let removed = self.store.delete_all_edges(project).await?;
            debug!("Cleared {} connection records", removed);
            return Ok(());
        }

        let records: Vec<EdgeRecord> = next
            .edges
            .iter()
            .map(|e| EdgeRecord::from_edge(project, e))
            .collect();
        let live: HashSet<&str> = next.edges.iter().map(|e| e.id.as_str()).collect();

        match base {
            Some(base) => {
                let before: HashMap<&str, EdgeRecord> = base
                    .edges
                    .iter()
                    .map(|e| (e.id.as_str(), EdgeRecord::from_edge(project, e)))
                    .collect();

                let removed: Vec<String> = before
                    .keys()
                    .filter(|id| !live.contains(*id))
                    .map(|id| id.to_string())
                    .collect();
                if !removed.is_empty() {
                    self.store.delete_edges(project, &removed).await?;
                }

                let changed: Vec<EdgeRecord> = records
                    .into_iter()
                    .filter(|r| before.get(r.id.as_str()) != Some(r))
                    .collect();
                self.upsert_edges(&changed).await
            }
            None => {
                self.upsert_edges(&records).await?;
                let stale: Vec<String> = self
                    .store
                    .list_edges(project)
                    .await?
                    .into_iter()
                    .map(|r| r.id)
                    .filter(|id| !live.contains(id.as_str()))
                    .collect();
                if !stale.is_empty() {
                    self.store.delete_edges(project, &stale).await?;
                }
                Ok(())
            }
        }
    }

    /// Upsert with one retry that skips rows owned elsewhere.
    async fn upsert_nodes(&self, records: &[NodeRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        match self.store.upsert_nodes(records, ConflictPolicy::Update).await {
            Err(e) if e.is_conflict() => {
                warn!("Node upsert conflicted, retrying with duplicates ignored: {}", e);
                self.store.upsert_nodes(records, ConflictPolicy::Ignore).await
            }
            other => other,
        }
    }

    async fn upsert_edges(&self, records: &[EdgeRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        match self.store.upsert_edges(records, ConflictPolicy::Update).await {
            Err(e) if e.is_conflict() => {
                warn!("Connection upsert conflicted, retrying with duplicates ignored: {}", e);
                self.store.upsert_edges(records, ConflictPolicy::Ignore).await
            }
            other => other,
        }
    }

    /// Load `project` into the document; the caller holds `save_slot`.
    async fn load_locked(
        &self,
        project: ProjectId,
        generation: u64,
    ) -> Result<LoadSource, LoadError> {
        self.is_loading.store(true, Ordering::SeqCst);
        let fetched = self.fetch_canvas(project).await;
        self.is_loading.store(false, Ordering::SeqCst);

        let mut doc = self.doc.lock();
        if doc.generation != generation {
            return Ok(LoadSource::Empty);
        }

        match fetched {
            Ok((state, source, records_stale)) => {
                info!(
                    "Loaded canvas for project {} from {:?}: {} nodes, {} edges",
                    project,
                    source,
                    state.nodes.len(),
                    state.edges.len()
                );
                doc.persisted = match StateDigest::of(&state) {
                    Ok(digest) => Some(Persisted {
                        digest,
                        state: state.clone(),
                    }),
                    Err(e) => {
                        warn!("Could not fingerprint loaded canvas: {}", e);
                        None
                    }
                };
                doc.resync_records = records_stale || doc.persisted.is_none();
                doc.loaded = true;
                doc.state = state;
                self.state_tx.send_replace(doc.state.clone());
                self.status_tx.send_replace(SaveStatus::default());
                Ok(source)
            }
            Err(e) => {
                error!("Failed to load canvas for project {}: {}", project, e);
                doc.loaded = false;
                doc.persisted = None;
                doc.state = CanvasState::default();
                self.state_tx.send_replace(CanvasState::default());
                self.status_tx.send_replace(SaveStatus {
                    error: Some(e.to_string()),
                    ..Default::default()
                });
                self.notifier.emit(Notice::error(
                    "Load Error",
                    "Failed to load canvas. Using empty canvas.",
                ));
                Err(e)
            }
        }
    }

    /// Read a project's canvas, preferring a non-empty snapshot over records.
    ///
    /// Returns the state, its source and whether the record tables have to
    /// be rewritten on the next save to match it.
    async fn fetch_canvas(
        &self,
        project: ProjectId,
    ) -> Result<(CanvasState, LoadSource, bool), LoadError> {
        let snapshot = match self.store.get_snapshot(project).await {
            Ok(snapshot) => snapshot,
            Err(e @ (StoreError::Serialization(_) | StoreError::Model(_))) => {
                warn!(
                    "Snapshot for project {} is unreadable, rebuilding from records: {}",
                    project, e
                );
                None
            }
            Err(e) => return Err(LoadError::fetch("snapshot", e)),
        };

        let viewport = snapshot
            .as_ref()
            .map(|s| s.canvas_data.viewport)
            .filter(|v| v.validate().is_ok())
            .unwrap_or_default();

        let (mut state, source) = match snapshot {
            Some(snapshot) if !snapshot.canvas_data.nodes.is_empty() => {
                let mut state = snapshot.canvas_data;
                if let Err(e) = state.viewport.validate() {
                    warn!("Stored viewport for project {} reset: {}", project, e);
                    state.viewport = Viewport::default();
                }
                (state, LoadSource::Snapshot)
            }
            _ => {
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

                let nodes = decode_nodes(records);
                let edges: Vec<Edge> = edge_records.into_iter().map(EdgeRecord::into_edge).collect();
                let source = if nodes.is_empty() && edges.is_empty() {
                    LoadSource::Empty
                } else {
                    LoadSource::Records
                };
                (CanvasState::new(nodes, edges, viewport), source)
            }
        };

        let pruned = state.prune_dangling_edges();
        if !pruned.is_empty() {
            warn!(
                "Dropped {} edges referencing missing nodes in project {}",
                pruned.len(),
                project
            );
        }

        let records_stale = !pruned.is_empty()
            || (source == LoadSource::Snapshot && !self.records_match(project, &state).await);
        Ok((state, source, records_stale))
    }

    /// Whether the record tables hold exactly the rows `state` maps to.
    ///
    /// A save whose record write failed leaves the snapshot ahead of the
    /// tables the viewport loader reads.
    async fn records_match(&self, project: ProjectId, state: &CanvasState) -> bool {
        let (nodes, edges) = match (
            self.store.list_nodes(project).await,
            self.store.list_edges(project).await,
        ) {
            (Ok(nodes), Ok(edges)) => (nodes, edges),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Could not compare records for project {}: {}", project, e);
                return false;
            }
        };

        let stored: HashMap<String, NodeRecord> =
            nodes.into_iter().map(|r| (r.id.clone(), r)).collect();
        let nodes_match = stored.len() == state.nodes.len()
            && state
                .nodes
                .iter()
                .all(|n| stored.get(&n.id) == Some(&NodeRecord::from_node(project, n)));

        let stored: HashMap<String, EdgeRecord> =
            edges.into_iter().map(|r| (r.id.clone(), r)).collect();
        let edges_match = stored.len() == state.edges.len()
            && state
                .edges
                .iter()
                .all(|e| stored.get(&e.id) == Some(&EdgeRecord::from_edge(project, e)));

        if !(nodes_match && edges_match) {
            warn!(
                "Records for project {} differ from its snapshot, resyncing on next save",
                project
            );
        }
        nodes_match && edges_match
    }
}
