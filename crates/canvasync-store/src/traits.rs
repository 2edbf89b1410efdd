//! Graph store trait definition.
//!
//! Defines the async interface the loader and persistence controller use to
//! read and write a project's canvas.

use async_trait::async_trait;
use canvasync_core::{CanvasState, ProjectId, WorldBounds};

use crate::error::StoreError;
use crate::types::{ConflictPolicy, EdgeRecord, NodeRecord, SnapshotRecord};

/// Storage for canvas nodes, connections and snapshots.
///
/// Implemented by both the embedded SQLite store and the remote REST store.
/// All operations are async to support network-based stores.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short name of the implementation, for logs.
    fn name(&self) -> &str;

    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool, StoreError>;

    /// Count the node records of a project.
    async fn count_nodes(&self, project: ProjectId) -> Result<u64, StoreError>;

    /// Fetch node records positioned inside `bounds`.
    ///
    /// # Arguments
    /// * `project` - Project to query
    /// * `bounds` - World-space rectangle; the store widens it to whole units
    ///   (`floor` low edges, `ceil` high edges) and includes the edges
    /// * `limit` - Maximum number of rows
    async fn query_nodes_in_bounds(
        &self,
        project: ProjectId,
        bounds: &WorldBounds,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError>;

    /// Fetch edge records whose source or target is one of `node_ids`.
    ///
    /// An empty id list yields no edges without touching the store.
    async fn query_edges_by_node_ids(
        &self,
        project: ProjectId,
        node_ids: &[String],
    ) -> Result<Vec<EdgeRecord>, StoreError>;

    /// Fetch all node records of a project.
    async fn list_nodes(&self, project: ProjectId) -> Result<Vec<NodeRecord>, StoreError>;

    /// Fetch all edge records of a project.
    async fn list_edges(&self, project: ProjectId) -> Result<Vec<EdgeRecord>, StoreError>;

    /// Fetch the project's snapshot, if any.
    async fn get_snapshot(&self, project: ProjectId) -> Result<Option<SnapshotRecord>, StoreError>;

    /// Whether `upsert_snapshot` is a true update-or-insert by project id.
    fn supports_snapshot_upsert(&self) -> bool;

    /// Insert or update the project's snapshot.
    async fn upsert_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError>;

    /// Delete the project's snapshot and insert `state` in its place.
    async fn replace_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError>;

    /// Insert or update node records keyed by id.
    ///
    /// Under [`ConflictPolicy::Update`] an id that exists but may not be
    /// overwritten fails with [`StoreError::Conflict`]; under
    /// [`ConflictPolicy::Ignore`] such records are skipped.
    async fn upsert_nodes(&self, records: &[NodeRecord], policy: ConflictPolicy) -> Result<(), StoreError>;

    /// Insert or update edge records keyed by id.
    async fn upsert_edges(&self, records: &[EdgeRecord], policy: ConflictPolicy) -> Result<(), StoreError>;

    /// Delete the given node records. Returns the number removed.
    async fn delete_nodes(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError>;

    /// Delete the given edge records. Returns the number removed.
    async fn delete_edges(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError>;

    /// Delete every node record of a project.
    async fn delete_all_nodes(&self, project: ProjectId) -> Result<usize, StoreError>;

    /// Delete every edge record of a project.
    async fn delete_all_edges(&self, project: ProjectId) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that the trait is object-safe
    fn _assert_object_safe(_: &dyn GraphStore) {}
}
