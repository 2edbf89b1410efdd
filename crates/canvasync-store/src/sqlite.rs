//! Embedded SQLite store.
//!
//! Keeps the three canvas tables in a single SQLite database. Used as the
//! default local backend and as the store behind the integration tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use canvasync_core::{is_store_uuid, CanvasState, ProjectId, WorldBounds};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult, Transaction};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema::{
    CONNECTION_COLUMNS, NODE_COLUMNS, SCHEMA_CREATE_CANVAS, SCHEMA_CREATE_CONNECTIONS,
    SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_METADATA, SCHEMA_CREATE_NODES, STORE_SCHEMA_VERSION,
};
use crate::traits::GraphStore;
use crate::types::{ConflictPolicy, EdgeRecord, NodeRecord, SnapshotRecord};

/// Maximum ids bound into one `IN (...)` list
const ID_BATCH_SIZE: usize = 400;

/// Node row as read from SQLite, before JSON decoding
struct NodeRow {
    id: String,
    project_id: String,
    node_type: String,
    position_x: i64,
    position_y: i64,
    width: i64,
    height: i64,
    content: String,
    style: String,
}

impl NodeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            node_type: row.get(2)?,
            position_x: row.get(3)?,
            position_y: row.get(4)?,
            width: row.get(5)?,
            height: row.get(6)?,
            content: row.get(7)?,
            style: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<NodeRecord, StoreError> {
        Ok(NodeRecord {
            id: self.id,
            project_id: self.project_id.parse()?,
            node_type: self.node_type,
            position_x: self.position_x,
            position_y: self.position_y,
            width: self.width,
            height: self.height,
            content: serde_json::from_str(&self.content)?,
            style: serde_json::from_str(&self.style)?,
        })
    }
}

struct EdgeRow {
    id: String,
    project_id: String,
    from_node_id: String,
    to_node_id: String,
    connection_type: String,
}

impl EdgeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            from_node_id: row.get(2)?,
            to_node_id: row.get(3)?,
            connection_type: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<EdgeRecord, StoreError> {
        Ok(EdgeRecord {
            id: self.id,
            project_id: self.project_id.parse()?,
            from_node_id: self.from_node_id,
            to_node_id: self.to_node_id,
            connection_type: self.connection_type,
        })
    }
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Graph store backed by a SQLite database file (or memory).
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Database file; `None` for in-memory stores
    path: Option<PathBuf>,
    snapshot_upsert: bool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::initialize(&conn)?;

        info!("Opened SQLite store at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            snapshot_upsert: true,
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            snapshot_upsert: true,
        })
    }

    /// Report snapshot upserts as unsupported, so callers use `replace_snapshot`
    pub fn with_snapshot_upsert(mut self, enabled: bool) -> Self {
        self.snapshot_upsert = enabled;
        self
    }

    /// Database file path, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configure connection for a local single-writer database
    fn configure_connection(conn: &Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(SCHEMA_CREATE_METADATA, [])?;
        conn.execute(SCHEMA_CREATE_CANVAS, [])?;
        conn.execute(SCHEMA_CREATE_NODES, [])?;
        conn.execute(SCHEMA_CREATE_CONNECTIONS, [])?;
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            Some(found) if found != STORE_SCHEMA_VERSION => Err(StoreError::SchemaVersionMismatch {
                expected: STORE_SCHEMA_VERSION.to_string(),
                found,
            }),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
                    [STORE_SCHEMA_VERSION],
                )?;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Write helpers (run inside a transaction)
    // =========================================================================

    /// Owner project of an existing row, if any
    fn owner_of(tx: &Transaction<'_>, table: &str, id: &str) -> SqliteResult<Option<String>> {
        tx.query_row(
            &format!("SELECT project_id FROM {} WHERE id = ?1", table),
            [id],
            |row| row.get(0),
        )
        .optional()
    }

    /// Whether a record may be written; errors or skips on foreign ids
    fn check_owner(
        tx: &Transaction<'_>,
        table: &str,
        id: &str,
        project: ProjectId,
        policy: ConflictPolicy,
    ) -> Result<bool, StoreError> {
        match Self::owner_of(tx, table, id)? {
            Some(owner) if owner != project.to_string() => match policy {
                ConflictPolicy::Update => Err(StoreError::conflict(
                    table,
                    format!("id {} belongs to project {}", id, owner),
                )),
                ConflictPolicy::Ignore => {
                    debug!("Skipping {} row {} owned by project {}", table, id, owner);
                    Ok(false)
                }
            },
            _ => Ok(true),
        }
    }

    fn write_snapshot(tx: &Transaction<'_>, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        let blob = serde_json::to_string(state)?;
        tx.execute(
            r#"
            INSERT INTO project_canvas (project_id, canvas_data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(project_id) DO UPDATE SET
                canvas_data = excluded.canvas_data,
                updated_at = excluded.updated_at
            "#,
            params![project.to_string(), blob, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete_by_ids(&self, table: &str, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for batch in ids.chunks(ID_BATCH_SIZE) {
            let sql = format!(
                "DELETE FROM {} WHERE project_id = ?1 AND id IN ({})",
                table,
                placeholders(2, batch.len())
            );
            let values = std::iter::once(project.to_string()).chain(batch.iter().cloned());
            deleted += tx.execute(&sql, params_from_iter(values))?;
        }
        tx.commit()?;

        debug!("Deleted {} rows from {}", deleted, table);
        Ok(deleted)
    }

    fn delete_all(&self, table: &str, project: ProjectId) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE project_id = ?1", table),
            [project.to_string()],
        )?;
        debug!("Cleared {} rows from {} for project {}", deleted, table, project);
        Ok(deleted)
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }

    async fn count_nodes(&self, project: ProjectId) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM project_nodes WHERE project_id = ?1",
            [project.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn query_nodes_in_bounds(
        &self,
        project: ProjectId,
        bounds: &WorldBounds,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        let range = bounds.snapped();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM project_nodes
            WHERE project_id = ?1
              AND position_x BETWEEN ?2 AND ?3
              AND position_y BETWEEN ?4 AND ?5
            ORDER BY position_y, position_x, id
            LIMIT ?6
            "#,
            NODE_COLUMNS
        ))?;

        let rows = stmt
            .query_map(
                params![
                    project.to_string(),
                    range.left as i64,
                    range.right as i64,
                    range.top as i64,
                    range.bottom as i64,
                    limit as i64,
                ],
                NodeRow::from_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        rows.into_iter().map(NodeRow::into_record).collect()
    }

    async fn query_edges_by_node_ids(
        &self,
        project: ProjectId,
        node_ids: &[String],
    ) -> Result<Vec<EdgeRecord>, StoreError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for batch in node_ids.chunks(ID_BATCH_SIZE) {
            let ids = placeholders(2, batch.len());
            let sql = format!(
                "SELECT {} FROM project_connections WHERE project_id = ?1 AND (from_node_id IN ({}) OR to_node_id IN ({}))",
                CONNECTION_COLUMNS, ids, ids
            );
            let values = std::iter::once(project.to_string()).chain(batch.iter().cloned());
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), EdgeRow::from_row)?
                .collect::<SqliteResult<Vec<_>>>()?;

            for row in rows {
                if seen.insert(row.id.clone()) {
                    records.push(row.into_record()?);
                }
            }
        }

        Ok(records)
    }

    async fn list_nodes(&self, project: ProjectId) -> Result<Vec<NodeRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM project_nodes WHERE project_id = ?1 ORDER BY created_at, id",
            NODE_COLUMNS
        ))?;
        let rows = stmt
            .query_map([project.to_string()], NodeRow::from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        rows.into_iter().map(NodeRow::into_record).collect()
    }

    async fn list_edges(&self, project: ProjectId) -> Result<Vec<EdgeRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM project_connections WHERE project_id = ?1 ORDER BY created_at, id",
            CONNECTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map([project.to_string()], EdgeRow::from_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        rows.into_iter().map(EdgeRow::into_record).collect()
    }

    async fn get_snapshot(&self, project: ProjectId) -> Result<Option<SnapshotRecord>, StoreError> {
        let row: Option<(String, String)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT canvas_data, updated_at FROM project_canvas WHERE project_id = ?1",
                [project.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let Some((blob, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(SnapshotRecord {
            project_id: project,
            canvas_data: serde_json::from_str(&blob)?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
        }))
    }

    fn supports_snapshot_upsert(&self) -> bool {
        self.snapshot_upsert
    }

    async fn upsert_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::write_snapshot(&tx, project, state)?;
        tx.commit()?;
        Ok(())
    }

    async fn replace_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM project_canvas WHERE project_id = ?1",
            [project.to_string()],
        )?;
        Self::write_snapshot(&tx, project, state)?;
        tx.commit()?;
        Ok(())
    }

    async fn upsert_nodes(&self, records: &[NodeRecord], policy: ConflictPolicy) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let on_conflict = match policy {
            ConflictPolicy::Update => {
                r#"ON CONFLICT(id) DO UPDATE SET
                    node_type = excluded.node_type,
                    position_x = excluded.position_x,
                    position_y = excluded.position_y,
                    width = excluded.width,
                    height = excluded.height,
                    content = excluded.content,
                    style = excluded.style,
                    updated_at = excluded.updated_at"#
            }
            ConflictPolicy::Ignore => "ON CONFLICT(id) DO NOTHING",
        };
        let sql = format!(
            r#"
            INSERT INTO project_nodes
                (id, project_id, node_type, position_x, position_y, width, height, content, style, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            {}
            "#,
            on_conflict
        );

        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                if !is_store_uuid(&record.id) {
                    return Err(StoreError::invalid_id(&record.id));
                }
                if !Self::check_owner(&tx, "project_nodes", &record.id, record.project_id, policy)? {
                    continue;
                }

                written += stmt.execute(params![
                    record.id,
                    record.project_id.to_string(),
                    record.node_type,
                    record.position_x,
                    record.position_y,
                    record.width,
                    record.height,
                    serde_json::to_string(&record.content)?,
                    serde_json::to_string(&record.style)?,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Upserted {} node records ({})", written, policy.as_str());
        Ok(())
    }

    async fn upsert_edges(&self, records: &[EdgeRecord], policy: ConflictPolicy) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let on_conflict = match policy {
            ConflictPolicy::Update => {
                r#"ON CONFLICT(id) DO UPDATE SET
                    from_node_id = excluded.from_node_id,
                    to_node_id = excluded.to_node_id,
                    connection_type = excluded.connection_type"#
            }
            ConflictPolicy::Ignore => "ON CONFLICT(id) DO NOTHING",
        };
        let sql = format!(
            r#"
            INSERT INTO project_connections
                (id, project_id, from_node_id, to_node_id, connection_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            {}
            "#,
            on_conflict
        );

        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                for id in [&record.id, &record.from_node_id, &record.to_node_id] {
                    if !is_store_uuid(id) {
                        return Err(StoreError::invalid_id(id.as_str()));
                    }
                }
                if !Self::check_owner(&tx, "project_connections", &record.id, record.project_id, policy)? {
                    continue;
                }

                written += stmt.execute(params![
                    record.id,
                    record.project_id.to_string(),
                    record.from_node_id,
                    record.to_node_id,
                    record.connection_type,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Upserted {} edge records ({})", written, policy.as_str());
        Ok(())
    }

    async fn delete_nodes(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        self.delete_by_ids("project_nodes", project, ids)
    }

    async fn delete_edges(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        self.delete_by_ids("project_connections", project, ids)
    }

    async fn delete_all_nodes(&self, project: ProjectId) -> Result<usize, StoreError> {
        self.delete_all("project_nodes", project)
    }

    async fn delete_all_edges(&self, project: ProjectId) -> Result<usize, StoreError> {
        self.delete_all("project_connections", project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasync_core::{Node, NodeData, NodeKind, Position, Viewport};
    use uuid::Uuid;

    fn record(project: ProjectId, x: f64, y: f64) -> NodeRecord {
        let node = Node::new(
            Uuid::new_v4().to_string(),
            NodeData::default_for(NodeKind::Task),
            Position::new(x, y),
        );
        NodeRecord::from_node(project, &node)
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
    }

    #[tokio::test]
    async fn test_create_in_memory() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.health_check().await.unwrap());
        assert!(store.path().is_none());
        assert_eq!(store.count_nodes(ProjectId::random()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_client_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let project = ProjectId::random();
        let mut bad = record(project, 0.0, 0.0);
        bad.id = "task-1".to_string();

        let err = store.upsert_nodes(&[bad], ConflictPolicy::Update).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_upsert_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        let project = ProjectId::random();

        let mut state = CanvasState::default();
        store.upsert_snapshot(project, &state).await.unwrap();
        state.viewport = Viewport::new(10.0, 20.0, 1.0).unwrap();
        store.upsert_snapshot(project, &state).await.unwrap();

        let snapshot = store.get_snapshot(project).await.unwrap().unwrap();
        assert_eq!(snapshot.canvas_data.viewport, state.viewport);
        assert!(snapshot.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_by_ids_scoped_to_project() {
        let store = SqliteStore::in_memory().unwrap();
        let p1 = ProjectId::random();
        let p2 = ProjectId::random();
        let a = record(p1, 0.0, 0.0);
        let b = record(p2, 0.0, 0.0);
        store.upsert_nodes(&[a.clone()], ConflictPolicy::Update).await.unwrap();
        store.upsert_nodes(&[b.clone()], ConflictPolicy::Update).await.unwrap();

        let deleted = store.delete_nodes(p1, &[a.id.clone(), b.id.clone()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_nodes(p2).await.unwrap(), 1);
    }
}
