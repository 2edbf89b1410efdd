//! Remote REST store.
//!
//! Talks to a PostgREST endpoint (as exposed by Supabase) under
//! `<url>/rest/v1/<table>`. Filters use PostgREST operators (`eq.`, `gte.`,
//! `in.(...)`), counts come from `Content-Range` with `Prefer: count=exact`,
//! and upserts use `on_conflict` with a `resolution` preference.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use canvasync_core::{CanvasState, ProjectId, WorldBounds};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::GraphStore;
use crate::types::{ConflictPolicy, EdgeRecord, NodeRecord, SnapshotRecord};

const NODES_TABLE: &str = "project_nodes";
const EDGES_TABLE: &str = "project_connections";
const CANVAS_TABLE: &str = "project_canvas";

/// Ids per `in.(...)` filter, keeps request URLs short
const ID_BATCH_SIZE: usize = 100;

/// Graph store speaking PostgREST over HTTP.
pub struct RemoteStore {
    client: Client,
    /// Base URL (e.g., "http://localhost:54321")
    base_url: String,
    /// API key sent as `apikey` and bearer token
    api_key: Option<String>,
    timeout_secs: u64,
    snapshot_upsert: bool,
}

impl RemoteStore {
    /// Create a new remote store.
    ///
    /// # Arguments
    /// * `base_url` - Server URL without the `/rest/v1` suffix
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = RemoteStore::new("http://localhost:54321")?.with_api_key("anon-key")?;
    /// ```
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let timeout_secs = 30;
        Ok(Self {
            client: Self::build_client(None, timeout_secs)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout_secs,
            snapshot_upsert: true,
        })
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let api_key = api_key.into();
        self.client = Self::build_client(Some(&api_key), self.timeout_secs)?;
        self.api_key = Some(api_key);
        Ok(self)
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Result<Self, StoreError> {
        self.client = Self::build_client(self.api_key.as_deref(), timeout_secs)?;
        self.timeout_secs = timeout_secs;
        Ok(self)
    }

    /// Declare whether the server has a unique key on `project_canvas.project_id`.
    pub fn with_snapshot_upsert(mut self, enabled: bool) -> Self {
        self.snapshot_upsert = enabled;
        self
    }

    /// Get the server URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_client(api_key: Option<&str>, timeout_secs: u64) -> Result<Client, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let invalid = |_| StoreError::connection("API key contains invalid header characters");
            headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
            );
        }

        Ok(Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client.request(method, self.table_url(table))
    }

    /// Map non-success statuses to store errors
    async fn check(response: Response, table: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(StoreError::conflict(table, message));
        }
        Err(StoreError::remote_server(status.as_u16(), message))
    }

    async fn fetch<T: DeserializeOwned>(&self, table: &str, query: &[(String, String)]) -> Result<Vec<T>, StoreError> {
        let response = self.request(Method::GET, table).query(query).send().await?;
        let response = Self::check(response, table).await?;
        Ok(response.json().await?)
    }

    async fn upsert<T: Serialize + Sync>(
        &self,
        table: &str,
        on_conflict: &str,
        records: &[T],
        policy: ConflictPolicy,
    ) -> Result<(), StoreError> {
        let resolution = match policy {
            ConflictPolicy::Update => "resolution=merge-duplicates",
            ConflictPolicy::Ignore => "resolution=ignore-duplicates",
        };

        let response = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", resolution)
            .json(records)
            .send()
            .await?;
        Self::check(response, table).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, query: &[(String, String)]) -> Result<usize, StoreError> {
        let response = self
            .request(Method::DELETE, table)
            .query(query)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let response = Self::check(response, table).await?;
        let removed: Vec<serde_json::Value> = response.json().await?;
        Ok(removed.len())
    }

    async fn delete_by_ids(&self, table: &str, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for batch in ids.chunks(ID_BATCH_SIZE) {
            let query = vec![
                project_filter(project),
                ("id".to_string(), format!("in.({})", batch.join(","))),
            ];
            deleted += self.delete(table, &query).await?;
        }
        debug!("Deleted {} rows from {}", deleted, table);
        Ok(deleted)
    }
}

fn project_filter(project: ProjectId) -> (String, String) {
    ("project_id".to_string(), format!("eq.{}", project))
}

/// Parse the total from a `Content-Range` header (`0-24/3573` or `*/3573`)
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl GraphStore for RemoteStore {
    fn name(&self) -> &str {
        "remote"
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let response = self
            .client
            .get(format!("{}/rest/v1/", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn count_nodes(&self, project: ProjectId) -> Result<u64, StoreError> {
        let response = self
            .request(Method::HEAD, NODES_TABLE)
            .query(&[project_filter(project), ("select".to_string(), "id".to_string())])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::check(response, NODES_TABLE).await?;

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| StoreError::with_context("count_nodes", "missing or malformed Content-Range header"))
    }

    async fn query_nodes_in_bounds(
        &self,
        project: ProjectId,
        bounds: &WorldBounds,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, StoreError> {
        let range = bounds.snapped();
        let query = vec![
            ("select".to_string(), "*".to_string()),
            project_filter(project),
            ("position_x".to_string(), format!("gte.{}", range.left as i64)),
            ("position_x".to_string(), format!("lte.{}", range.right as i64)),
            ("position_y".to_string(), format!("gte.{}", range.top as i64)),
            ("position_y".to_string(), format!("lte.{}", range.bottom as i64)),
            ("limit".to_string(), limit.to_string()),
        ];
        self.fetch(NODES_TABLE, &query).await
    }

    async fn query_edges_by_node_ids(
        &self,
        project: ProjectId,
        node_ids: &[String],
    ) -> Result<Vec<EdgeRecord>, StoreError> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for batch in node_ids.chunks(ID_BATCH_SIZE) {
            let ids = batch.join(",");
            let query = vec![
                ("select".to_string(), "*".to_string()),
                project_filter(project),
                (
                    "or".to_string(),
                    format!("(from_node_id.in.({}),to_node_id.in.({}))", ids, ids),
                ),
            ];
            let rows: Vec<EdgeRecord> = self.fetch(EDGES_TABLE, &query).await?;
            records.extend(rows.into_iter().filter(|row| seen.insert(row.id.clone())));
        }

        Ok(records)
    }

    async fn list_nodes(&self, project: ProjectId) -> Result<Vec<NodeRecord>, StoreError> {
        let query = vec![("select".to_string(), "*".to_string()), project_filter(project)];
        self.fetch(NODES_TABLE, &query).await
    }

    async fn list_edges(&self, project: ProjectId) -> Result<Vec<EdgeRecord>, StoreError> {
        let query = vec![("select".to_string(), "*".to_string()), project_filter(project)];
        self.fetch(EDGES_TABLE, &query).await
    }

    async fn get_snapshot(&self, project: ProjectId) -> Result<Option<SnapshotRecord>, StoreError> {
        let query = vec![
            ("select".to_string(), "*".to_string()),
            project_filter(project),
            ("limit".to_string(), "1".to_string()),
        ];
        let rows: Vec<SnapshotRecord> = self.fetch(CANVAS_TABLE, &query).await?;
        Ok(rows.into_iter().next())
    }

    fn supports_snapshot_upsert(&self) -> bool {
        self.snapshot_upsert
    }

    async fn upsert_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        let record = SnapshotRecord::new(project, state.clone());
        self.upsert(CANVAS_TABLE, "project_id", &[record], ConflictPolicy::Update)
            .await
    }

    async fn replace_snapshot(&self, project: ProjectId, state: &CanvasState) -> Result<(), StoreError> {
        self.delete(CANVAS_TABLE, &[project_filter(project)]).await?;

        let record = SnapshotRecord::new(project, state.clone());
        let response = self
            .request(Method::POST, CANVAS_TABLE)
            .header("Prefer", "return=minimal")
            .json(&[record])
            .send()
            .await?;
        Self::check(response, CANVAS_TABLE).await?;
        Ok(())
    }

    async fn upsert_nodes(&self, records: &[NodeRecord], policy: ConflictPolicy) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.upsert(NODES_TABLE, "id", records, policy).await
    }

    async fn upsert_edges(&self, records: &[EdgeRecord], policy: ConflictPolicy) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.upsert(EDGES_TABLE, "id", records, policy).await
    }

    async fn delete_nodes(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        self.delete_by_ids(NODES_TABLE, project, ids).await
    }

    async fn delete_edges(&self, project: ProjectId, ids: &[String]) -> Result<usize, StoreError> {
        self.delete_by_ids(EDGES_TABLE, project, ids).await
    }

    async fn delete_all_nodes(&self, project: ProjectId) -> Result<usize, StoreError> {
        self.delete(NODES_TABLE, &[project_filter(project)]).await
    }

    async fn delete_all_edges(&self, project: ProjectId) -> Result<usize, StoreError> {
        self.delete(EDGES_TABLE, &[project_filter(project)]).await
    }
}
