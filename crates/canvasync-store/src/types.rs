//! Wire records exchanged with graph stores.
//!
//! Positions and sizes are stored as integers; conversions round.

use canvasync_core::{
    CanvasState, Edge, ModelError, Node, NodeData, NodeKind, Position, ProjectId, Size,
    DEFAULT_EDGE_KIND, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How an upsert treats a record whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Overwrite the existing row (merge duplicates)
    Update,
    /// Keep the existing row and skip the incoming one
    Ignore,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Update => "update",
            ConflictPolicy::Ignore => "ignore",
        }
    }
}

fn default_width() -> i64 {
    DEFAULT_NODE_WIDTH as i64
}

fn default_height() -> i64 {
    DEFAULT_NODE_HEIGHT as i64
}

fn default_connection_type() -> String {
    DEFAULT_EDGE_KIND.to_string()
}

/// Row of the `project_nodes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub project_id: ProjectId,
    pub node_type: String,
    pub position_x: i64,
    pub position_y: i64,
    #[serde(default = "default_width")]
    pub width: i64,
    #[serde(default = "default_height")]
    pub height: i64,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub style: Value,
}

impl NodeRecord {
    /// Build the record for `node` in `project`.
    pub fn from_node(project: ProjectId, node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            project_id: project,
            node_type: node.kind().as_str().to_string(),
            position_x: node.position.x.round() as i64,
            position_y: node.position.y.round() as i64,
            width: node.size.width_or_default().round() as i64,
            height: node.size.height_or_default().round() as i64,
            content: node.data.to_content(),
            style: Value::Object(node.style.clone()),
        }
    }

    /// Decode the record back into a canvas node.
    pub fn into_node(self) -> Result<Node, ModelError> {
        let kind: NodeKind = self.node_type.parse()?;
        let data = NodeData::from_parts(kind, self.content)?;
        let style = match self.style {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Ok(Node {
            id: self.id,
            position: Position::new(self.position_x as f64, self.position_y as f64),
            size: Size::new(self.width as f64, self.height as f64),
            data,
            style,
        })
    }
}

/// Row of the `project_connections` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub project_id: ProjectId,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
}

impl EdgeRecord {
    pub fn from_edge(project: ProjectId, edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            project_id: project,
            from_node_id: edge.source.clone(),
            to_node_id: edge.target.clone(),
            connection_type: edge.kind.clone(),
        }
    }

    pub fn into_edge(self) -> Edge {
        let kind = if self.connection_type.is_empty() {
            default_connection_type()
        } else {
            self.connection_type
        };
        Edge::new(self.id, self.from_node_id, self.to_node_id).with_kind(kind)
    }
}

/// Row of the `project_canvas` table: the denormalized snapshot blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub project_id: ProjectId,
    pub canvas_data: CanvasState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SnapshotRecord {
    pub fn new(project_id: ProjectId, canvas_data: CanvasState) -> Self {
        Self {
            project_id,
            canvas_data,
            updated_at: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasync_core::{TaskCard, TaskStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_node_record_rounds_geometry() {
        let project = ProjectId::random();
        let node = Node::new(
            "123e4567-e89b-12d3-a456-426614174000",
            NodeData::Task(TaskCard {
                title: "Design review".to_string(),
                status: TaskStatus::InProgress,
                ..Default::default()
            }),
            Position::new(10.6, -3.4),
        );

        let record = NodeRecord::from_node(project, &node);
        assert_eq!(record.position_x, 11);
        assert_eq!(record.position_y, -3);
        assert_eq!(record.width, 200);
        assert_eq!(record.height, 100);
        assert_eq!(record.node_type, "task");
        assert_eq!(record.content["status"], "in_progress");

        let back = record.into_node().unwrap();
        assert_eq!(back.data, node.data);
        assert_eq!(back.position, Position::new(11.0, -3.0));
    }

    #[test]
    fn test_node_record_wire_defaults() {
        let record: NodeRecord = serde_json::from_value(json!({
            "id": "123e4567-e89b-12d3-a456-426614174000",
            "project_id": "223e4567-e89b-12d3-a456-426614174000",
            "node_type": "team",
            "position_x": 5,
            "position_y": 6,
            "content": {"name": "Frontend"}
        }))
        .unwrap();

        assert_eq!(record.width, 200);
        assert_eq!(record.height, 100);
        let node = record.into_node().unwrap();
        assert_eq!(node.kind(), NodeKind::Team);
    }

    #[test]
    fn test_unknown_node_type_fails_decode() {
        let record = NodeRecord {
            id: "x".to_string(),
            project_id: ProjectId::random(),
            node_type: "sticky".to_string(),
            position_x: 0,
            position_y: 0,
            width: 200,
            height: 100,
            content: Value::Null,
            style: Value::Null,
        };
        assert!(record.into_node().is_err());
    }

    #[test]
    fn test_edge_record_default_connection_type() {
        let record: EdgeRecord = serde_json::from_value(json!({
            "id": "e",
            "project_id": "223e4567-e89b-12d3-a456-426614174000",
            "from_node_id": "a",
            "to_node_id": "b"
        }))
        .unwrap();
        assert_eq!(record.connection_type, "custom");

        let edge = record.into_edge();
        assert_eq!(edge.source, "a");
        assert_eq!(edge.target, "b");
        assert_eq!(edge.kind, "custom");
    }
}
