//! Canvas Graph Model
//!
//! Defines the node/edge/viewport model of a project canvas and the
//! authoritative `CanvasState` container.
//!
//! Node payloads are a tagged union over [`NodeKind`]: each kind carries its
//! own strongly typed card, and only [`CustomCard`] keeps an untyped
//! extension map. On the wire (snapshot blobs, node records) a node is
//! `{id, type, position, data, style, width?, height?}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ModelError;

/// Default node width used when a node has no explicit size
pub const DEFAULT_NODE_WIDTH: f64 = 200.0;

/// Default node height used when a node has no explicit size
pub const DEFAULT_NODE_HEIGHT: f64 = 100.0;

/// Default edge kind for connections created on the canvas
pub const DEFAULT_EDGE_KIND: &str = "custom";

// ============================================================================
// Project Identity
// ============================================================================

/// Identifier of a project (one canvas per project).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl ProjectId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random project id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ProjectId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ModelError::InvalidProjectId(s.to_string()))
    }
}

impl From<Uuid> for ProjectId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Position of a node's top-left corner in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Optional explicit node size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// Width, falling back to [`DEFAULT_NODE_WIDTH`]
    pub fn width_or_default(&self) -> f64 {
        self.width.unwrap_or(DEFAULT_NODE_WIDTH)
    }

    /// Height, falling back to [`DEFAULT_NODE_HEIGHT`]
    pub fn height_or_default(&self) -> f64 {
        self.height.unwrap_or(DEFAULT_NODE_HEIGHT)
    }
}

/// Pan/zoom state of the canvas.
///
/// `x`/`y` are the screen-space pan offset, `zoom` the scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Viewport {
    /// Zoom level of a freshly opened canvas
    pub const DEFAULT_ZOOM: f64 = 0.8;

    /// Create a viewport, rejecting non-positive or non-finite zoom
    pub fn new(x: f64, y: f64, zoom: f64) -> Result<Self, ModelError> {
        let viewport = Self { x, y, zoom };
        viewport.validate()?;
        Ok(viewport)
    }

    /// Check the viewport invariants (`zoom > 0`, all components finite)
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(ModelError::InvalidViewport(format!(
                "pan offset must be finite, got ({}, {})",
                self.x, self.y
            )));
        }
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(ModelError::InvalidViewport(format!(
                "zoom must be positive, got {}",
                self.zoom
            )));
        }
        Ok(())
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: Self::DEFAULT_ZOOM,
        }
    }
}

// ============================================================================
// Node Kinds and Payloads
// ============================================================================

/// Kinds of canvas nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Project,
    Team,
    Task,
    File,
    Custom,
    Member,
    Company,
}

impl NodeKind {
    /// All node kinds, in toolbar order
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Project,
        NodeKind::Team,
        NodeKind::Task,
        NodeKind::File,
        NodeKind::Custom,
        NodeKind::Member,
        NodeKind::Company,
    ];

    /// Get the wire representation (`node_type` column, `type` field)
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Project => "project",
            NodeKind::Team => "team",
            NodeKind::Task => "task",
            NodeKind::File => "file",
            NodeKind::Custom => "custom",
            NodeKind::Member => "member",
            NodeKind::Company => "company",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelError::UnknownNodeKind(s.to_string()))
    }
}

/// Priority shared by project and custom cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    Completed,
    OnHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Active,
    Inactive,
    #[default]
    Prospect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectCard {
    pub title: String,
    pub status: ProjectStatus,
    pub members: u32,
    /// Completion percentage (0-100)
    pub progress: u8,
    pub priority: Priority,
}

impl Default for ProjectCard {
    fn default() -> Self {
        Self {
            title: "New Project".to_string(),
            status: ProjectStatus::Planning,
            members: 0,
            progress: 0,
            priority: Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamCard {
    pub name: String,
    pub members: Vec<String>,
    pub role: String,
}

impl Default for TeamCard {
    fn default() -> Self {
        Self {
            name: "New Team".to_string(),
            members: Vec::new(),
            role: "Development".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskCard {
    pub title: String,
    pub assignee: String,
    pub status: TaskStatus,
    /// ISO-8601 calendar date (`YYYY-MM-DD`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl Default for TaskCard {
    fn default() -> Self {
        Self {
            title: "New Task".to_string(),
            assignee: "Unassigned".to_string(),
            status: TaskStatus::Todo,
            due_date: None,
        }
    }
}

/// An uploaded file pinned to the canvas.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileCard {
    /// Storage object name
    pub filename: String,
    /// Name as uploaded by the user
    pub original_filename: String,
    pub file_size: u64,
    pub file_type: String,
    pub file_url: String,
    pub mime_type: String,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
}

/// Free-form card; the only kind with an untyped extension map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomCard {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CustomStatus>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
    /// Attributes not covered by the typed fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CustomCard {
    fn default() -> Self {
        Self {
            title: "New Card".to_string(),
            description: None,
            content: None,
            tags: Vec::new(),
            color: None,
            priority: None,
            status: None,
            is_new: false,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberCard {
    pub name: String,
    pub role: String,
    pub email: String,
    pub department: String,
    pub status: MemberStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
}

impl Default for MemberCard {
    fn default() -> Self {
        Self {
            name: "New Member".to_string(),
            role: String::new(),
            email: String::new(),
            department: String::new(),
            status: MemberStatus::Active,
            is_new: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompanyCard {
    pub name: String,
    pub industry: String,
    pub size: String,
    pub location: String,
    pub status: CompanyStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
}

impl Default for CompanyCard {
    fn default() -> Self {
        Self {
            name: "New Company".to_string(),
            industry: String::new(),
            size: String::new(),
            location: String::new(),
            status: CompanyStatus::Prospect,
            is_new: false,
        }
    }
}

/// Kind-specific node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Project(ProjectCard),
    Team(TeamCard),
    Task(TaskCard),
    File(FileCard),
    Custom(CustomCard),
    Member(MemberCard),
    Company(CompanyCard),
}

impl NodeData {
    /// The kind tag of this payload
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Project(_) => NodeKind::Project,
            NodeData::Team(_) => NodeKind::Team,
            NodeData::Task(_) => NodeKind::Task,
            NodeData::File(_) => NodeKind::File,
            NodeData::Custom(_) => NodeKind::Custom,
            NodeData::Member(_) => NodeKind::Member,
            NodeData::Company(_) => NodeKind::Company,
        }
    }

    /// Default payload for a freshly created node of `kind`
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Project => NodeData::Project(ProjectCard::default()),
            NodeKind::Team => NodeData::Team(TeamCard::default()),
            NodeKind::Task => NodeData::Task(TaskCard::default()),
            NodeKind::File => NodeData::File(FileCard::default()),
            NodeKind::Custom => NodeData::Custom(CustomCard::default()),
            NodeKind::Member => NodeData::Member(MemberCard::default()),
            NodeKind::Company => NodeData::Company(CompanyCard::default()),
        }
    }

    /// Decode a payload from its kind tag and JSON content.
    ///
    /// `null` content decodes to the kind's defaults.
    pub fn from_parts(kind: NodeKind, content: Value) -> Result<Self, ModelError> {
        let content = match content {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let decode_err = |e: serde_json::Error| ModelError::payload(kind, e);
        Ok(match kind {
            NodeKind::Project => NodeData::Project(serde_json::from_value(content).map_err(decode_err)?),
            NodeKind::Team => NodeData::Team(serde_json::from_value(content).map_err(decode_err)?),
            NodeKind::Task => NodeData::Task(serde_json::from_value(content).map_err(decode_err)?),
            NodeKind::File => NodeData::File(serde_json::from_value(content).map_err(decode_err)?),
            NodeKind::Custom => NodeData::Custom(serde_json::from_value(content).map_err(decode_err)?),
            NodeKind::Member => NodeData::Member(serde_json::from_value(content).map_err(decode_err)?),
            NodeKind::Company => NodeData::Company(serde_json::from_value(content).map_err(decode_err)?),
        })
    }

    /// Encode the payload as JSON content (without the kind tag)
    pub fn to_content(&self) -> Value {
        let encoded = match self {
            NodeData::Project(card) => serde_json::to_value(card),
            NodeData::Team(card) => serde_json::to_value(card),
            NodeData::Task(card) => serde_json::to_value(card),
            NodeData::File(card) => serde_json::to_value(card),
            NodeData::Custom(card) => serde_json::to_value(card),
            NodeData::Member(card) => serde_json::to_value(card),
            NodeData::Company(card) => serde_json::to_value(card),
        };
        // Cards are plain structs with string keys; encoding cannot fail.
        encoded.unwrap_or(Value::Null)
    }
}

// ============================================================================
// Nodes and Edges
// ============================================================================

/// A node on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeRepr", into = "NodeRepr")]
pub struct Node {
    /// Client- or store-assigned id (a UUID once normalized)
    pub id: String,
    pub position: Position,
    pub size: Size,
    pub data: NodeData,
    /// Opaque renderer style
    pub style: Map<String, Value>,
}

impl Node {
    /// Create a node without explicit size or style
    pub fn new(id: impl Into<String>, data: NodeData, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            size: Size::default(),
            data,
            style: Map::new(),
        }
    }

    /// Set an explicit size
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Size::new(width, height);
        self
    }

    /// Set the renderer style
    pub fn with_style(mut self, style: Map<String, Value>) -> Self {
        self.style = style;
        self
    }

    /// The node's kind
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

/// Wire shape of a node inside snapshot blobs.
#[derive(Serialize, Deserialize)]
struct NodeRepr {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    position: Position,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    style: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<f64>,
}

impl TryFrom<NodeRepr> for Node {
    type Error = ModelError;

    fn try_from(repr: NodeRepr) -> Result<Self, Self::Error> {
        let kind: NodeKind = repr.kind.parse()?;
        Ok(Node {
            id: repr.id,
            position: repr.position,
            size: Size {
                width: repr.width,
                height: repr.height,
            },
            data: NodeData::from_parts(kind, repr.data)?,
            style: repr.style,
        })
    }
}

impl From<Node> for NodeRepr {
    fn from(node: Node) -> Self {
        NodeRepr {
            id: node.id,
            kind: node.data.kind().as_str().to_string(),
            position: node.position,
            data: node.data.to_content(),
            style: node.style,
            width: node.size.width,
            height: node.size.height,
        }
    }
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    /// Id of the source node
    pub source: String,
    /// Id of the target node
    pub target: String,
    #[serde(rename = "type", default = "default_edge_kind")]
    pub kind: String,
    #[serde(default)]
    pub style: Map<String, Value>,
}

fn default_edge_kind() -> String {
    DEFAULT_EDGE_KIND.to_string()
}

impl Edge {
    /// Create an edge of the default kind
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind: default_edge_kind(),
            style: Map::new(),
        }
    }

    /// Set the edge kind
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Whether this edge touches the given node
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

// ============================================================================
// Canvas State
// ============================================================================

/// Partial update of a [`CanvasState`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasPatch {
    pub nodes: Option<Vec<Node>>,
    pub edges: Option<Vec<Edge>>,
    pub viewport: Option<Viewport>,
}

impl CanvasPatch {
    pub fn nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Some(nodes),
            ..Default::default()
        }
    }

    pub fn edges(edges: Vec<Edge>) -> Self {
        Self {
            edges: Some(edges),
            ..Default::default()
        }
    }

    pub fn viewport(viewport: Viewport) -> Self {
        Self {
            viewport: Some(viewport),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_none() && self.edges.is_none() && self.viewport.is_none()
    }
}

/// The authoritative `{nodes, edges, viewport}` state of one canvas.
///
/// Serialized with serde_json this is the snapshot blob. Mutations that go
/// through [`CanvasState::apply`] or [`CanvasState::remove_node`] keep the
/// invariant that every edge endpoint resolves to a live node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasState {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
}

impl CanvasState {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>, viewport: Viewport) -> Self {
        Self {
            nodes,
            edges,
            viewport,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Ids of all live nodes
    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Apply a partial update, then drop edges left without an endpoint.
    ///
    /// Returns the removed edges. Merge and cascade happen in one call, so a
    /// caller never observes an edge pointing at a deleted node.
    pub fn apply(&mut self, patch: CanvasPatch) -> Vec<Edge> {
        if let Some(nodes) = patch.nodes {
            self.nodes = nodes;
        }
        if let Some(edges) = patch.edges {
            self.edges = edges;
        }
        if let Some(viewport) = patch.viewport {
            self.viewport = viewport;
        }
        self.prune_dangling_edges()
    }

    /// Remove a node together with every edge that references it.
    pub fn remove_node(&mut self, id: &str) -> Option<(Node, Vec<Edge>)> {
        let idx = self.nodes.iter().position(|n| n.id == id)?;
        let node = self.nodes.remove(idx);
        let (removed, kept): (Vec<Edge>, Vec<Edge>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| e.touches(id));
        self.edges = kept;
        Some((node, removed))
    }

    /// Remove a single edge by id
    pub fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(idx))
    }

    /// Edges whose source or target is not a live node
    pub fn dangling_edges(&self) -> Vec<&Edge> {
        let ids = self.node_ids();
        self.edges
            .iter()
            .filter(|e| !ids.contains(e.source.as_str()) || !ids.contains(e.target.as_str()))
            .collect()
    }

    /// Remove and return all dangling edges
    pub fn prune_dangling_edges(&mut self) -> Vec<Edge> {
        let ids: HashSet<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
        let (kept, removed): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| ids.contains(&e.source) && ids.contains(&e.target));
        self.edges = kept;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(id: &str, x: f64, y: f64) -> Node {
        Node::new(id, NodeData::default_for(NodeKind::Task), Position::new(x, y))
    }

    #[test]
    fn test_node_kind_roundtrip_str() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
        }
        assert!("default".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_node_wire_shape() {
        let node = Node::new(
            "task-1",
            NodeData::Task(TaskCard {
                title: "Create wireframes".to_string(),
                assignee: "Alice".to_string(),
                status: TaskStatus::Completed,
                due_date: Some("2024-01-15".to_string()),
            }),
            Position::new(100.0, 300.0),
        );

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "task");
        assert_eq!(value["data"]["dueDate"], "2024-01-15");
        assert_eq!(value["data"]["status"], "completed");
        assert!(value.get("width").is_none());

        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_partial_content_uses_defaults() {
        let node: Node = serde_json::from_value(json!({
            "id": "p1",
            "type": "project",
            "position": {"x": 1.0, "y": 2.0},
            "data": {"title": "Website Redesign", "progress": 65}
        }))
        .unwrap();

        match node.data {
            NodeData::Project(card) => {
                assert_eq!(card.title, "Website Redesign");
                assert_eq!(card.progress, 65);
                assert_eq!(card.status, ProjectStatus::Planning);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_custom_card_keeps_extension_fields() {
        let data = NodeData::from_parts(
            NodeKind::Custom,
            json!({"title": "Idea", "tags": ["a"], "votes": 3}),
        )
        .unwrap();

        let NodeData::Custom(card) = &data else {
            panic!("expected custom card");
        };
        assert_eq!(card.extra.get("votes"), Some(&json!(3)));
        assert_eq!(data.to_content()["votes"], 3);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<Node, _> = serde_json::from_value(json!({
            "id": "x",
            "type": "default",
            "position": {"x": 0.0, "y": 0.0}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_viewport_validation() {
        assert!(Viewport::new(0.0, 0.0, 1.0).is_ok());
        assert!(Viewport::new(0.0, 0.0, 0.0).is_err());
        assert!(Viewport::new(0.0, 0.0, -1.0).is_err());
        assert!(Viewport::new(f64::NAN, 0.0, 1.0).is_err());
        assert_eq!(Viewport::default().zoom, 0.8);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut state = CanvasState::new(
            vec![task("a", 0.0, 0.0), task("b", 10.0, 0.0), task("c", 20.0, 0.0)],
            vec![Edge::new("e1", "a", "b"), Edge::new("e2", "c", "a"), Edge::new("e3", "b", "c")],
            Viewport::default(),
        );

        let (node, removed) = state.remove_node("a").unwrap();
        assert_eq!(node.id, "a");
        assert_eq!(removed.len(), 2);
        assert_eq!(state.edges.len(), 1);
        assert_eq!(state.edges[0].id, "e3");
        assert!(state.dangling_edges().is_empty());
    }

    #[test]
    fn test_apply_patch_cascades_missing_endpoints() {
        let mut state = CanvasState::new(
            vec![task("a", 0.0, 0.0), task("b", 10.0, 0.0)],
            vec![Edge::new("e1", "a", "b")],
            Viewport::default(),
        );

        let removed = state.apply(CanvasPatch::nodes(vec![task("a", 0.0, 0.0)]));
        assert_eq!(removed.len(), 1);
        assert!(state.edges.is_empty());

        let removed = state.apply(CanvasPatch::viewport(Viewport::new(5.0, 5.0, 2.0).unwrap()));
        assert!(removed.is_empty());
        assert_eq!(state.viewport.zoom, 2.0);
    }

    #[test]
    fn test_snapshot_blob_roundtrip() {
        let state = CanvasState::new(
            vec![task("a", 0.0, 0.0).with_size(240.0, 120.0)],
            vec![],
            Viewport::new(-10.0, 20.0, 1.5).unwrap(),
        );
        let json = serde_json::to_string(&state).unwrap();
        let back: CanvasState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
