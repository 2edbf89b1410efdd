//! SQLite Schema Definitions for the Embedded Store
//!
//! Mirrors the remote tables: one snapshot row per project, plus per-record
//! node and connection tables used for spatial queries and recovery.

/// Schema version stored in `store_metadata`
pub const STORE_SCHEMA_VERSION: &str = "1";

/// SQL to create the snapshot table
///
/// `canvas_data` is the JSON `{nodes, edges, viewport}` blob.
pub const SCHEMA_CREATE_CANVAS: &str = r#"
CREATE TABLE IF NOT EXISTS project_canvas (
    project_id TEXT PRIMARY KEY NOT NULL,
    canvas_data TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the node record table
pub const SCHEMA_CREATE_NODES: &str = r#"
CREATE TABLE IF NOT EXISTS project_nodes (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    node_type TEXT NOT NULL,

    -- World position of the top-left corner, rounded
    position_x INTEGER NOT NULL,
    position_y INTEGER NOT NULL,
    width INTEGER NOT NULL DEFAULT 200,
    height INTEGER NOT NULL DEFAULT 100,

    -- Kind-specific payload and renderer style (JSON)
    content TEXT NOT NULL DEFAULT '{}',
    style TEXT NOT NULL DEFAULT '{}',

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the connection record table
pub const SCHEMA_CREATE_CONNECTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS project_connections (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    from_node_id TEXT NOT NULL,
    to_node_id TEXT NOT NULL,
    connection_type TEXT NOT NULL DEFAULT 'custom',
    created_at TEXT NOT NULL
)
"#;

/// SQL to create indexes for efficient queries
pub const SCHEMA_CREATE_INDEXES: &str = r#"
-- Bounded range queries per project
CREATE INDEX IF NOT EXISTS idx_nodes_project_position ON project_nodes(project_id, position_x, position_y);

-- Edge lookup by endpoint
CREATE INDEX IF NOT EXISTS idx_connections_from ON project_connections(project_id, from_node_id);
CREATE INDEX IF NOT EXISTS idx_connections_to ON project_connections(project_id, to_node_id);
"#;

/// SQL to create the metadata table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS store_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// Column names for node queries (in order for row mapping)
pub const NODE_COLUMNS: &str =
    "id, project_id, node_type, position_x, position_y, width, height, content, style";

/// Column names for connection queries (in order for row mapping)
pub const CONNECTION_COLUMNS: &str = "id, project_id, from_node_id, to_node_id, connection_type";
