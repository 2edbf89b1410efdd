//! canvasync Core - Canvas graph model and viewport chunking
//!
//! This crate provides the store-independent building blocks:
//! - The node/edge/viewport model and the authoritative `CanvasState`
//! - Identifier normalization to store-compatible UUIDs
//! - World-space viewport bounds and the spatial chunk grid
//! - The generation-guarded chunk cache with distance-based eviction
//! - Content digests for change detection

pub mod cache;
pub mod digest;
pub mod error;
pub mod ids;
pub mod model;
pub mod spatial;

pub use cache::{
    CacheMetrics, ChunkCache, ChunkEntry, ChunkState, LoadDecision, MergeOutcome,
    DEFAULT_EVICTION_DISTANCE, DEFAULT_MAX_CHUNKS,
};
pub use digest::StateDigest;
pub use error::ModelError;
pub use ids::{apply_rewrites, is_store_uuid, normalize, Normalized};
pub use model::{
    CanvasPatch, CanvasState, CompanyCard, CompanyStatus, CustomCard, CustomStatus, Edge,
    FileCard, MemberCard, MemberStatus, Node, NodeData, NodeKind, Position, Priority,
    ProjectCard, ProjectId, ProjectStatus, Size, TaskCard, TaskStatus, TeamCard, Viewport,
    DEFAULT_EDGE_KIND, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH,
};
pub use spatial::{ChunkKey, WorldBounds, DEFAULT_BUFFER_FRACTION, DEFAULT_CHUNK_SIZE};
