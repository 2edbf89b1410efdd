//! canvasync Store - Graph store client for canvas data
//!
//! This crate provides the storage interface used by the loader and the
//! persistence controller:
//! - Node, connection and snapshot wire records
//! - Bounded spatial queries and edge lookup by endpoint
//! - Snapshot upsert/replace and per-record upserts with conflict policies
//!
//! ## Store Types
//!
//! - [`SqliteStore`]: Embedded SQLite database (local use and tests)
//! - [`RemoteStore`]: HTTP client for a PostgREST/Supabase endpoint
//!
//! ## Example
//!
//! ```ignore
//! use canvasync_core::{ProjectId, Viewport, WorldBounds};
//! use canvasync_store::{GraphStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::open(".canvasync/canvas.db")?;
//!     let project = ProjectId::random();
//!     let bounds = WorldBounds::from_viewport(&Viewport::default(), 1200.0, 800.0, 0.2);
//!     let nodes = store.query_nodes_in_bounds(project, &bounds, 75).await?;
//!     println!("{} nodes in view", nodes.len());
//!     Ok(())
//! }
//! ```

mod error;
mod remote;
mod schema;
mod sqlite;
mod traits;
mod types;

pub use error::StoreError;
pub use remote::RemoteStore;
pub use schema::STORE_SCHEMA_VERSION;
pub use sqlite::SqliteStore;
pub use traits::GraphStore;
pub use types::*;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
