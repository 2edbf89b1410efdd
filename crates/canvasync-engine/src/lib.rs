//! canvasync Engine - Viewport lazy loading and canvas persistence
//!
//! This crate drives a canvas against a [`canvasync_store::GraphStore`]:
//! - [`ViewportLoader`] keeps the nodes and edges near the viewport resident
//! - [`PersistenceController`] owns the canvas state and saves it
//! - [`CanvasSession`] wires both to one store and one notice channel
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use canvasync_config::CanvasyncConfig;
//! use canvasync_core::{NodeKind, Position, ProjectId};
//! use canvasync_engine::CanvasSession;
//! use canvasync_store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open(".canvasync/canvas.db")?);
//!     let session = CanvasSession::new(store, &CanvasyncConfig::default());
//!
//!     session.open_project(Some(ProjectId::random())).await?;
//!     session
//!         .controller()
//!         .add_node(NodeKind::Task, Position::new(100.0, 200.0));
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod error;
pub mod loader;
pub mod notify;
pub mod session;

pub use controller::{
    AddFileNode, LoadSource, PersistenceController, SaveOutcome, SaveStatus, SavedHook,
    UnloadGuard,
};
pub use error::{EngineError, LoadError, SaveError};
pub use loader::{DebugInfo, LoadReport, LoadStrategy, LoaderView, ViewportLoader};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use session::CanvasSession;
