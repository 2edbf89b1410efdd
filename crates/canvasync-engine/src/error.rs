//! Engine error types.

use canvasync_core::{ModelError, ProjectId};
use canvasync_store::StoreError;
use thiserror::Error;

/// Errors raised while loading canvas content.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A store read failed; previously loaded content is kept
    #[error("failed to fetch {stage}: {source}")]
    TransientFetch {
        stage: &'static str,
        #[source]
        source: StoreError,
    },

    /// The requested viewport cannot be mapped to world bounds
    #[error(transparent)]
    InvalidViewport(ModelError),
}

impl LoadError {
    pub fn fetch(stage: &'static str, source: StoreError) -> Self {
        Self::TransientFetch { stage, source }
    }

    /// The read that failed (`count`, `chunk`, `edges`, ...)
    pub fn stage(&self) -> &'static str {
        match self {
            Self::TransientFetch { stage, .. } => *stage,
            Self::InvalidViewport(_) => "viewport",
        }
    }
}

/// Errors raised while saving a canvas.
#[derive(Error, Debug)]
pub enum SaveError {
    /// No project is active
    #[error("no active project")]
    NoProject,

    /// The active project's canvas never loaded; saving would overwrite it
    #[error("canvas for project {0} not loaded")]
    NotLoaded(ProjectId),

    /// Writing the snapshot blob failed; nothing was recorded as saved
    #[error("failed to write snapshot: {0}")]
    Snapshot(#[source] StoreError),

    /// The candidate state could not be serialized for comparison
    #[error("failed to serialize canvas state: {0}")]
    Digest(#[from] ModelError),
}

/// Umbrella error for callers driving the whole engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
