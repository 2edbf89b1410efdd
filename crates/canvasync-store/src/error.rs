//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote server returned an error status
    #[error("remote server error: {status} - {message}")]
    RemoteServer { status: u16, message: String },

    /// A record id collides with an existing row the write may not touch
    #[error("conflict writing {table}: {message}")]
    Conflict { table: String, message: String },

    /// Record id is not a store UUID
    #[error("invalid id '{id}': not a UUID")]
    InvalidId { id: String },

    /// Stored content could not be decoded
    #[error("model error: {0}")]
    Model(#[from] canvasync_core::ModelError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database file created by an incompatible version
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection error
    #[error("connection failed: {0}")]
    Connection(String),

    /// Generic error with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

impl StoreError {
    /// Create a Conflict error.
    pub fn conflict(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidId error.
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }

    /// Create a RemoteServer error.
    pub fn remote_server(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteServer {
            status,
            message: message.into(),
        }
    }

    /// Create a Connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Add context to any error.
    pub fn with_context(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether the store rejected the write because of a duplicate key
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::RemoteServer { status, .. } => *status == 409,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(_) | StoreError::Connection(_) => true,
            StoreError::RemoteServer { status, .. } => *status == 429 || *status >= 500,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
