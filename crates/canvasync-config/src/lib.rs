//! Canvasync Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.canvasync/config.toml`
//! - Local config: `.canvasync/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::{ConfigError, IoAction};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for Canvasync.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CanvasyncConfig {
    /// Graph store configuration
    pub store: StoreConfig,

    /// Viewport loader tuning
    pub loader: LoaderConfig,

    /// Persistence controller configuration
    pub persistence: PersistenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Store
// ============================================================================

/// Graph store configuration.
///
/// # Example TOML
///
/// ```toml
/// [store]
/// backend = "remote"
///
/// [store.remote]
/// url = "http://localhost:54321"
/// api_key_env = "CANVASYNC_API_KEY"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Which store backend to use
    pub backend: StoreBackend,

    /// SQLite database path, relative paths resolve against the workspace root
    pub sqlite_path: PathBuf,

    /// Remote REST store settings
    pub remote: RemoteConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: PathBuf::from(".canvasync/canvas.db"),
            remote: RemoteConfig::default(),
        }
    }
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Embedded SQLite database (default)
    #[default]
    Sqlite,
    /// PostgREST-compatible remote store
    Remote,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "local" => Ok(Self::Sqlite),
            "remote" | "rest" => Ok(Self::Remote),
            other => Err(ConfigError::invalid_value(
                "store.backend",
                format!("unknown backend '{}' (expected sqlite or remote)", other),
            )),
        }
    }
}

/// Remote store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST endpoint (without `/rest/v1`)
    pub url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Whether the snapshot table supports upsert on `project_id`
    pub snapshot_upsert: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: "CANVASYNC_API_KEY".to_string(),
            timeout_secs: 30,
            snapshot_upsert: true,
        }
    }
}

impl RemoteConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Viewport loader tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Fraction of the screen size added around the visible area
    pub buffer_fraction: f64,

    /// Trailing debounce for viewport updates
    pub debounce_ms: u64,

    /// Projects with at most this many nodes load everything at once
    pub small_canvas_threshold: u64,

    /// Side length of a chunk cell in world units
    pub chunk_size: f64,

    /// Maximum rows per bounded query
    pub row_limit: usize,

    /// Chunks whose center is farther than this from the viewport center are evicted
    pub eviction_distance: f64,

    /// Maximum number of resident chunks
    pub max_chunks: usize,

    /// How long a project's total node count stays cached
    pub count_ttl_ms: u64,

    /// Screen size assumed when the caller does not supply one
    pub default_canvas_width: f64,
    pub default_canvas_height: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            buffer_fraction: 0.2,
            debounce_ms: 300,
            small_canvas_threshold: 50,
            chunk_size: 1000.0,
            row_limit: 75,
            eviction_distance: 3000.0,
            max_chunks: 12,
            count_ttl_ms: 30_000,
            default_canvas_width: 1200.0,
            default_canvas_height: 800.0,
        }
    }
}

impl LoaderConfig {
    /// Validate the loader tuning values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.buffer_fraction.is_finite() || self.buffer_fraction < 0.0 {
            return Err(ConfigError::invalid_value(
                "loader.buffer_fraction",
                "must be a non-negative number",
            ));
        }
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.0) {
            return Err(ConfigError::invalid_value("loader.chunk_size", "must be positive"));
        }
        if self.row_limit == 0 {
            return Err(ConfigError::invalid_value("loader.row_limit", "must be at least 1"));
        }
        if self.max_chunks == 0 {
            return Err(ConfigError::invalid_value("loader.max_chunks", "must be at least 1"));
        }
        if !(self.eviction_distance.is_finite() && self.eviction_distance > 0.0) {
            return Err(ConfigError::invalid_value(
                "loader.eviction_distance",
                "must be positive",
            ));
        }
        if self.default_canvas_width <= 0.0 || self.default_canvas_height <= 0.0 {
            return Err(ConfigError::invalid_value(
                "loader.default_canvas_width",
                "canvas dimensions must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Persistence controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Save mode
    pub mode: SaveMode,

    /// Quiet period before a debounced save fires
    pub debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: SaveMode::default(),
            debounce_ms: 2000,
        }
    }
}

/// When the controller writes to the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Save automatically after a quiet period (default)
    #[default]
    Debounced,
    /// Save only on explicit request
    Manual,
}

impl std::fmt::Display for SaveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debounced => write!(f, "debounced"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for SaveMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debounced" | "auto" => Ok(Self::Debounced),
            "manual" => Ok(Self::Manual),
            other => Err(ConfigError::invalid_value(
                "persistence.mode",
                format!("unknown save mode '{}' (expected debounced or manual)", other),
            )),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override store backend
    pub backend: Option<StoreBackend>,

    /// Override SQLite database path
    pub sqlite_path: Option<PathBuf>,

    /// Override remote store URL
    pub remote_url: Option<String>,

    /// Override save mode
    pub save_mode: Option<SaveMode>,

    /// Override log level
    pub log_level: Option<String>,
}

impl CanvasyncConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(backend) = overrides.backend {
            self.store.backend = backend;
        }

        if let Some(ref path) = overrides.sqlite_path {
            self.store.sqlite_path = path.clone();
        }

        if let Some(ref url) = overrides.remote_url {
            self.store.remote.url = url.clone();
        }

        if let Some(mode) = overrides.save_mode {
            self.persistence.mode = mode;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loader.validate()?;

        if self.store.backend == StoreBackend::Remote && self.store.remote.url.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "store.remote.url",
                "required when store.backend is 'remote'",
            ));
        }

        Ok(())
    }

    /// Get the effective SQLite database path for a workspace.
    pub fn sqlite_path(&self, workspace_root: &Path) -> PathBuf {
        if self.store.sqlite_path.is_absolute() {
            self.store.sqlite_path.clone()
        } else {
            workspace_root.join(&self.store.sqlite_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = CanvasyncConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.sqlite_path, PathBuf::from(".canvasync/canvas.db"));
        assert_eq!(config.loader.row_limit, 75);
        assert_eq!(config.loader.max_chunks, 12);
        assert_eq!(config.loader.debounce_ms, 300);
        assert_eq!(config.persistence.mode, SaveMode::Debounced);
        assert_eq!(config.persistence.debounce_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = CanvasyncConfig::default();
        let overrides = ConfigOverrides {
            backend: Some(StoreBackend::Remote),
            remote_url: Some("http://remote:54321".to_string()),
            save_mode: Some(SaveMode::Manual),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.store.backend, StoreBackend::Remote);
        assert_eq!(config.store.remote.url, "http://remote:54321");
        assert_eq!(config.persistence.mode, SaveMode::Manual);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sqlite_path_resolution() {
        let mut config = CanvasyncConfig::default();
        let workspace = PathBuf::from("/home/user/board");
        assert_eq!(
            config.sqlite_path(&workspace),
            PathBuf::from("/home/user/board/.canvasync/canvas.db")
        );

        config.store.sqlite_path = PathBuf::from("/var/lib/canvas.db");
        assert_eq!(config.sqlite_path(&workspace), PathBuf::from("/var/lib/canvas.db"));
    }

    #[test]
    fn test_remote_without_url_is_invalid() {
        let mut config = CanvasyncConfig::default();
        config.store.backend = StoreBackend::Remote;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.remote.url"));
    }

    #[test]
    fn test_loader_validation() {
        let cases = [
            (
                LoaderConfig {
                    buffer_fraction: -0.1,
                    ..Default::default()
                },
                "loader.buffer_fraction",
            ),
            (
                LoaderConfig {
                    chunk_size: 0.0,
                    ..Default::default()
                },
                "loader.chunk_size",
            ),
            (
                LoaderConfig {
                    row_limit: 0,
                    ..Default::default()
                },
                "loader.row_limit",
            ),
            (
                LoaderConfig {
                    max_chunks: 0,
                    ..Default::default()
                },
                "loader.max_chunks",
            ),
            (
                LoaderConfig {
                    eviction_distance: -5.0,
                    ..Default::default()
                },
                "loader.eviction_distance",
            ),
        ];

        for (loader, key) in cases {
            let err = loader.validate().unwrap_err();
            assert!(err.to_string().contains(key), "{} not in {}", key, err);
        }
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("REMOTE".parse::<StoreBackend>().unwrap(), StoreBackend::Remote);
        assert!("postgres".parse::<StoreBackend>().is_err());

        assert_eq!("manual".parse::<SaveMode>().unwrap(), SaveMode::Manual);
        assert_eq!("auto".parse::<SaveMode>().unwrap(), SaveMode::Debounced);
        assert_eq!(SaveMode::Manual.to_string(), "manual");
        assert_eq!(StoreBackend::Remote.to_string(), "remote");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let toml_str = r#"
            [store]
            backend = "remote"

            [store.remote]
            url = "http://localhost:54321"
            snapshot_upsert = false

            [persistence]
            mode = "manual"

            [logging]
            format = "json"
        "#;

        let config: CanvasyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Remote);
        assert!(!config.store.remote.snapshot_upsert);
        assert_eq!(config.store.remote.timeout_secs, 30);
        assert_eq!(config.persistence.mode, SaveMode::Manual);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.loader, LoaderConfig::default());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: CanvasyncConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_api_key_from_env() {
        let remote = RemoteConfig {
            api_key_env: "CANVASYNC_TEST_KEY_UNSET_7f3a".to_string(),
            ..Default::default()
        };
        assert!(remote.api_key().is_none());

        let remote = RemoteConfig {
            api_key_env: String::new(),
            ..Default::default()
        };
        assert!(remote.api_key().is_none());
    }
}
