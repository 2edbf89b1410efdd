//! Layered configuration loading.
//!
//! A workspace's settings are the defaults, overlaid by the global file
//! (`~/.canvasync/config.toml`), overlaid by the workspace file
//! (`<workspace>/.canvasync/config.toml`), overlaid by CLI overrides.
//! Only keys that differ from their default take effect in an overlay.

use crate::error::ConfigError;
use crate::{
    CanvasyncConfig, ConfigOverrides, LoaderConfig, LoggingConfig, PersistenceConfig,
    RemoteConfig, StoreConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory holding the config file, both under `$HOME` and in a workspace
const CONFIG_DIR: &str = ".canvasync";

/// Finds, reads and writes canvasync config files.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// `~/.canvasync`, or `None` without a home directory
    global_dir: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_dir: dirs::home_dir().map(|home| home.join(CONFIG_DIR)),
        }
    }

    /// Loader whose global layer lives in `global_dir` instead of `$HOME`.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: Some(global_dir.into()),
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_dir.as_ref().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Effective configuration for `workspace_root`, validated.
    pub fn load(
        &self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<CanvasyncConfig, ConfigError> {
        let layers = [self.load_global()?, self.load_local(workspace_root)?];
        let config = layers
            .into_iter()
            .flatten()
            .fold(CanvasyncConfig::default(), merge_configs);
        finish(config, overrides)
    }

    /// Effective configuration from a single file over the defaults.
    ///
    /// Neither the global nor the workspace file is consulted.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<CanvasyncConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let config = merge_configs(CanvasyncConfig::default(), read_config(path)?);
        finish(config, overrides)
    }

    /// The global file as written, if there is one.
    pub fn load_global(&self) -> Result<Option<CanvasyncConfig>, ConfigError> {
        match self.global_config_path() {
            Some(path) => read_optional(&path),
            None => {
                debug!("No home directory, skipping global config");
                Ok(None)
            }
        }
    }

    /// The workspace file as written, if there is one.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<CanvasyncConfig>, ConfigError> {
        read_optional(&self.local_config_path(workspace_root))
    }

    pub fn save_global(&self, config: &CanvasyncConfig) -> Result<(), ConfigError> {
        let path = self.global_config_path().ok_or(ConfigError::NoHomeDir)?;
        write_config(&path, config)
    }

    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &CanvasyncConfig,
    ) -> Result<(), ConfigError> {
        write_config(&self.local_config_path(workspace_root), config)
    }

    /// Write a default global file unless one exists; returns its path.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let path = self.global_config_path().ok_or(ConfigError::NoHomeDir)?;
        init_file(path)
    }

    /// Write a default workspace file unless one exists; returns its path.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        init_file(self.local_config_path(workspace_root))
    }
}

fn finish(
    mut config: CanvasyncConfig,
    overrides: Option<&ConfigOverrides>,
) -> Result<CanvasyncConfig, ConfigError> {
    if let Some(overrides) = overrides {
        config.apply_overrides(overrides);
    }
    config.validate()?;
    Ok(config)
}

fn init_file(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        write_config(&path, &CanvasyncConfig::default())?;
    }
    Ok(path)
}

fn read_optional(path: &Path) -> Result<Option<CanvasyncConfig>, ConfigError> {
    if !path.exists() {
        trace!("No config at {:?}", path);
        return Ok(None);
    }
    debug!("Loading config from {:?}", path);
    read_config(path).map(Some)
}

fn read_config(path: &Path) -> Result<CanvasyncConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    toml::from_str(&content).map_err(|e| ConfigError::parse(path, e))
}

fn write_config(path: &Path, config: &CanvasyncConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.exists()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs. A field
/// left at its default in the overlay keeps the base value.
fn merge_configs(base: CanvasyncConfig, overlay: CanvasyncConfig) -> CanvasyncConfig {
    CanvasyncConfig {
        store: merge_store(base.store, overlay.store),
        loader: merge_loader(base.loader, overlay.loader),
        persistence: merge_persistence(base.persistence, overlay.persistence),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

/// Pick `overlay` when it differs from `default`, otherwise `base`.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge store config.
fn merge_store(base: StoreConfig, overlay: StoreConfig) -> StoreConfig {
    let default = StoreConfig::default();
    StoreConfig {
        backend: pick(base.backend, overlay.backend, default.backend),
        sqlite_path: pick(base.sqlite_path, overlay.sqlite_path, default.sqlite_path),
        remote: merge_remote(base.remote, overlay.remote),
    }
}

/// Merge remote store config.
fn merge_remote(base: RemoteConfig, overlay: RemoteConfig) -> RemoteConfig {
    let default = RemoteConfig::default();
    RemoteConfig {
        url: pick(base.url, overlay.url, default.url),
        api_key_env: pick(base.api_key_env, overlay.api_key_env, default.api_key_env),
        timeout_secs: pick(base.timeout_secs, overlay.timeout_secs, default.timeout_secs),
        snapshot_upsert: pick(
            base.snapshot_upsert,
            overlay.snapshot_upsert,
            default.snapshot_upsert,
        ),
    }
}

/// Merge loader config.
fn merge_loader(base: LoaderConfig, overlay: LoaderConfig) -> LoaderConfig {
    let d = LoaderConfig::default();
    LoaderConfig {
        buffer_fraction: pick(base.buffer_fraction, overlay.buffer_fraction, d.buffer_fraction),
        debounce_ms: pick(base.debounce_ms, overlay.debounce_ms, d.debounce_ms),
        small_canvas_threshold: pick(
            base.small_canvas_threshold,
            overlay.small_canvas_threshold,
            d.small_canvas_threshold,
        ),
        chunk_size: pick(base.chunk_size, overlay.chunk_size, d.chunk_size),
        row_limit: pick(base.row_limit, overlay.row_limit, d.row_limit),
        eviction_distance: pick(
            base.eviction_distance,
            overlay.eviction_distance,
            d.eviction_distance,
        ),
        max_chunks: pick(base.max_chunks, overlay.max_chunks, d.max_chunks),
        count_ttl_ms: pick(base.count_ttl_ms, overlay.count_ttl_ms, d.count_ttl_ms),
        default_canvas_width: pick(
            base.default_canvas_width,
            overlay.default_canvas_width,
            d.default_canvas_width,
        ),
        default_canvas_height: pick(
            base.default_canvas_height,
            overlay.default_canvas_height,
            d.default_canvas_height,
        ),
    }
}

/// Merge persistence config.
fn merge_persistence(base: PersistenceConfig, overlay: PersistenceConfig) -> PersistenceConfig {
    let default = PersistenceConfig::default();
    PersistenceConfig {
        mode: pick(base.mode, overlay.mode, default.mode),
        debounce_ms: pick(base.debounce_ms, overlay.debounce_ms, default.debounce_ms),
    }
}

/// Merge logging config.
fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    let default = LoggingConfig::default();
    LoggingConfig {
        level: pick(base.level, overlay.level, default.level),
        format: pick(base.format, overlay.format, default.format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogFormat, SaveMode, StoreBackend};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_config(content: &str, dir: &Path) -> PathBuf {
        let config_dir = dir.join(".canvasync");
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn write_global(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config, CanvasyncConfig::default());
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        create_test_config(
            r#"
            [store]
            sqlite_path = "data/board.db"

            [loader]
            row_limit = 120
            "#,
            temp.path(),
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.store.sqlite_path, PathBuf::from("data/board.db"));
        assert_eq!(config.loader.row_limit, 120);
        assert_eq!(config.loader.max_chunks, 12);
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        write_global(
            &global_dir,
            r#"
            [logging]
            level = "debug"

            [store.remote]
            url = "http://global:54321"
            timeout_secs = 10
            "#,
        );

        create_test_config(
            r#"
            [store.remote]
            url = "http://local:54321"
            "#,
            temp.path(),
        );

        let loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.store.remote.url, "http://local:54321");
        // Values the local file leaves alone come from the global file
        assert_eq!(config.store.remote.timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_all() {
        let temp = TempDir::new().unwrap();

        create_test_config(
            r#"
            [persistence]
            mode = "manual"
            "#,
            temp.path(),
        );

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let overrides = ConfigOverrides {
            save_mode: Some(SaveMode::Debounced),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };

        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.persistence.mode, SaveMode::Debounced);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("canvas.toml");
        std::fs::write(
            &path,
            r#"
            [loader]
            max_chunks = 4
            "#,
        )
        .unwrap();

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let overrides = ConfigOverrides {
            save_mode: Some(SaveMode::Manual),
            ..Default::default()
        };
        let config = loader.load_file(&path, Some(&overrides)).unwrap();

        assert_eq!(config.loader.max_chunks, 4);
        assert_eq!(config.loader.chunk_size, 1000.0);
        assert_eq!(config.persistence.mode, SaveMode::Manual);
    }

    #[test]
    fn test_load_rejects_invalid_merged_config() {
        let temp = TempDir::new().unwrap();
        create_test_config(
            r#"
            [store]
            backend = "remote"
            "#,
            temp.path(),
        );

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();
        assert_eq!(err.key(), Some("store.remote.url"));
    }

    #[test]
    fn test_parse_error_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = create_test_config("[loader\nrow_limit = ", temp.path());

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        match loader.load(temp.path(), None) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let mut config = CanvasyncConfig::default();
        config.store.backend = StoreBackend::Remote;
        config.store.remote.url = "http://saved:54321".to_string();
        config.logging.format = LogFormat::Json;

        loader.save_local(temp.path(), &config).unwrap();

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(temp.path(), None).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_init_local_creates_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config_path = loader.init_local(temp.path()).unwrap();

        assert!(config_path.exists());
        assert!(config_path.ends_with(".canvasync/config.toml"));

        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: CanvasyncConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, CanvasyncConfig::default());

        // A second init leaves an edited file alone
        std::fs::write(&config_path, "[loader]\nrow_limit = 10\n").unwrap();
        loader.init_local(temp.path()).unwrap();
        assert!(std::fs::read_to_string(&config_path)
            .unwrap()
            .contains("row_limit = 10"));
    }

    #[test]
    fn test_overlay_default_keeps_base() {
        let base = LoaderConfig {
            chunk_size: 500.0,
            ..Default::default()
        };
        let overlay = LoaderConfig {
            max_chunks: 4,
            ..Default::default()
        };

        let merged = merge_loader(base, overlay);

        assert_eq!(merged.chunk_size, 500.0);
        assert_eq!(merged.max_chunks, 4);
    }
}
