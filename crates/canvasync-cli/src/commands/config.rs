//! Config command - View and manage configuration
//!
//! Provides commands for viewing and modifying canvasync configuration:
//! - Show all configuration values with their sources
//! - Get and set individual values (local or global)
//! - Create config files and show where they live

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use canvasync_config::{CanvasyncConfig, ConfigLoader, LogFormat};
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;

use super::{load_config, resolve_workspace};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show all configuration values with their sources
    Show(ShowArgs),

    /// Get a specific configuration value
    Get(GetArgs),

    /// Set a configuration value
    Set(SetArgs),

    /// Create a config file with default settings
    Init(InitArgs),

    /// Show configuration file paths
    Path(PathArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Show only effective values (hide sources)
    #[arg(long)]
    effective: bool,
}

/// Arguments for the get command
#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Configuration key (e.g., "loader.chunk_size")
    key: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the set command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (e.g., "persistence.mode")
    key: String,

    /// Value to set
    value: String,

    /// Set in global config (~/.canvasync/config.toml) instead of local
    #[arg(long)]
    global: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Create the global config instead of the workspace one
    #[arg(long)]
    global: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Layer a setting's effective value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Default,
    Global,
    Local,
}

/// One leaf setting, keyed by its dotted path
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: Value,
    pub source: ValueSource,
}

#[derive(Debug, Clone, Serialize)]
struct ConfigFile {
    path: PathBuf,
    exists: bool,
}

impl ConfigFile {
    fn at(path: PathBuf) -> Self {
        let exists = path.exists();
        Self { path, exists }
    }

    fn describe(&self) -> String {
        let status = if self.exists { "exists" } else { "not found" };
        format!("{} ({})", self.path.display(), status)
    }
}

/// Where the global and workspace config files live
#[derive(Debug, Clone, Serialize)]
struct ConfigPaths {
    /// `None` without a home directory
    global: Option<ConfigFile>,
    local: ConfigFile,
}

impl ConfigPaths {
    fn resolve(loader: &ConfigLoader, workspace: &Path) -> Self {
        Self {
            global: loader.global_config_path().map(ConfigFile::at),
            local: ConfigFile::at(loader.local_config_path(workspace)),
        }
    }
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Get(args) => execute_get(args, global),
        ConfigCommand::Set(args) => execute_set(args, global),
        ConfigCommand::Init(args) => execute_init(args, global),
        ConfigCommand::Path(args) => execute_path(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let effective = load_config(&global, &workspace_path)?;

    if args.effective {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        } else {
            print!("{}", toml_like(&serde_json::to_value(&effective)?));
        }
        return Ok(());
    }

    let loader = ConfigLoader::new();
    let global_config = loader.load_global()?.unwrap_or_default();
    let local_config = loader.load_local(&workspace_path)?.unwrap_or_default();
    let values = collect_config_values(&global_config, &local_config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    let paths = ConfigPaths::resolve(&loader, &workspace_path);
    println!("Canvasync Configuration");
    println!("=======================\n");
    if let Some(ref file) = paths.global {
        println!("Global config: {}", file.describe());
    }
    println!("Local config:  {}", paths.local.describe());

    let mut section = "";
    for value in &values {
        let (prefix, name) = split_key(&value.key);
        if prefix != section {
            println!("\n[{}]", prefix);
            section = prefix;
        }
        match value.source {
            ValueSource::Default => println!("  {} = {}", name, value.value),
            ValueSource::Global => println!("  {} = {} (global)", name, value.value),
            ValueSource::Local => println!("  {} = {} (local)", name, value.value),
        }
    }

    Ok(())
}

fn execute_get(args: GetArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace_path)?;

    let value = get_config_value(&config, &args.key)
        .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", args.key))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match value {
            Value::String(s) => println!("{}", s),
            Value::Bool(b) => println!("{}", b),
            Value::Number(n) => println!("{}", n),
            Value::Null => println!("null"),
            other => println!("{}", serde_json::to_string_pretty(&other)?),
        }
    }

    Ok(())
}

fn execute_set(args: SetArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let loader = ConfigLoader::new();

    let mut config = if args.global {
        loader.load_global()?.unwrap_or_default()
    } else {
        loader.load_local(&workspace_path)?.unwrap_or_default()
    };

    set_config_value(&mut config, &args.key, &args.value)
        .with_context(|| format!("Failed to set configuration key: {}", args.key))?;
    config
        .validate()
        .with_context(|| format!("Rejected value for {}", args.key))?;

    if args.global {
        loader.save_global(&config)?;
        println!("Set {} = {} in global config", args.key, args.value);
    } else {
        loader.save_local(&workspace_path, &config)?;
        println!("Set {} = {} in local config", args.key, args.value);
    }

    Ok(())
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let loader = ConfigLoader::new();
    let path = if args.global {
        loader.init_global()?
    } else {
        loader.init_local(&resolve_workspace(&global)?)?
    };
    println!("Config: {}", path.display());
    Ok(())
}

fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let paths = ConfigPaths::resolve(&ConfigLoader::new(), &workspace_path);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    match paths.global {
        Some(ref file) => println!("Global: {}", file.describe()),
        None => println!("Global: not available (no home directory)"),
    }
    println!("Local:  {}", paths.local.describe());
    Ok(())
}

/// Get a configuration value by key path
fn get_config_value(config: &CanvasyncConfig, key: &str) -> Option<Value> {
    let json = serde_json::to_value(config).ok()?;

    let mut current = &json;
    for part in key.split('.') {
        current = current.get(part)?;
    }

    Some(current.clone())
}

/// Set a configuration value by key path
fn set_config_value(config: &mut CanvasyncConfig, key: &str, value: &str) -> Result<()> {
    match key {
        // Store
        "store.backend" => config.store.backend = value.parse()?,
        "store.sqlite_path" => config.store.sqlite_path = PathBuf::from(value),
        "store.remote.url" => config.store.remote.url = value.to_string(),
        "store.remote.api_key_env" => config.store.remote.api_key_env = value.to_string(),
        "store.remote.timeout_secs" => config.store.remote.timeout_secs = value.parse()?,
        "store.remote.snapshot_upsert" => config.store.remote.snapshot_upsert = value.parse()?,

        // Loader
        "loader.buffer_fraction" => config.loader.buffer_fraction = value.parse()?,
        "loader.debounce_ms" => config.loader.debounce_ms = value.parse()?,
        "loader.small_canvas_threshold" => config.loader.small_canvas_threshold = value.parse()?,
        "loader.chunk_size" => config.loader.chunk_size = value.parse()?,
        "loader.row_limit" => config.loader.row_limit = value.parse()?,
        "loader.eviction_distance" => config.loader.eviction_distance = value.parse()?,
        "loader.max_chunks" => config.loader.max_chunks = value.parse()?,
        "loader.count_ttl_ms" => config.loader.count_ttl_ms = value.parse()?,
        "loader.default_canvas_width" => config.loader.default_canvas_width = value.parse()?,
        "loader.default_canvas_height" => config.loader.default_canvas_height = value.parse()?,

        // Persistence
        "persistence.mode" => config.persistence.mode = value.parse()?,
        "persistence.debounce_ms" => config.persistence.debounce_ms = value.parse()?,

        // Logging
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => {
            config.logging.format = match value.to_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => anyhow::bail!("Unknown log format '{}' (expected text or json)", other),
            }
        }

        _ => anyhow::bail!("Unknown or read-only configuration key: {}", key),
    }

    Ok(())
}

/// Every leaf setting with the layer its value comes from.
///
/// A layer wins for a key when its value differs from the default, the
/// workspace file taking precedence over the global one.
fn collect_config_values(
    global: &CanvasyncConfig,
    local: &CanvasyncConfig,
) -> Result<Vec<ConfigValue>> {
    let default = leaves(&serde_json::to_value(CanvasyncConfig::default())?);
    let global = leaves(&serde_json::to_value(global)?);
    let local = leaves(&serde_json::to_value(local)?);

    Ok(default
        .into_iter()
        .map(|(key, default_value)| {
            let pick = |layer: &[(String, Value)]| {
                layer
                    .iter()
                    .find(|(k, v)| *k == key && *v != default_value)
                    .map(|(_, v)| v.clone())
            };
            let (value, source) = match (pick(local.as_slice()), pick(global.as_slice())) {
                (Some(value), _) => (value, ValueSource::Local),
                (None, Some(value)) => (value, ValueSource::Global),
                (None, None) => (default_value, ValueSource::Default),
            };
            ConfigValue { key, value, source }
        })
        .collect())
}

/// Flatten nested objects into `(dotted.key, leaf)` pairs grouped by section.
fn leaves(value: &Value) -> Vec<(String, Value)> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, out);
                }
            }
            leaf => out.push((prefix.to_string(), leaf.clone())),
        }
    }

    let mut out = Vec::new();
    walk("", value, &mut out);
    out.sort_by(|a, b| split_key(&a.0).0.cmp(split_key(&b.0).0));
    out
}

/// `"store.remote.url"` -> `("store.remote", "url")`
fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once('.').unwrap_or(("", key))
}

/// Render a JSON object as `[section]` blocks of `key = value` lines
fn toml_like(value: &Value) -> String {
    let mut out = String::new();
    let mut section = String::new();
    for (key, leaf) in leaves(value) {
        let (prefix, name) = split_key(&key);
        if prefix != section {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", prefix));
            section = prefix.to_string();
        }
        out.push_str(&format!("{} = {}\n", name, leaf));
    }
    out
}
