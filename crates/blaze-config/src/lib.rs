//! Configuration for the blaze sync core.
//!
//! A workspace may carry a `blaze.toml` with three sections:
//! - `[sync]`: user preferences consulted when sync requests are constructed
//! - `[build]`: build tool binary and extra flags forwarded on every invocation
//! - `[logging]`: `tracing` level, format and sinks
//!
//! Every section is optional; missing sections fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::ReentrantMutex;
use thiserror::Error;

mod logging;

pub use logging::{init_tracing, tracing_setup, LogBuffer, LoggingConfig, TracingSetup};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlazeConfig {
    /// Sync preferences.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Build tool invocation settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Global logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Expand full and incremental syncs to the targets touched by pending VCS changes.
    #[serde(default)]
    pub expand_sync_to_working_set: bool,

    /// Persist the reconciled target map in the project data directory so a `startup` sync can
    /// restore it without invoking the build tool.
    #[serde(default = "SyncConfig::default_persist_sync_state")]
    pub persist_sync_state: bool,
}

impl SyncConfig {
    fn default_persist_sync_state() -> bool {
        true
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expand_sync_to_working_set: false,
            persist_sync_state: Self::default_persist_sync_state(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Path to the build tool binary. When unset the binary is chosen from the project's build
    /// system (`bazel` or `blaze`).
    #[serde(default)]
    pub binary: Option<String>,

    /// Extra flags appended to every build tool invocation.
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl BlazeConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: BlazeConfig = toml::from_str(text)?;
        config.build.flags.retain(|flag| !flag.trim().is_empty());
        if config.logging.buffer_lines == 0 {
            tracing::warn!(
                target: "blaze.config",
                "logging.buffer_lines must be >= 1; using the default"
            );
            config.logging.buffer_lines = LoggingConfig::default_buffer_lines();
        }
        Ok(config)
    }
}

pub const BLAZE_CONFIG_ENV_VAR: &str = "BLAZE_SYNC_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that temporarily set [`BLAZE_CONFIG_ENV_VAR`] must wrap the mutation and the discovery
/// call in this helper; environment variables are process-global.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a workspace root.
///
/// Search order:
/// 1) `BLAZE_SYNC_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `blaze.toml` in `workspace_root`
/// 3) `.blaze.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(BLAZE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["blaze.toml", ".blaze.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a workspace root.
///
/// If no config is present, returns [`BlazeConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(BlazeConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((BlazeConfig::default(), None));
    };

    let config = BlazeConfig::load_from_path(&path)?;
    tracing::debug!(
        target: "blaze.config",
        path = %path.display(),
        "loaded workspace config"
    );
    Ok((config, Some(path)))
}
