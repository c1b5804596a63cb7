//! Configuration loading and management
//!
//! Handles parsing of `.todo.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::task::DEFAULT_OWNER_TAG;

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = ".todo.toml";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "TODO_DATA_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote list API
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Task defaults
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Merged view caching
    #[serde(default)]
    pub query: QueryConfig,
}

/// Remote list API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Collection endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Page size requested from the endpoint
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Request timeout
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://dummyjson.com/todos".to_string()
}

fn default_limit() -> u32 {
    30
}

fn default_remote_timeout_ms() -> u64 {
    10_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            limit: default_limit(),
            timeout_ms: default_remote_timeout_ms(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; platform data dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// How long a writer waits for a key's file lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Upper bound on a storage read or key scan
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_op_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

/// Task defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Owner tag given to new local tasks and synthesized remote tasks
    #[serde(default = "default_owner_tag")]
    pub default_owner_tag: i64,
}

fn default_owner_tag() -> i64 {
    DEFAULT_OWNER_TAG
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_owner_tag: default_owner_tag(),
        }
    }
}

/// Merged view caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Age after which a cached merged view is refetched
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    300
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a `.todo.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if it is
    /// missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the data directory: explicit override, then `TODO_DATA_DIR`,
    /// then `storage.dir`, then the platform data dir.
    pub fn data_dir(&self, explicit: Option<&Path>) -> crate::error::Result<PathBuf> {
        if let Some(dir) = explicit {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.storage.dir {
            return Ok(dir.clone());
        }
        default_data_dir()
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.remote.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Platform data directory for todo-sync
pub fn default_data_dir() -> crate::error::Result<PathBuf> {
    directories::ProjectDirs::from("", "", "todo-sync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            crate::error::Error::InvalidConfig(
                "cannot determine a data directory; pass --data-dir".to_string(),
            )
        })
}

impl RemoteConfig {
    fn validate(&self) -> crate::error::Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(crate::error::Error::InvalidConfig(format!(
                "remote.base_url must be http or https: '{url}'"
            )));
        }
        if self.limit == 0 || self.limit > 250 {
            return Err(crate::error::Error::InvalidConfig(
                "remote.limit must be between 1 and 250".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "remote.timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "storage.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.op_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "storage.op_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
