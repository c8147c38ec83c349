//! Configuration for the Remora daemon and clients.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $REMORA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/remora/config.toml
//!   3. ~/.config/remora/config.toml
//!
//! Clients find the server through $REMORA_SERVER (`host[:port]`). When it is
//! unset or empty they execute in-process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Port used when an address names no port.
pub const DEFAULT_PORT: u16 = 9465;

/// Environment variable holding the client's server address.
pub const SERVER_ENV: &str = "REMORA_SERVER";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoraConfig {
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
    pub checkpoints: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the HTTP transport.
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Concurrent executions. 0 = one per core.
    pub workers: u32,
    /// Upper bound on how long the dispatcher waits before rechecking shutdown.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory holding one file per checkpointed result id.
    pub path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: format!("127.0.0.1:{DEFAULT_PORT}"),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("checkpoints"),
        }
    }
}

impl ExecutorConfig {
    /// Worker count with 0 expanded to the number of cores.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers as usize
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("remora")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("remora")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RemoraConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(RemoraConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("REMORA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    pub fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(&RemoraConfig::default())
            .map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply REMORA_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("REMORA_SERVER__BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("REMORA_EXECUTOR__WORKERS") {
            if let Ok(n) = v.parse() {
                self.executor.workers = n;
            }
        }
        if let Some(v) = var("REMORA_EXECUTOR__POLL_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.executor.poll_interval_ms = n;
            }
        }
        if let Some(v) = var("REMORA_CHECKPOINTS__PATH") {
            self.checkpoints.path = PathBuf::from(v);
        }
    }
}

// ── Client address ────────────────────────────────────────────────────────────

/// Where a client sends its commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    /// Parse `host[:port]`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = || ConfigError::InvalidAddress(raw.to_string());
        let (host, port) = match raw.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (raw, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Address from $REMORA_SERVER, or `None` for in-process execution.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_var(std::env::var(SERVER_ENV).ok())
    }

    /// Address from a raw variable value. Unset or blank means `None`.
    pub fn from_var(raw: Option<String>) -> Result<Option<Self>, ConfigError> {
        match raw {
            Some(v) if !v.trim().is_empty() => Self::parse(&v).map(Some),
            _ => Ok(None),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
