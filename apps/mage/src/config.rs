//! # Configuration
//!
//! Optional `mage.toml` file. Every key may be omitted.
//!
//! ```toml
//! database = "mage.db"
//! backend = "redb"      # or "memory"
//!
//! [cache]
//! capacity = 1024
//!
//! [log]
//! format = "text"       # or "json"
//! filter = "mage=debug"
//! ```
//!
//! Precedence: CLI flag > environment (`MAGE_LOG_FORMAT`, `RUST_LOG`) >
//! config file > built-in defaults.

use clap::ValueEnum;
use mage_core::MageError;
use mage_core::primitives::DEFAULT_CACHE_CAPACITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mage.toml";

/// Default database path.
pub const DEFAULT_DATABASE: &str = "mage.db";

/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "mage=info,mage_core=info";

// =============================================================================
// TYPES
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// ACID database file (redb).
    #[default]
    Redb,
    /// Volatile, process-local store.
    Memory,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse an environment value. Anything but `json` is text.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: Option<String>,
}

/// Contents of `mage.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub backend: Backend,
    pub cache: CacheConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            backend: Backend::default(),
            cache: CacheConfig::default(),
            log: LogConfig::default(),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Load `path`. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, MageError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            MageError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MageError> {
        toml::from_str(content)
            .map_err(|e| MageError::SerializationError(format!("Invalid config: {}", e)))
    }

    /// Log format after applying `MAGE_LOG_FORMAT` (passed in as `env`).
    pub fn log_format(&self, env: Option<&str>) -> LogFormat {
        env.map(LogFormat::from_env_value)
            .unwrap_or(self.log.format)
    }

    /// Tracing filter after applying `RUST_LOG` (passed in as `env`).
    pub fn log_filter(&self, env: Option<&str>) -> String {
        env.filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.log.filter.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}
