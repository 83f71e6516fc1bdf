//! Configuration for the database facade.
//!
//! Configuration is loaded from an optional TOML file and environment
//! variables prefixed with `SESSIONDB_`, later sources overriding earlier
//! ones. Every field has a serde default so a missing file yields a working
//! in-memory-cache-over-DuckDB setup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage engine type: "memory" or "duckdb"
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Connection string (database path for DuckDB; ":memory:" for transient)
    #[serde(default = "default_connection")]
    pub connection: String,
    /// Additional engine-specific options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

fn default_engine() -> String {
    "duckdb".to_string()
}

fn default_connection() -> String {
    ":memory:".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            connection: default_connection(),
            options: HashMap::new(),
        }
    }
}

/// Read-cache configuration for the caching decorator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Enable the caching decorator around the configured backend
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Hard byte budget for cached query results
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: usize,
    /// Width of a traffic-stats interval bucket, in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_size_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_interval_secs() -> u64 {
    900
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_size_bytes: default_max_size_bytes(),
            interval_secs: default_interval_secs(),
        }
    }
}

/// Complete facade configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DbConfig {
    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

impl DbConfig {
    /// Load configuration from an optional file plus `SESSIONDB_`-prefixed
    /// environment variables (e.g. `SESSIONDB_STORAGE__ENGINE=memory`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix("SESSIONDB").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Configuration for a transient in-memory engine with caching enabled.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                engine: "memory".to_string(),
                ..StorageConfig::default()
            },
            cache: CacheConfig::default(),
        }
    }
}
