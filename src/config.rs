//! Configuration loading.
//!
//! Everything has a default, so an empty file (or no file) gives the stock
//! setup: five named backends resolved from environment keys, 3 s probes,
//! 2 s cache operations and the stock tool policy.
//!
//! ```toml
//! fallback = "memory://"
//!
//! [[backends]]
//! name = "local"
//! env_key = "MUNIN_DRAGONFLY_URL"
//!
//! [health]
//! timeout = 3000
//! degraded_threshold = 500
//!
//! [cache]
//! write_strategy = "fan_out"
//! ```
//!
//! Durations are in milliseconds. Connection strings never live in this file
//! for named backends; only the environment key that holds them does.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::backend::{self, ConnectOptions};
use crate::cache::{CacheConfig, CachePolicy, ToolCache};
use crate::providers::{HealthConfig, HealthMonitor, ProviderRegistry};
use crate::{MuninError, Result};

/// Stock backends, in preference order for latency ties.
const DEFAULT_BACKENDS: &[(&str, &str)] = &[
    ("upstash", "MUNIN_UPSTASH_REDIS_URL"),
    ("redis-cloud", "MUNIN_REDIS_CLOUD_URL"),
    ("dragonfly-cloud", "MUNIN_DRAGONFLY_CLOUD_URL"),
    ("aiven", "MUNIN_AIVEN_DRAGONFLY_URL"),
    ("local", "MUNIN_DRAGONFLY_URL"),
];

/// A named backend and the environment key holding its connection string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub env_key: String,
}

impl BackendSpec {
    pub fn new(name: impl Into<String>, env_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_key: env_key.into(),
        }
    }
}

/// The stock backend list.
pub fn default_specs() -> Vec<BackendSpec> {
    DEFAULT_BACKENDS
        .iter()
        .map(|(name, key)| BackendSpec::new(*name, *key))
        .collect()
}

/// Read an environment variable; unset, empty or non-UTF-8 all mean `None`.
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MuninConfig {
    #[serde(default = "default_specs")]
    pub backends: Vec<BackendSpec>,
    /// Connection string of the backend used when no provider is healthy,
    /// e.g. `memory://`.
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub connection: ConnectOptions,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub policy: CachePolicy,
}

impl Default for MuninConfig {
    fn default() -> Self {
        Self {
            backends: default_specs(),
            fallback: None,
            connection: ConnectOptions::default(),
            health: HealthConfig::default(),
            cache: CacheConfig::default(),
            policy: CachePolicy::default(),
        }
    }
}

impl MuninConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MuninError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// An uninitialized registry using the configured connection timeouts.
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::with_options(self.connection)
    }

    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.health)
    }

    /// Build a tool cache over `registry`, opening the fallback backend if
    /// one is configured.
    pub fn tool_cache(&self, registry: Arc<ProviderRegistry>) -> Result<ToolCache> {
        let mut builder = ToolCache::builder()
            .registry(registry)
            .policy(self.policy.clone())
            .config(self.cache.clone());
        if let Some(connection) = &self.fallback {
            builder = builder.fallback(backend::open(connection, self.connection)?);
        }
        Ok(builder.build())
    }
}
