//! Configuration management for the Hive client
//!
//! Loads configuration from TOML/YAML/JSON files and environment variables.
//! Environment variables override file values.

use crate::cache::DEFAULT_EXPIRATION_SECS;
use crate::error::RpcError;
use crate::nodes::{validate_node_url, NodeFilter, NodeList, NodePool};
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// RPC client configuration
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Object cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Node selection from the bundled table
    #[serde(default)]
    pub nodes: NodeFilter,
}

/// RPC client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Candidate node URLs; empty means the bundled list
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Node rotations allowed before giving up
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,
    /// Same-node call repeats allowed before escalating
    #[serde(default = "default_num_retries_call")]
    pub num_retries_call: u32,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_ms: u64,
    /// Sleep after the first consecutive failure
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    /// Sleep added per further consecutive failure
    #[serde(default = "default_backoff_step")]
    pub backoff_step_ms: u64,
    /// Upper bound on a single sleep
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_num_retries() -> u32 {
    20
}

fn default_num_retries_call() -> u32 {
    5
}

fn default_rpc_timeout() -> u64 {
    60000
}

fn default_backoff_initial() -> u64 {
    500
}

fn default_backoff_step() -> u64 {
    1500
}

fn default_backoff_max() -> u64 {
    10000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            num_retries: default_num_retries(),
            num_retries_call: default_num_retries_call(),
            timeout_ms: default_rpc_timeout(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_step_ms: default_backoff_step(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

/// Object cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds
    #[serde(default = "default_expiration")]
    pub default_expiration_secs: u64,
    /// Purge expired entries on access
    #[serde(default = "default_auto_clean")]
    pub auto_clean: bool,
}

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION_SECS
}

fn default_auto_clean() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_expiration_secs: default_expiration(),
            auto_clean: default_auto_clean(),
        }
    }
}

impl CacheConfig {
    pub fn default_expiration(&self) -> Duration {
        Duration::from_secs(self.default_expiration_secs)
    }
}

/// Upper bound for configured timeouts, backoff and cache lifetime
const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (HIVE_*)
    /// 2. config/hive.{toml,yaml,json} (if exists)
    /// 3. hive.{toml,yaml,json} (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::with_name("hive").required(false))
            .add_source(File::with_name("config/hive").required(false))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from one file, still overridden by the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from(path).required(true))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("rpc.num_retries", default_num_retries())?
            .set_default("rpc.num_retries_call", default_num_retries_call())?
            .set_default("rpc.timeout_ms", default_rpc_timeout())?
            .set_default("rpc.backoff_initial_ms", default_backoff_initial())?
            .set_default("rpc.backoff_step_ms", default_backoff_step())?
            .set_default("rpc.backoff_max_ms", default_backoff_max())?
            .set_default("cache.default_expiration_secs", default_expiration())?
            .set_default("cache.auto_clean", default_auto_clean())
    }

    // HIVE_RPC__NUM_RETRIES=5 -> rpc.num_retries = 5
    // HIVE_RPC__NODES=https://a,https://b -> rpc.nodes = ["https://a", "https://b"]
    fn environment() -> Environment {
        Environment::with_prefix("HIVE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("rpc.nodes")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "RPC timeout must be greater than zero".to_string(),
            ));
        }

        if self.cache.default_expiration_secs == 0 {
            return Err(ConfigError::Message(
                "Cache default expiration must be greater than zero".to_string(),
            ));
        }

        if self.rpc.timeout_ms > MAX_DURATION_MS
            || self.rpc.backoff_initial_ms > MAX_DURATION_MS
            || self.rpc.backoff_step_ms > MAX_DURATION_MS
            || self.rpc.backoff_max_ms > MAX_DURATION_MS
        {
            return Err(ConfigError::Message(
                "RPC timeout and backoff values must not exceed one day".to_string(),
            ));
        }

        if self.cache.default_expiration_secs > MAX_DURATION_MS / 1000 {
            return Err(ConfigError::Message(
                "Cache default expiration must not exceed one day".to_string(),
            ));
        }

        if self.rpc.backoff_initial_ms > self.rpc.backoff_max_ms {
            return Err(ConfigError::Message(
                "RPC backoff initial delay must not exceed the maximum".to_string(),
            ));
        }

        for url in &self.rpc.nodes {
            validate_node_url(url.trim()).map_err(|e| ConfigError::Message(e.to_string()))?;
        }

        Ok(())
    }

    /// Candidate nodes: the configured list, or the bundled table filtered by `nodes`
    pub fn node_pool(&self) -> Result<NodePool, RpcError> {
        if self.rpc.nodes.is_empty() {
            NodePool::new(NodeList::new().get_nodes(&self.nodes))
        } else {
            NodePool::new(&self.rpc.nodes)
        }
    }
}
