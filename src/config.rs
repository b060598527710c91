//! Configuration management for range-serve

use crate::cache::CacheLimits;
use crate::error::{RangeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// How resource handlers are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Handlers run as tasks on the async runtime
    #[default]
    NonBlocking,
    /// Each request is driven to completion on a blocking worker thread
    Blocking,
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    /// Address the HTTP server binds to (default: "127.0.0.1:8080")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Directory served by the filesystem provider (default: ".")
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Whether to advertise `Accept-Ranges: bytes` (default: true)
    #[serde(default = "default_true")]
    pub send_accept_ranges: bool,

    /// Whether files get an entity tag (default: true)
    #[serde(default = "default_true")]
    pub generate_etags: bool,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub metrics_endpoint: MetricsEndpointConfig,
}

/// Configuration for the in-memory buffer cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Whether the filesystem provider is wrapped in the cache (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Maximum number of cached resources (default: 1000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum total cached bytes (default: 64MB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Largest single resource that is cached (default: 1MB)
    #[serde(default = "default_max_entry_size")]
    pub max_entry_size: u64,

    /// Entries older than this are refetched; unset means no expiry
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            max_entry_size: default_max_entry_size(),
            max_age_secs: None,
        }
    }
}

impl CacheConfig {
    /// Limits for a [`BufferCache`](crate::cache::BufferCache)
    pub fn limits(&self) -> CacheLimits {
        CacheLimits {
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            max_entry_size: self.max_entry_size,
            max_age: self.max_age_secs.map(Duration::from_secs),
        }
    }

    /// Validate the cache configuration
    ///
    /// Only checked when the cache is enabled.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.max_entries == 0 {
            return Err(RangeError::ConfigError(
                "cache max_entries must be greater than 0".to_string(),
            ));
        }

        if self.max_bytes == 0 {
            return Err(RangeError::ConfigError(
                "cache max_bytes must be greater than 0".to_string(),
            ));
        }

        if self.max_entry_size == 0 || self.max_entry_size > self.max_bytes {
            return Err(RangeError::ConfigError(format!(
                "cache max_entry_size must be between 1 and max_bytes ({}), got {}",
                self.max_bytes, self.max_entry_size
            )));
        }

        if self.max_age_secs == Some(0) {
            return Err(RangeError::ConfigError(
                "cache max_age_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_root_dir() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    1000
}

fn default_max_bytes() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_max_entry_size() -> u64 {
    1024 * 1024 // 1MB
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for RangeConfig {
    fn default() -> Self {
        RangeConfig {
            listen_address: default_listen_address(),
            root_dir: default_root_dir(),
            execution_mode: ExecutionMode::default(),
            send_accept_ranges: default_true(),
            generate_etags: default_true(),
            cache: CacheConfig::default(),
            metrics_endpoint: MetricsEndpointConfig::default(),
        }
    }
}

fn parse_address(field: &str, value: &str) -> Result<SocketAddr> {
    value.parse().map_err(|e| {
        RangeError::ConfigError(format!("Invalid {} '{}': {}", field, value, e))
    })
}

impl RangeConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(RangeConfig)` if loading and validation succeed
    /// * `Err(RangeError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RangeError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: RangeConfig = serde_yaml::from_str(content).map_err(|e| {
            RangeError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address and metrics_endpoint.address must be socket addresses
    /// - root_dir must not be empty
    /// - cache limits must be positive and consistent when the cache is enabled
    pub fn validate(&self) -> Result<()> {
        parse_address("listen_address", &self.listen_address)?;

        if self.metrics_endpoint.enabled {
            parse_address("metrics_endpoint address", &self.metrics_endpoint.address)?;
        }

        if self.root_dir.trim().is_empty() {
            return Err(RangeError::ConfigError(
                "root_dir must not be empty".to_string(),
            ));
        }

        self.cache.validate()
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_address("listen_address", &self.listen_address)
    }

    /// Parsed metrics endpoint address, if the endpoint is enabled
    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        if !self.metrics_endpoint.enabled {
            return Ok(None);
        }
        parse_address("metrics_endpoint address", &self.metrics_endpoint.address).map(Some)
    }
}
