//! Configuration management for Floodgate.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `FLOODGATE__*` environment variables (`__` separates nested keys).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::MAX_WINDOW_SECS;

const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to the per-operation rules file
    #[serde(default)]
    pub rules_path: Option<String>,

    /// How often expired counters are swept, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Requests allowed per client address per global window
    #[serde(default = "default_global_limit")]
    pub global_limit: u64,

    /// Global window length in seconds
    #[serde(default = "default_global_window")]
    pub global_window_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            cleanup_interval_secs: default_cleanup_interval(),
            global_limit: default_global_limit(),
            global_window_secs: default_global_window(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_global_limit() -> u64 {
    1000
}

fn default_global_window() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Interval between cleanup sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl FloodgateConfig {
    /// Load configuration from an optional file path plus the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let config: FloodgateConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiters cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.global_limit == 0 {
            return Err(FloodgateError::Config(
                "rate_limiting.global_limit must be greater than zero".to_string(),
            ));
        }
        if rl.global_window_secs == 0 {
            return Err(FloodgateError::Config(
                "rate_limiting.global_window_secs must be greater than zero".to_string(),
            ));
        }
        if rl.global_window_secs > MAX_WINDOW_SECS {
            return Err(FloodgateError::Config(format!(
                "rate_limiting.global_window_secs must be at most {}",
                MAX_WINDOW_SECS
            )));
        }
        if rl.cleanup_interval_secs == 0 {
            return Err(FloodgateError::Config(
                "rate_limiting.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
