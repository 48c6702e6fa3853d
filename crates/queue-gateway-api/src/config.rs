//! Configuration types for the HTTP service
//!
//! Sources (applied in order, later sources override earlier ones):
//!  1. `/etc/queue-gateway/service.{yaml,toml,json}`: system-wide defaults
//!  2. `./config/service.{yaml,toml,json}`: deployment-local override
//!  3. Path given by the `QG_CONFIG_FILE` env var: operator-specified file
//!  4. Environment variables prefixed `QG__` (double-underscore separator),
//!     e.g. `QG__SERVER__PORT=9090` sets `server.port = 9090`
//!
//! Every field carries a default, so absent files produce a valid config. A
//! malformed file or a value that cannot be coerced to its field type is an
//! error.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_VAR: &str = "QG_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "QG";

const DEFAULT_SEARCH_PATHS: [&str; 2] = ["/etc/queue-gateway/service", "config/service"];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from the standard sources
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_FILE_VAR)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(&DEFAULT_SEARCH_PATHS, explicit.as_deref())
    }

    /// Load configuration from the given optional files, an optional required
    /// file, and the environment
    pub fn load_from(search_paths: &[&str], explicit: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        for path in search_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }
        if self.server.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "server.timeout_seconds must be at least 1".to_string(),
            });
        }
        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be at least 1".to_string(),
            });
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "logging.level '{}' is not one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the gateway's own crates
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    ///
    /// Transport internals stay at `warn` whatever the configured level.
    pub fn default_directive(&self) -> String {
        let level = self.level.to_ascii_lowercase();
        format!(
            "queue_gateway_service={level},queue_gateway_api={level},queue_gateway_core={level},queue_runtime=warn,tower_http=info"
        )
    }
}
