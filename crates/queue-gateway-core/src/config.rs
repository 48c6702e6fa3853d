//! Broker configuration.
//!
//! The gateway needs exactly two values, read once at startup and shared
//! immutably afterwards:
//! - `CONNECTION_STRING`: opaque broker credential
//! - `QUEUE_NAME`: the single queue the gateway serves
//!
//! Sources (later sources override earlier ones):
//!  1. `./config/broker.{toml,yaml,json}`, optional
//!  2. the file named by `BROKER_CONFIG_FILE`, required when set
//!  3. process environment variables
//!
//! Keys may be written as `connection_string` or `CONNECTION_STRING` in files.

use queue_runtime::{ConfigurationError, ConnectionString, QueueName};
use std::fmt;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable holding the broker credential
pub const CONNECTION_STRING_VAR: &str = "CONNECTION_STRING";

/// Environment variable holding the queue name
pub const QUEUE_NAME_VAR: &str = "QUEUE_NAME";

/// Environment variable naming an explicit broker settings file
pub const BROKER_CONFIG_FILE_VAR: &str = "BROKER_CONFIG_FILE";

const DEFAULT_SEARCH_PATHS: [&str; 1] = ["config/broker"];

/// Validated broker configuration
#[derive(Clone)]
pub struct GatewayConfig {
    connection_string: ConnectionString,
    queue_name: QueueName,
}

impl GatewayConfig {
    /// Create configuration from already-parsed values
    ///
    /// # Errors
    /// Returns error if the connection string is blank
    pub fn new(
        connection_string: ConnectionString,
        queue_name: QueueName,
    ) -> Result<Self, ConfigurationError> {
        if connection_string.is_empty() {
            return Err(ConfigurationError::Missing {
                key: CONNECTION_STRING_VAR.to_string(),
            });
        }

        Ok(Self {
            connection_string,
            queue_name,
        })
    }

    /// Load configuration from the standard sources
    ///
    /// # Errors
    /// Returns error if a settings file is unreadable, either value is
    /// missing or blank, or the queue name is not a valid entity name
    pub fn load() -> Result<Self, ConfigurationError> {
        let explicit = std::env::var(BROKER_CONFIG_FILE_VAR)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(&DEFAULT_SEARCH_PATHS, explicit.as_deref())
    }

    /// Load configuration from the given optional files, an optional required
    /// file, and the process environment
    pub fn load_from(
        search_paths: &[&str],
        explicit: Option<&str>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        for path in search_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("broker settings could not be loaded: {}", e),
            })?;

        Self::from_lookup(|key| {
            settings
                .get_string(&key.to_ascii_lowercase())
                .or_else(|_| settings.get_string(key))
                .ok()
        })
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection_string = lookup(CONNECTION_STRING_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: CONNECTION_STRING_VAR.to_string(),
            })?;

        let queue_name = lookup(QUEUE_NAME_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: QUEUE_NAME_VAR.to_string(),
            })?;

        let queue_name = QueueName::new(queue_name).map_err(|e| ConfigurationError::Invalid {
            message: format!("{}: {}", QUEUE_NAME_VAR, e),
        })?;

        Self::new(ConnectionString::new(connection_string), queue_name)
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("connection_string", &"<REDACTED>")
            .field("queue_name", &self.queue_name)
            .finish()
    }
}
