//! Provider types, credentials and configuration.

use crate::error::ConfigurationError;
use crate::message::QueueName;
use std::fmt;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// Scheme prefix selecting the in-process broker
pub const IN_MEMORY_SCHEME: &str = "memory:";

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    AzureServiceBus,
    InMemory,
}

impl ProviderType {
    /// Select the provider a connection string addresses
    pub fn for_connection_string(connection_string: &ConnectionString) -> Self {
        if connection_string.expose().starts_with(IN_MEMORY_SCHEME) {
            Self::InMemory
        } else {
            Self::AzureServiceBus
        }
    }

    /// Get maximum message body size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AzureServiceBus => 256 * 1024, // Standard tier
            Self::InMemory => 10 * 1024 * 1024,
        }
    }

    /// Name used in logs and provider errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::AzureServiceBus => "AzureServiceBus",
            Self::InMemory => "InMemory",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Opaque broker credential.
///
/// The value is wiped from memory on drop and never appears in `Debug` output.
#[derive(Clone)]
pub struct ConnectionString(Zeroizing<String>);

impl ConnectionString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Access the raw credential
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionString(<redacted>)")
    }
}

/// Parsed form of a Service Bus connection string:
/// `Endpoint=sb://<ns>.servicebus.windows.net/;SharedAccessKeyName=<name>;SharedAccessKey=<key>[;EntityPath=<queue>]`
#[derive(Clone)]
pub struct ServiceBusConnectionInfo {
    /// HTTP(S) base address of the namespace, always ending in `/`
    pub endpoint: Url,
    pub shared_access_key_name: String,
    pub shared_access_key: Zeroizing<String>,
    pub entity_path: Option<String>,
}

impl ServiceBusConnectionInfo {
    /// Parse a connection string.
    ///
    /// `sb://` endpoints are addressed over `https://`; `http://` and
    /// `https://` endpoints are used verbatim.
    pub fn parse(connection_string: &ConnectionString) -> Result<Self, ConfigurationError> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for segment in connection_string.expose().split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigurationError::Invalid {
                    message: "connection string segments must be key=value pairs".to_string(),
                })?;

            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                "sharedaccesskeyname" => key_name = Some(value.trim().to_string()),
                "sharedaccesskey" => key = Some(Zeroizing::new(value.trim().to_string())),
                "entitypath" => entity_path = Some(value.trim().to_string()),
                // Other keys (e.g. TransportType) do not affect the REST transport
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| ConfigurationError::Missing {
            key: "Endpoint".to_string(),
        })?;
        let shared_access_key_name = key_name
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "SharedAccessKeyName".to_string(),
            })?;
        let shared_access_key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "SharedAccessKey".to_string(),
            })?;

        Ok(Self {
            endpoint: Self::http_endpoint(&endpoint)?,
            shared_access_key_name,
            shared_access_key,
            entity_path: entity_path.filter(|p| !p.is_empty()),
        })
    }

    /// Check that an `EntityPath` key, when present, names `queue`.
    ///
    /// A key scoped to another entity is rejected by the broker on every
    /// request. Entity names compare case-insensitively.
    pub fn check_entity(&self, queue: &QueueName) -> Result<(), ConfigurationError> {
        match &self.entity_path {
            Some(entity) if !entity.eq_ignore_ascii_case(queue.as_str()) => {
                Err(ConfigurationError::Invalid {
                    message: format!(
                        "connection string EntityPath '{}' does not match queue '{}'",
                        entity, queue
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    fn http_endpoint(raw: &str) -> Result<Url, ConfigurationError> {
        let parsed = Url::parse(raw).map_err(|e| ConfigurationError::Invalid {
            message: format!("Endpoint is not a valid URL: {}", e),
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigurationError::Invalid {
                message: "Endpoint has no host".to_string(),
            })?;

        let base = match parsed.scheme() {
            "sb" => match parsed.port() {
                Some(port) => format!("https://{}:{}/", host, port),
                None => format!("https://{}/", host),
            },
            "http" | "https" => {
                let mut base = parsed.to_string();
                if !base.ends_with('/') {
                    base.push('/');
                }
                base
            }
            other => {
                return Err(ConfigurationError::Invalid {
                    message: format!("unsupported endpoint scheme '{}'", other),
                })
            }
        };

        Url::parse(&base).map_err(|e| ConfigurationError::Invalid {
            message: format!("Endpoint is not a valid URL: {}", e),
        })
    }
}

impl fmt::Debug for ServiceBusConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusConnectionInfo")
            .field("endpoint", &self.endpoint.as_str())
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &"<redacted>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

// ============================================================================
// Provider configuration
// ============================================================================

/// Azure Service Bus transport settings
#[derive(Debug, Clone)]
pub struct AzureServiceBusConfig {
    /// Upper bound on a single HTTP exchange with the namespace
    pub request_timeout: Duration,
    /// Lifetime of the shared access signature minted per connection
    pub token_lifetime: Duration,
}

impl Default for AzureServiceBusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            token_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// How long a received message stays hidden before redelivery
    pub lock_duration: Duration,
    pub max_message_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(60),
            max_message_size: ProviderType::InMemory.max_message_size(),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
