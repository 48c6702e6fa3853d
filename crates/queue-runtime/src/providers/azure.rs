//! Azure Service Bus transport over the Service Bus REST API.
//!
//! This module talks to a Service Bus namespace with plain HTTPS requests:
//! - Shared Access Signature tokens minted from the connection string key
//! - Send via `POST {queue}/messages`
//! - Peek-lock receive via `POST {queue}/messages/head`
//! - Acknowledgment via `DELETE {queue}/messages/{message_id}/{lock_token}`
//!
//! ## Error Mapping
//!
//! HTTP status codes are classified into [`AzureError`] and then mapped onto
//! [`QueueError`]. Transport failures never carry the request URL, so neither
//! the namespace nor the signature can leak through an error message.
//!
//! ## Example
//!
//! ```no_run
//! use queue_runtime::{
//!     AzureServiceBusConfig, AzureServiceBusTransport, ConnectionString, QueueConnection, QueueTransport,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = AzureServiceBusTransport::new(AzureServiceBusConfig::default())?;
//! let connection = transport
//!     .connect(&ConnectionString::new("Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=..."))
//!     .await?;
//! let sender = connection.open_sender(&"people".parse()?).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ConfigurationError, QueueError};
use crate::message::{LockToken, Message, MessageId, QueueName, ReceivedMessage, Timestamp};
use crate::provider::{AzureServiceBusConfig, ConnectionString, ProviderType, ServiceBusConnectionInfo};
use crate::transport::{QueueConnection, QueueReceiver, QueueSender, QueueTransport};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// Error Types
// ============================================================================

/// Azure Service Bus specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Message lock lost: {0}")]
    LockLost(String),

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Namespace is throttling requests: {0}")]
    Throttled(String),

    #[error("Service Bus error ({status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
}

impl AzureError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::PermissionDenied(_) => false,
            Self::QueueNotFound(_) => false,
            Self::LockLost(_) => false,
            Self::MessageTooLarge { .. } => false,
            Self::Throttled(_) => true,
            Self::ServiceError { status, .. } => *status >= 500,
            Self::NetworkError(_) => true,
            Self::InvalidResponse(_) => false,
            Self::ConfigurationError(_) => false,
        }
    }

    /// Map Azure error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        let provider = ProviderType::AzureServiceBus.name().to_string();
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::PermissionDenied(operation) => QueueError::PermissionDenied { operation },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::LockLost(message_id) => QueueError::LockLost { message_id },
            Self::MessageTooLarge { size, max_size } => {
                QueueError::MessageTooLarge { size, max_size }
            }
            Self::Throttled(message) => QueueError::ProviderError {
                provider,
                code: "Throttled".to_string(),
                message,
            },
            Self::ServiceError { status, message } => QueueError::ProviderError {
                provider,
                code: format!("Http{}", status),
                message,
            },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::InvalidResponse(message) => QueueError::ProviderError {
                provider,
                code: "InvalidResponse".to_string(),
                message,
            },
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
        }
    }

    /// Classify a non-success response.
    ///
    /// `operation` names the request in permission errors. On complete, a
    /// missing message means the lock token is no longer valid. The broker's
    /// error body carries tracking IDs and the namespace host, so it is only
    /// logged and never copied into the error.
    fn from_status(status: StatusCode, body: &str, operation: Operation, queue: &QueueName) -> Self {
        warn!(
            queue = %queue,
            operation = operation.name(),
            status = status.as_u16(),
            broker_detail = %summarize_body(body),
            "Service Bus rejected request"
        );

        let detail = format!("Service Bus returned {}", status.as_u16());
        match status {
            StatusCode::UNAUTHORIZED => Self::Authentication(detail),
            StatusCode::FORBIDDEN => Self::PermissionDenied(operation.name().to_string()),
            StatusCode::NOT_FOUND | StatusCode::GONE => match operation {
                Operation::Complete { message_id } => Self::LockLost(message_id),
                _ => Self::QueueNotFound(queue.to_string()),
            },
            StatusCode::PAYLOAD_TOO_LARGE => Self::MessageTooLarge {
                size: operation.body_size(),
                max_size: ProviderType::AzureServiceBus.max_message_size(),
            },
            StatusCode::TOO_MANY_REQUESTS => Self::Throttled(detail),
            other => Self::ServiceError {
                status: other.as_u16(),
                message: detail,
            },
        }
    }

    fn from_transport(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            Self::NetworkError(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            Self::NetworkError(format!("Connection failed: {}", error))
        } else {
            Self::NetworkError(format!("HTTP request failed: {}", error))
        }
    }
}

/// Keep broker error bodies short enough for a log line
fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no details returned".to_string();
    }
    trimmed.chars().take(256).collect()
}

/// Request kinds, for error classification
#[derive(Debug, Clone)]
enum Operation {
    Send { size: usize },
    Receive,
    Complete { message_id: String },
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Receive => "receive",
            Self::Complete { .. } => "complete",
        }
    }

    fn body_size(&self) -> usize {
        match self {
            Self::Send { size } => *size,
            _ => 0,
        }
    }
}

// ============================================================================
// Shared Access Signature
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Mints Shared Access Signature tokens from a namespace key.
///
/// A token authorizes every request under its resource URI until `se`:
/// `SharedAccessSignature sr={uri}&sig={signature}&se={expiry}&skn={key name}`
/// where the signature is the base64 HMAC-SHA256 of `"{uri}\n{expiry}"`.
#[derive(Clone)]
struct SasTokenProvider {
    key_name: String,
    key: Zeroizing<String>,
    lifetime: Duration,
}

impl SasTokenProvider {
    fn new(key_name: String, key: Zeroizing<String>, lifetime: Duration) -> Self {
        Self {
            key_name,
            key,
            lifetime,
        }
    }

    fn token(&self, resource_uri: &str, now: DateTime<Utc>) -> Result<String, AzureError> {
        let expiry = now.timestamp() + self.lifetime.as_secs() as i64;
        let encoded_uri = urlencoding::encode(resource_uri);
        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| AzureError::ConfigurationError(format!("Invalid shared access key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri,
            urlencoding::encode(&signature),
            expiry,
            urlencoding::encode(&self.key_name)
        ))
    }
}

impl fmt::Debug for SasTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasTokenProvider")
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

// ============================================================================
// Broker response metadata
// ============================================================================

/// `BrokerProperties` header returned with a peek-locked message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties {
    message_id: String,
    sequence_number: i64,
    lock_token: String,
    #[serde(default)]
    delivery_count: u32,
    /// RFC 1123 date, e.g. `Wed, 12 Dec 2012 21:26:38 GMT`
    #[serde(default)]
    locked_until_utc: Option<String>,
}

impl BrokerProperties {
    fn from_response(response: &Response) -> Result<Self, AzureError> {
        let raw = response
            .headers()
            .get(BROKER_PROPERTIES_HEADER)
            .ok_or_else(|| {
                AzureError::InvalidResponse("locked message has no BrokerProperties".to_string())
            })?
            .to_str()
            .map_err(|e| AzureError::InvalidResponse(format!("BrokerProperties: {}", e)))?;

        serde_json::from_str(raw).map_err(|e| {
            warn!(error = %e, "Failed to parse BrokerProperties header");
            AzureError::InvalidResponse("BrokerProperties header is malformed".to_string())
        })
    }

    fn locked_until(&self) -> Timestamp {
        self.locked_until_utc
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
            .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
            .unwrap_or_else(Timestamp::now)
    }
}

// ============================================================================
// Azure Service Bus Transport
// ============================================================================

/// Azure Service Bus transport.
///
/// Holds one pooled HTTP client; each connection gets its own endpoint and
/// signer parsed from the connection string it was opened with.
pub struct AzureServiceBusTransport {
    http_client: HttpClient,
    config: AzureServiceBusConfig,
}

impl AzureServiceBusTransport {
    /// Create new Azure Service Bus transport
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized
    pub fn new(config: AzureServiceBusConfig) -> Result<Self, QueueError> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AzureError::NetworkError(format!(
                    "Failed to create HTTP client: {}",
                    e.without_url()
                ))
                .to_queue_error()
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }
}

impl fmt::Debug for AzureServiceBusTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureServiceBusTransport")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for AzureServiceBusTransport {
    async fn connect(
        &self,
        credential: &ConnectionString,
    ) -> Result<Box<dyn QueueConnection>, QueueError> {
        let info = ServiceBusConnectionInfo::parse(credential)?;
        debug!(
            endpoint_host = info.endpoint.host_str().unwrap_or_default(),
            key_name = %info.shared_access_key_name,
            "Opening Service Bus connection"
        );

        let signer = SasTokenProvider::new(
            info.shared_access_key_name.clone(),
            info.shared_access_key.clone(),
            self.config.token_lifetime,
        );

        Ok(Box::new(AzureConnection {
            namespace: Arc::new(Namespace {
                http_client: self.http_client.clone(),
                endpoint: info.endpoint,
                signer,
                request_timeout: self.config.request_timeout,
            }),
            closed: AtomicBool::new(false),
        }))
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureServiceBus
    }
}

/// Endpoint, signer and HTTP client shared by one connection's channels
#[derive(Debug)]
struct Namespace {
    http_client: HttpClient,
    endpoint: Url,
    signer: SasTokenProvider,
    request_timeout: Duration,
}

impl Namespace {
    /// Base URL of a queue entity, without a trailing slash
    fn entity_url(&self, queue: &QueueName) -> Result<Url, AzureError> {
        self.endpoint
            .join(queue.as_str())
            .map_err(|e| AzureError::ConfigurationError(format!("Invalid queue address: {}", e)))
    }

    fn entity_path_url(&self, queue: &QueueName, path: &str) -> Result<Url, AzureError> {
        let base = self.entity_url(queue)?;
        Url::parse(&format!("{}/{}", base.as_str().trim_end_matches('/'), path))
            .map_err(|e| AzureError::ConfigurationError(format!("Invalid queue address: {}", e)))
    }

    fn authorization(&self, queue: &QueueName) -> Result<String, AzureError> {
        let resource = self.entity_url(queue)?;
        self.signer.token(resource.as_str(), Utc::now())
    }
}

// ============================================================================
// Scoped resources
// ============================================================================

struct AzureConnection {
    namespace: Arc<Namespace>,
    closed: AtomicBool,
}

impl AzureConnection {
    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "connection".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QueueConnection for AzureConnection {
    async fn open_sender(&self, queue: &QueueName) -> Result<Box<dyn QueueSender>, QueueError> {
        self.ensure_open()?;
        Ok(Box::new(AzureSender {
            namespace: Arc::clone(&self.namespace),
            queue: queue.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_receiver(
        &self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueReceiver>, QueueError> {
        self.ensure_open()?;
        Ok(Box::new(AzureReceiver {
            namespace: Arc::clone(&self.namespace),
            queue: queue.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct AzureSender {
    namespace: Arc<Namespace>,
    queue: QueueName,
    closed: AtomicBool,
}

impl AzureSender {
    async fn send_message(&self, message: Message) -> Result<(), AzureError> {
        let size = message.size();
        let max_size = ProviderType::AzureServiceBus.max_message_size();
        if size > max_size {
            return Err(AzureError::MessageTooLarge { size, max_size });
        }

        let url = self.namespace.entity_path_url(&self.queue, "messages")?;
        let content_type = message
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let response = self
            .namespace
            .http_client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.namespace.authorization(&self.queue)?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(message.body)
            .send()
            .await
            .map_err(AzureError::from_transport)?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(AzureError::from_status(
                status,
                &body,
                Operation::Send { size },
                &self.queue,
            ));
        }

        debug!(queue = %self.queue, size, "Message accepted by Service Bus");
        Ok(())
    }
}

#[async_trait]
impl QueueSender for AzureSender {
    async fn send(&self, message: Message) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "sender".to_string(),
            });
        }
        self.send_message(message)
            .await
            .map_err(AzureError::to_queue_error)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct AzureReceiver {
    namespace: Arc<Namespace>,
    queue: QueueName,
    closed: AtomicBool,
}

impl AzureReceiver {
    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed {
                resource: "receiver".to_string(),
            });
        }
        Ok(())
    }

    /// Peek-lock the head of the queue.
    ///
    /// The broker holds the request open for up to `wait_seconds` and answers
    /// `204 No Content` when nothing arrived.
    async fn lock_head(&self, wait_seconds: u64) -> Result<Option<ReceivedMessage>, AzureError> {
        let mut url = self.namespace.entity_path_url(&self.queue, "messages/head")?;
        url.query_pairs_mut()
            .append_pair("timeout", &wait_seconds.to_string());

        let response = self
            .namespace
            .http_client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.namespace.authorization(&self.queue)?)
            .body(bytes::Bytes::new())
            .timeout(Duration::from_secs(wait_seconds) + self.namespace.request_timeout)
            .send()
            .await
            .map_err(AzureError::from_transport)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(AzureError::from_status(
                status,
                &body,
                Operation::Receive,
                &self.queue,
            ));
        }

        let properties = BrokerProperties::from_response(&response)?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(AzureError::from_transport)?;

        let message_id = properties
            .message_id
            .parse::<MessageId>()
            .map_err(|e| AzureError::InvalidResponse(format!("MessageId: {}", e)))?;

        Ok(Some(ReceivedMessage {
            message_id,
            sequence_number: properties.sequence_number,
            body,
            content_type,
            lock_token: LockToken::new(properties.lock_token.clone()),
            delivery_count: properties.delivery_count,
            locked_until: properties.locked_until(),
        }))
    }
}

#[async_trait]
impl QueueReceiver for AzureReceiver {
    async fn receive(
        &self,
        max_wait: Duration,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.ensure_open()?;

        let deadline = Instant::now() + max_wait;
        let mut batch = Vec::new();

        while batch.len() < max_count as usize {
            // Only the first pull waits; later pulls drain what is already there
            let wait_seconds = if batch.is_empty() {
                deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs_f64()
                    .round() as u64
            } else {
                0
            };

            match self.lock_head(wait_seconds).await {
                Ok(Some(message)) => batch.push(message),
                Ok(None) => break,
                Err(e) if !batch.is_empty() => {
                    // Already-locked messages are still handed back
                    warn!(queue = %self.queue, error = %e, "Stopped filling receive batch early");
                    break;
                }
                Err(e) => return Err(e.to_queue_error()),
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        debug!(queue = %self.queue, count = batch.len(), "Peek-locked messages");
        Ok(batch)
    }

    async fn complete(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        self.ensure_open()?;

        let path = format!(
            "messages/{}/{}",
            urlencoding::encode(message.message_id.as_str()),
            urlencoding::encode(message.lock_token.as_str())
        );
        let url = self
            .namespace
            .entity_path_url(&self.queue, &path)
            .map_err(AzureError::to_queue_error)?;
        let authorization = self
            .namespace
            .authorization(&self.queue)
            .map_err(AzureError::to_queue_error)?;

        let response = self
            .namespace
            .http_client
            .delete(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| AzureError::from_transport(e).to_queue_error())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AzureError::from_status(
                status,
                &body,
                Operation::Complete {
                    message_id: message.message_id.to_string(),
                },
                &self.queue,
            )
            .to_queue_error());
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
