//! Error types for the producer and consumer paths.

use queue_runtime::{QueueError, ValidationError};
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Failure of a whole producer or consumer call
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] ValidationError),

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to connect to the message broker: {0}")]
    Connection(#[source] QueueError),

    #[error("Failed to open a channel to queue '{queue}': {source}")]
    Channel {
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error("Message was not accepted by the broker: {0}")]
    SendRejected(#[source] QueueError),

    #[error("Failed to receive messages: {0}")]
    Receive(#[source] QueueError),
}

impl GatewayError {
    /// Check if the failure was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidPayload(_) | Self::Serialization(_))
    }

    /// Check if error is transient (a later attempt may succeed)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidPayload(_) | Self::Serialization(_) => false,
            Self::Connection(e) | Self::SendRejected(e) | Self::Receive(e) => e.is_transient(),
            Self::Channel { source, .. } => source.is_transient(),
        }
    }
}

/// Why a received message body could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Message body is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("Message body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Message body is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}
