//! Response types for the API.

use queue_gateway_core::{DecodedMessage, ReceiveOutcome};
use queue_runtime::Timestamp;
use serde::Serialize;

/// Confirmation returned when the broker accepted a message
pub const SEND_CONFIRMATION: &str = "Message sent successfully to the queue.";

/// Body returned when nothing arrived within the receive wait
pub const QUEUE_EMPTY: &str = "Queue is empty";

/// Send confirmation response
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub status: String,
}

impl SendResponse {
    pub fn accepted() -> Self {
        Self {
            status: SEND_CONFIRMATION.to_string(),
        }
    }
}

/// Receive response, either an empty-queue notice or the delivered messages
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReceiveResponse {
    Empty { message: String },
    Messages { messages: Vec<DecodedMessage> },
}

impl From<ReceiveOutcome> for ReceiveResponse {
    fn from(outcome: ReceiveOutcome) -> Self {
        if outcome.is_empty() {
            return Self::Empty {
                message: QUEUE_EMPTY.to_string(),
            };
        }
        Self::Messages {
            messages: outcome.into_delivered(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: Timestamp,
}

/// Error body, `{"detail": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}
