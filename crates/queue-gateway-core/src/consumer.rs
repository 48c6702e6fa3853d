//! Consumer path: pull a bounded batch, decode and acknowledge each message.
//!
//! Every pulled message is handled on its own. A message that does not decode
//! is left unacknowledged so the broker redelivers it once its lock expires; a
//! failed acknowledgment is recorded and the loop carries on. Neither fails the
//! call.
//!
//! By default the loop stops at the first message that was both decoded and
//! acknowledged. The rest of the batch stays locked until the broker lock
//! expires and is then delivered again.

use crate::config::GatewayConfig;
use crate::error::{DecodeError, GatewayError};
use crate::release;
use queue_runtime::{
    MessageId, QueueConnection, QueueError, QueueReceiver, QueueTransport, ReceivedMessage,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// How long a receive waits for the first message
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// Upper bound on the messages pulled per receive
pub const DEFAULT_MAX_MESSAGES: u32 = 20;

// ============================================================================
// Outcomes
// ============================================================================

/// When the consumer stops working through a pulled batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReceivePolicy {
    /// Return as soon as one message has been decoded and acknowledged
    #[default]
    StopAfterFirstDelivery,
    /// Decode and acknowledge every pulled message
    DrainBatch,
}

/// A received message that was decoded and acknowledged
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub message_id: String,
    pub sequence_number: i64,
    pub content: Map<String, Value>,
}

/// What happened to one pulled message
#[derive(Debug)]
pub enum MessageOutcome {
    /// Decoded, acknowledged and returned to the caller
    Delivered(DecodedMessage),
    /// Body was not a JSON object. Left unacknowledged.
    DecodeFailed {
        message_id: MessageId,
        error: DecodeError,
    },
    /// Decoded, but the acknowledgment failed. Not returned to the caller.
    ProcessingFailed {
        message_id: MessageId,
        error: QueueError,
    },
}

/// Result of one consumer call
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Nothing arrived within the wait window
    Empty,
    /// Outcomes of the messages handled, in receive order
    Processed(Vec<MessageOutcome>),
}

impl ReceiveOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Delivered messages, in receive order
    pub fn into_delivered(self) -> Vec<DecodedMessage> {
        match self {
            Self::Empty => Vec::new(),
            Self::Processed(outcomes) => outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    MessageOutcome::Delivered(message) => Some(message),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Decode a message body as a UTF-8 JSON object
pub fn decode_body(body: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    let text = std::str::from_utf8(body)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(DecodeError::NotAnObject { found: "array" }),
        Value::String(_) => Err(DecodeError::NotAnObject { found: "string" }),
        Value::Number(_) => Err(DecodeError::NotAnObject { found: "number" }),
        Value::Bool(_) => Err(DecodeError::NotAnObject { found: "boolean" }),
        Value::Null => Err(DecodeError::NotAnObject { found: "null" }),
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Pulls, decodes and acknowledges messages from the configured queue
#[derive(Clone)]
pub struct Consumer {
    transport: Arc<dyn QueueTransport>,
    config: Arc<GatewayConfig>,
    policy: ReceivePolicy,
}

impl Consumer {
    /// Create a consumer with the default receive policy
    pub fn new(transport: Arc<dyn QueueTransport>, config: Arc<GatewayConfig>) -> Self {
        Self::builder(transport, config).build()
    }

    pub fn builder(
        transport: Arc<dyn QueueTransport>,
        config: Arc<GatewayConfig>,
    ) -> ConsumerBuilder {
        ConsumerBuilder {
            transport,
            config,
            policy: ReceivePolicy::default(),
        }
    }

    pub fn policy(&self) -> ReceivePolicy {
        self.policy
    }

    /// Receive up to `max_count` messages, waiting at most `max_wait`.
    ///
    /// Only connection, channel and receive failures fail the call;
    /// per-message failures are reported in the outcome.
    #[instrument(skip(self), fields(queue = %self.config.queue_name(), policy = ?self.policy))]
    pub async fn receive_batch(
        &self,
        max_wait: Duration,
        max_count: u32,
    ) -> Result<ReceiveOutcome, GatewayError> {
        let connection = self
            .transport
            .connect(self.config.connection_string())
            .await
            .map_err(|e| {
                error!(error = %e, transient = e.is_transient(), "Failed to connect to broker");
                GatewayError::Connection(e)
            })?;

        let result = self
            .receive_on(connection.as_ref(), max_wait, max_count)
            .await;
        release("connection", connection.close().await);

        result
    }

    async fn receive_on(
        &self,
        connection: &dyn QueueConnection,
        max_wait: Duration,
        max_count: u32,
    ) -> Result<ReceiveOutcome, GatewayError> {
        let queue = self.config.queue_name();
        let receiver = connection.open_receiver(queue).await.map_err(|e| {
            error!(error = %e, "Failed to open receive channel");
            GatewayError::Channel {
                queue: queue.to_string(),
                source: e,
            }
        })?;

        let result = self.drain(receiver.as_ref(), max_wait, max_count).await;
        release("receiver", receiver.close().await);

        result
    }

    async fn drain(
        &self,
        receiver: &dyn QueueReceiver,
        max_wait: Duration,
        max_count: u32,
    ) -> Result<ReceiveOutcome, GatewayError> {
        let batch = receiver
            .receive(max_wait, max_count)
            .await
            .map_err(|e| {
                error!(error = %e, transient = e.is_transient(), "Failed to receive messages");
                GatewayError::Receive(e)
            })?;

        if batch.is_empty() {
            info!("Queue is empty");
            return Ok(ReceiveOutcome::Empty);
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for message in &batch {
            let outcome = Self::process(receiver, message).await;
            let delivered = matches!(outcome, MessageOutcome::Delivered(_));
            outcomes.push(outcome);

            if delivered && self.policy == ReceivePolicy::StopAfterFirstDelivery {
                break;
            }
        }

        if outcomes.len() < batch.len() {
            info!(
                pulled = batch.len(),
                handled = outcomes.len(),
                "Returning early; remaining messages stay locked until their lock expires"
            );
        }

        Ok(ReceiveOutcome::Processed(outcomes))
    }

    async fn process(receiver: &dyn QueueReceiver, message: &ReceivedMessage) -> MessageOutcome {
        let content = match decode_body(&message.body) {
            Ok(content) => content,
            Err(error) => {
                warn!(
                    message_id = %message.message_id,
                    sequence_number = message.sequence_number,
                    delivery_count = message.delivery_count,
                    error = %error,
                    "Failed to decode message; leaving it for redelivery"
                );
                return MessageOutcome::DecodeFailed {
                    message_id: message.message_id.clone(),
                    error,
                };
            }
        };

        match receiver.complete(message).await {
            Ok(()) => {
                info!(
                    message_id = %message.message_id,
                    sequence_number = message.sequence_number,
                    "Message received and acknowledged"
                );
                MessageOutcome::Delivered(DecodedMessage {
                    message_id: message.message_id.to_string(),
                    sequence_number: message.sequence_number,
                    content,
                })
            }
            Err(error) => {
                error!(
                    message_id = %message.message_id,
                    sequence_number = message.sequence_number,
                    error = %error,
                    "Failed to acknowledge message"
                );
                MessageOutcome::ProcessingFailed {
                    message_id: message.message_id.clone(),
                    error,
                }
            }
        }
    }
}

/// Builder for [`Consumer`]
pub struct ConsumerBuilder {
    transport: Arc<dyn QueueTransport>,
    config: Arc<GatewayConfig>,
    policy: ReceivePolicy,
}

impl ConsumerBuilder {
    pub fn policy(mut self, policy: ReceivePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Consumer {
        Consumer {
            transport: self.transport,
            config: self.config,
            policy: self.policy,
        }
    }
}
