//! Producer path: validate, serialize and enqueue one payload.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::payload::ApplicationPayload;
use crate::release;
use queue_runtime::{Message, QueueConnection, QueueTransport};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Sends single payloads to the configured queue.
///
/// Each call opens its own connection and send channel and closes both before
/// returning, sender first. Nothing is retried.
#[derive(Clone)]
pub struct Producer {
    transport: Arc<dyn QueueTransport>,
    config: Arc<GatewayConfig>,
}

impl Producer {
    pub fn new(transport: Arc<dyn QueueTransport>, config: Arc<GatewayConfig>) -> Self {
        Self { transport, config }
    }

    /// Enqueue one payload and wait for the broker to accept it.
    ///
    /// Exactly one message is enqueued on success and none on failure.
    #[instrument(skip(self, payload), fields(queue = %self.config.queue_name()))]
    pub async fn send<P: ApplicationPayload>(&self, payload: &P) -> Result<(), GatewayError> {
        payload.validate()?;
        let message = Message::json(serde_json::to_vec(payload)?);
        let size = message.size();

        let connection = self
            .transport
            .connect(self.config.connection_string())
            .await
            .map_err(|e| {
                error!(error = %e, transient = e.is_transient(), "Failed to connect to broker");
                GatewayError::Connection(e)
            })?;

        let result = self.send_on(connection.as_ref(), message).await;
        release("connection", connection.close().await);

        if result.is_ok() {
            info!(size, "Message sent to queue");
        }
        result
    }

    async fn send_on(
        &self,
        connection: &dyn QueueConnection,
        message: Message,
    ) -> Result<(), GatewayError> {
        let queue = self.config.queue_name();
        let sender = connection.open_sender(queue).await.map_err(|e| {
            error!(error = %e, "Failed to open send channel");
            GatewayError::Channel {
                queue: queue.to_string(),
                source: e,
            }
        })?;

        let result = sender.send(message).await.map_err(|e| {
            error!(error = %e, transient = e.is_transient(), "Broker did not accept message");
            GatewayError::SendRejected(e)
        });
        release("sender", sender.close().await);

        result
    }
}
