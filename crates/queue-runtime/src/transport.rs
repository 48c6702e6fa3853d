//! Transport traits for scoped broker access.
//!
//! A caller connects with a credential, opens a sender or receiver bound to
//! one queue, uses it, and closes the channel and then the connection. Every
//! resource is closed explicitly with `close()`; implementations must treat a
//! dropped-but-unclosed resource as released as well.

use crate::error::QueueError;
use crate::message::{Message, QueueName, ReceivedMessage};
use crate::provider::{
    AzureServiceBusConfig, ConnectionString, InMemoryConfig, ProviderType,
};
use crate::providers::{AzureServiceBusTransport, InMemoryTransport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Entry point to a broker
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Open a connection using the given credential
    async fn connect(
        &self,
        credential: &ConnectionString,
    ) -> Result<Box<dyn QueueConnection>, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// An open connection to the broker
#[async_trait]
pub trait QueueConnection: Send + Sync {
    /// Open a send channel scoped to one queue
    async fn open_sender(&self, queue: &QueueName) -> Result<Box<dyn QueueSender>, QueueError>;

    /// Open a peek-lock receive channel scoped to one queue
    async fn open_receiver(
        &self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueReceiver>, QueueError>;

    /// Release the connection
    async fn close(&self) -> Result<(), QueueError>;
}

/// Send channel bound to a single queue
#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Send a single message. Returns once the broker has accepted it.
    async fn send(&self, message: Message) -> Result<(), QueueError>;

    /// Release the channel
    async fn close(&self) -> Result<(), QueueError>;
}

/// Receive channel bound to a single queue
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Pull up to `max_count` messages, waiting at most `max_wait` for them.
    ///
    /// Returns an empty vector when nothing arrived in time. Returned
    /// messages are locked, not removed.
    async fn receive(
        &self,
        max_wait: Duration,
        max_count: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Permanently remove a locked message from the queue
    async fn complete(&self, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Release the channel. Messages still locked stay locked until their
    /// lock expires.
    async fn close(&self) -> Result<(), QueueError>;
}

/// Build the transport addressed by a connection string.
///
/// `memory:` credentials select a fresh in-process broker; everything else is
/// treated as an Azure Service Bus connection string.
pub fn transport_for(
    connection_string: &ConnectionString,
) -> Result<Arc<dyn QueueTransport>, QueueError> {
    match ProviderType::for_connection_string(connection_string) {
        ProviderType::InMemory => Ok(Arc::new(InMemoryTransport::new(InMemoryConfig::default()))),
        ProviderType::AzureServiceBus => Ok(Arc::new(AzureServiceBusTransport::new(
            AzureServiceBusConfig::default(),
        )?)),
    }
}
