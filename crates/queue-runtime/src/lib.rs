//! # Queue Runtime
//!
//! Broker transport for a single FIFO, at-least-once message queue, with
//! Azure Service Bus and in-memory implementations.
//!
//! This library provides:
//! - Scoped connection, sender and receiver resources with explicit close
//! - Peek-lock receive with per-message acknowledgment
//! - Provider selection from the connection string
//! - An instrumented in-memory broker for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all transport operations
//! - [`message`] - Outgoing and received message structures
//! - [`provider`] - Provider types, credentials and configuration
//! - [`transport`] - Transport traits and provider selection
//! - [`providers`] - Azure Service Bus and in-memory implementations

pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{LockToken, Message, MessageId, QueueName, ReceivedMessage, Timestamp};
pub use provider::{
    AzureServiceBusConfig, ConnectionString, InMemoryConfig, ProviderType,
    ServiceBusConnectionInfo, IN_MEMORY_SCHEME,
};
pub use providers::{
    AzureServiceBusTransport, FailurePoint, InMemoryTransport, ResourceEvent, ResourceStats,
};
pub use transport::{transport_for, QueueConnection, QueueReceiver, QueueSender, QueueTransport};
