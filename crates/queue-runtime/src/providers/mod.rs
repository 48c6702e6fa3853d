//! Queue transport implementations.
//!
//! This module contains concrete implementations of the `QueueTransport`
//! trait for the supported brokers.

pub mod azure;
pub mod memory;

pub use azure::{AzureError, AzureServiceBusTransport};
pub use memory::{FailurePoint, InMemoryTransport, ResourceEvent, ResourceStats};
