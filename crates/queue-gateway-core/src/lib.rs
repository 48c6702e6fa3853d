//! # Queue Gateway Core
//!
//! The queue interaction component of the gateway:
//! - [`producer`]: validate, serialize and enqueue one payload
//! - [`consumer`]: bounded receive with per-message decode and acknowledgment
//! - [`config`]: broker credential and queue name from settings files and the environment
//! - [`payload`]: the payload contract and the sample `Person` record
//!
//! Both paths are stateless between calls. Each call opens its own broker
//! connection and channel and closes them, channel first, on every exit path.

use queue_runtime::QueueError;
use tracing::warn;

pub mod config;
pub mod consumer;
pub mod error;
pub mod payload;
pub mod producer;

pub use config::{GatewayConfig, BROKER_CONFIG_FILE_VAR, CONNECTION_STRING_VAR, QUEUE_NAME_VAR};
pub use consumer::{
    decode_body, Consumer, ConsumerBuilder, DecodedMessage, MessageOutcome, ReceiveOutcome,
    ReceivePolicy, DEFAULT_MAX_MESSAGES, DEFAULT_MAX_WAIT,
};
pub use error::{DecodeError, GatewayError};
pub use payload::{ApplicationPayload, Person};
pub use producer::Producer;

/// Log a failed close. It never replaces the result of the operation itself.
pub(crate) fn release(resource: &'static str, result: Result<(), QueueError>) {
    if let Err(e) = result {
        warn!(resource, error = %e, "Failed to close broker resource");
    }
}
