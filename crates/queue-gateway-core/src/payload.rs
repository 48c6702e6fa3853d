//! Application payloads carried through the queue.

use queue_runtime::ValidationError;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;

/// A structured record that can be enqueued.
///
/// Validation runs before serialization; a payload that fails validation
/// never reaches the transport.
pub trait ApplicationPayload: Serialize + Send + Sync {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Sample domain record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

impl ApplicationPayload for Person {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            });
        }
        Ok(())
    }
}
