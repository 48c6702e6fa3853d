//! Common test utilities for queue gateway integration tests
//!
//! This module provides:
//! - A router wired to an in-memory broker the test can inspect
//! - Request builders for the queue endpoints
//! - Response body helpers

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use queue_gateway_api::{create_router, AppState, ServiceConfig};
use queue_gateway_core::GatewayConfig;
use queue_runtime::{ConnectionString, InMemoryConfig, InMemoryTransport, QueueName};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const QUEUE: &str = "people";

pub fn queue() -> QueueName {
    QueueName::new(QUEUE.to_string()).unwrap()
}

// ============================================================================
// Test Gateway
// ============================================================================

/// HTTP router backed by an in-memory broker shared with the test
#[allow(dead_code)]
pub struct TestGateway {
    pub broker: InMemoryTransport,
    router: Router,
}

#[allow(dead_code)]
impl TestGateway {
    pub fn new() -> Self {
        Self::with_broker(InMemoryTransport::default())
    }

    /// Gateway whose broker releases receive locks after `lock_duration`
    pub fn with_lock_duration(lock_duration: Duration) -> Self {
        Self::with_broker(InMemoryTransport::new(InMemoryConfig {
            lock_duration,
            ..Default::default()
        }))
    }

    pub fn with_broker(broker: InMemoryTransport) -> Self {
        let gateway = Arc::new(
            GatewayConfig::new(ConnectionString::new("memory://integration"), queue()).unwrap(),
        );
        let state = AppState::new(
            ServiceConfig::default(),
            gateway,
            Arc::new(broker.clone()),
        );

        Self {
            broker,
            router: create_router(state),
        }
    }

    pub async fn send(&self, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/queue/messages")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        into_parts(self.router.clone().oneshot(request).await.unwrap()).await
    }

    pub async fn receive(&self) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri("/queue/messages")
            .body(Body::empty())
            .unwrap();

        into_parts(self.router.clone().oneshot(request).await.unwrap()).await
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

pub async fn into_parts(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

/// Entries of a `{"messages": [...]}` body
#[allow(dead_code)]
pub fn messages(body: &Value) -> &Vec<Value> {
    body["messages"]
        .as_array()
        .unwrap_or_else(|| panic!("expected a messages body, got {}", body))
}
