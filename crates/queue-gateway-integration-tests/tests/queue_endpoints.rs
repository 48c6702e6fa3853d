//! End-to-end tests for the queue endpoints
//!
//! These tests verify:
//! - The send and receive scenarios of the HTTP contract
//! - Round trip of a payload through the broker
//! - No partial enqueue when the broker rejects a send
//! - Malformed messages are never acknowledged and are redelivered
//! - The early return leaves the rest of a pulled batch locked

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{messages, queue, TestGateway};
use queue_gateway_core::DEFAULT_MAX_WAIT;
use queue_runtime::{FailurePoint, ResourceEvent};
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

const LOCK: Duration = Duration::from_millis(500);

// ============================================================================
// Scenarios
// ============================================================================

/// Scenario 1: a valid person is accepted
#[tokio::test]
async fn test_send_valid_person() {
    let gateway = TestGateway::new();

    let (status, body) = gateway.send(json!({"name": "Alice", "age": 30})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "Message sent successfully to the queue."})
    );
    assert_eq!(gateway.broker.available_count(&queue()), 1);
}

/// Scenario 2: receiving from an empty queue
#[tokio::test(start_paused = true)]
async fn test_receive_from_empty_queue() {
    let gateway = TestGateway::new();

    let (status, body) = gateway.receive().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Queue is empty"}));
}

/// Scenario 3: two valid messages, only the first is returned and acknowledged
#[tokio::test]
async fn test_receive_returns_after_first_delivery() {
    let gateway = TestGateway::new();
    let first = gateway
        .broker
        .enqueue_raw(&queue(), r#"{"name":"Alice","age":30}"#);
    gateway
        .broker
        .enqueue_raw(&queue(), r#"{"name":"Bob","age":31}"#);

    let (status, body) = gateway.receive().await;

    assert_eq!(status, StatusCode::OK);
    let entries = messages(&body);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message_id"], first.to_string());
    assert_eq!(entries[0]["content"], json!({"name": "Alice", "age": 30}));

    // The second message was pulled but never settled
    assert_eq!(gateway.broker.completed(&queue()), vec![first]);
    assert_eq!(gateway.broker.locked_count(&queue()), 1);
    assert_eq!(gateway.broker.available_count(&queue()), 0);
}

/// Scenario 4: the broker connection fails during send
#[tokio::test]
async fn test_send_connection_failure() {
    let gateway = TestGateway::new();
    gateway
        .broker
        .fail_next(FailurePoint::Connect, "broker unreachable");

    let (status, body) = gateway.send(json!({"name": "Alice", "age": 30})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("An error occurred: "), "detail: {}", detail);
    assert!(detail.contains("broker unreachable"));
    assert_eq!(body.as_object().unwrap().len(), 1);
}

/// Scenario 5: a single undecodable message yields no entries and stays queued
#[tokio::test]
async fn test_receive_skips_undecodable_message() {
    let gateway = TestGateway::new();
    gateway
        .broker
        .enqueue_raw(&queue(), vec![0xff_u8, 0xfe, b'{', b'}']);

    let (status, body) = gateway.receive().await;

    assert_eq!(status, StatusCode::OK);
    assert!(messages(&body).is_empty());
    assert!(gateway.broker.completed(&queue()).is_empty());
    assert_eq!(gateway.broker.locked_count(&queue()), 1);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_round_trip_preserves_payload() {
    let gateway = TestGateway::new();
    let payload = json!({"name": "Zoë Ñandú", "age": 4_000_000_000_u32});

    let (status, _) = gateway.send(payload.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = gateway.receive().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages(&body)[0]["content"], payload);
    assert_eq!(gateway.broker.available_count(&queue()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_send_enqueues_nothing() {
    let gateway = TestGateway::new();
    gateway
        .broker
        .fail_next(FailurePoint::Send, "namespace quota exceeded");

    let (status, _) = gateway.send(json!({"name": "Alice", "age": 30})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = gateway.receive().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Queue is empty"}));
}

#[tokio::test(start_paused = true)]
async fn test_empty_receive_is_bounded_by_max_wait() {
    let gateway = TestGateway::new();
    let started = tokio::time::Instant::now();

    gateway.receive().await;

    let elapsed = started.elapsed();
    assert!(elapsed >= DEFAULT_MAX_WAIT);
    assert!(elapsed < DEFAULT_MAX_WAIT + Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_message_is_redelivered_after_lock_expiry() {
    let gateway = TestGateway::with_lock_duration(LOCK);
    let bad = gateway.broker.enqueue_raw(&queue(), "{not json");

    let (_, body) = gateway.receive().await;
    assert!(messages(&body).is_empty());
    assert_eq!(gateway.broker.available_count(&queue()), 0);

    tokio::time::sleep(LOCK + Duration::from_millis(50)).await;
    assert_eq!(gateway.broker.available_count(&queue()), 1);

    // Still not acknowledged on the second pass
    let (_, body) = gateway.receive().await;
    assert!(messages(&body).is_empty());
    assert!(!gateway.broker.completed(&queue()).contains(&bad));
}

#[tokio::test(start_paused = true)]
async fn test_unreturned_batch_members_are_delivered_later() {
    let gateway = TestGateway::with_lock_duration(LOCK);
    gateway
        .broker
        .enqueue_raw(&queue(), r#"{"name":"Alice","age":30}"#);
    let second = gateway
        .broker
        .enqueue_raw(&queue(), r#"{"name":"Bob","age":31}"#);

    let (_, body) = gateway.receive().await;
    assert_eq!(messages(&body)[0]["content"]["name"], "Alice");

    tokio::time::sleep(LOCK + Duration::from_millis(50)).await;

    let (_, body) = gateway.receive().await;
    let entries = messages(&body);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message_id"], second.to_string());
    assert_eq!(gateway.broker.completed(&queue()).len(), 2);
}

#[tokio::test]
async fn test_decode_failure_does_not_block_later_messages() {
    let gateway = TestGateway::new();
    gateway.broker.enqueue_raw(&queue(), "\"just a string\"");
    let good = gateway
        .broker
        .enqueue_raw(&queue(), r#"{"name":"Alice","age":30}"#);

    let (_, body) = gateway.receive().await;

    let entries = messages(&body);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message_id"], good.to_string());
    assert_eq!(gateway.broker.completed(&queue()), vec![good]);
}

// ============================================================================
// Resource Lifecycle
// ============================================================================

#[tokio::test]
async fn test_send_closes_sender_before_connection() {
    let gateway = TestGateway::new();

    gateway.send(json!({"name": "Alice", "age": 30})).await;

    assert_eq!(
        gateway.broker.events(),
        vec![
            ResourceEvent::ConnectionOpened,
            ResourceEvent::SenderOpened,
            ResourceEvent::SenderClosed,
            ResourceEvent::ConnectionClosed,
        ]
    );
}

#[tokio::test]
async fn test_failed_operations_release_every_resource() {
    let gateway = TestGateway::new();
    gateway.broker.fail_next(FailurePoint::Send, "rejected");
    gateway.broker.fail_next(FailurePoint::Receive, "unavailable");
    gateway.broker.fail_next(FailurePoint::OpenSender, "disabled");

    let (send_status, _) = gateway.send(json!({"name": "Alice", "age": 30})).await;
    let (second_send_status, _) = gateway.send(json!({"name": "Bob", "age": 31})).await;
    let (receive_status, _) = gateway.receive().await;

    assert_eq!(send_status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(second_send_status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(receive_status, StatusCode::INTERNAL_SERVER_ERROR);

    let stats = gateway.broker.stats();
    assert_eq!(stats.connections_opened, 3);
    assert!(stats.all_released());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_receive_releases_resources() {
    let gateway = TestGateway::new();
    let request = Request::builder()
        .uri("/queue/messages")
        .body(Body::empty())
        .unwrap();

    let result =
        tokio::time::timeout(Duration::from_secs(1), gateway.router().oneshot(request)).await;

    assert!(result.is_err(), "receive should still be waiting");
    let events = gateway.broker.events();
    assert!(events.contains(&ResourceEvent::ReceiverDropped));
    assert!(events.contains(&ResourceEvent::ConnectionDropped));
    assert!(gateway.broker.stats().all_released());
}
