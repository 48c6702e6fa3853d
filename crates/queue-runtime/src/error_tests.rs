//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "orders".to_string(),
    }
    .is_transient());

    assert!(!QueueError::AuthenticationFailed {
        message: "bad signature".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageTooLarge {
        size: 1000,
        max_size: 500
    }
    .is_transient());
}

#[test]
fn test_configuration_error_converts_into_queue_error() {
    let err: QueueError = ConfigurationError::Missing {
        key: "SharedAccessKey".to_string(),
    }
    .into();

    assert!(matches!(err, QueueError::ConfigurationError(_)));
    assert!(!err.is_transient());
    assert_eq!(
        err.to_string(),
        "Configuration error: Missing required configuration: SharedAccessKey"
    );
}

#[test]
fn test_error_messages_are_descriptive() {
    let err = QueueError::MessageTooLarge {
        size: 300_000,
        max_size: 262_144,
    };
    assert_eq!(
        err.to_string(),
        "Message too large: 300000 bytes (max: 262144)"
    );

    let err = QueueError::LockLost {
        message_id: "abc".to_string(),
    };
    assert!(err.to_string().contains("abc"));
}
